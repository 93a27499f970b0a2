//! Content hashes
//!
//! Identity hashes and draft hashes are SHA-512 digests encoded as RFC 4648
//! base32 (upper-case alphabet, `=` padded), 104 characters long.

use sha2::{Digest, Sha512};

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Encoded length of a SHA-512 digest
pub const HASH_TOKEN_LEN: usize = 104;

/// Base32-encode `data` with padding.
pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 4) / 5 * 8);

    for chunk in data.chunks(5) {
        let mut group = [0u8; 5];
        group[..chunk.len()].copy_from_slice(chunk);
        let bits = group
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));

        let symbols = match chunk.len() {
            1 => 2,
            2 => 4,
            3 => 5,
            4 => 7,
            _ => 8,
        };
        for i in 0..8 {
            if i < symbols {
                let index = (bits >> (35 - i * 5)) & 0x1f;
                out.push(BASE32_ALPHABET[index as usize] as char);
            } else {
                out.push('=');
            }
        }
    }

    out
}

/// SHA-512 of `data` as a base32 token
pub fn content_hash(data: &[u8]) -> String {
    base32_encode(&Sha512::digest(data))
}

/// Drop `=` padding from both ends of a hash token.
pub fn strip_padding(token: &str) -> &str {
    token.trim_matches('=')
}

/// Whether `token` could be a stripped hash token: base32 symbols only, at
/// most [`HASH_TOKEN_LEN`] long.
pub fn is_hash_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= HASH_TOKEN_LEN
        && token
            .bytes()
            .all(|byte| byte.is_ascii_uppercase() || (b'2'..=b'7').contains(&byte))
}
