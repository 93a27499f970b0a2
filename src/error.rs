//! Error types for tutor-store
//!
//! Absent drafts, accounts and unresolvable hashes are not errors: those
//! come back as `None`. Everything here is a server-side condition that the
//! request layer translates for the user.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A trusted input file (catalog, hash mappings, logs, user table) is not
    /// in the expected format. No partial recovery is attempted.
    #[error("Malformed {source_file} at line {line}: {reason}")]
    Malformed {
        source_file: String,
        line: usize,
        reason: String,
    },

    /// Stored data contradicts itself: a submission whose hash resolves to
    /// nothing, a cyclic hash chain, an identity hash that is not
    /// filesystem-safe.
    #[error("Integrity fault: {0}")]
    Integrity(String),

    /// A caller-supplied name or field cannot be stored safely.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Coarse classification for callers that map faults onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Integrity,
    Malformed,
    InvalidInput,
    Environment,
}

impl StoreError {
    pub fn malformed(source_file: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            source_file: source_file.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Integrity(_) => FaultKind::Integrity,
            Self::Malformed { .. } => FaultKind::Malformed,
            Self::InvalidName(_) => FaultKind::InvalidInput,
            Self::Config(_) | Self::Io(_) | Self::Database(_) | Self::Archive(_) => {
                FaultKind::Environment
            }
        }
    }
}
