//! Path segment sanitizing
//!
//! Every caller-supplied name that becomes a path component (package,
//! problem set, exercise) goes through [`secure_segment`] first. The result
//! only contains `[A-Za-z0-9_.-]`, never contains `..`, and never starts or
//! ends with `.` or `_`. Sanitizing is idempotent.

/// Reduce `name` to a single safe path component.
///
/// Separators become spaces, whitespace runs become `_`, everything outside
/// the allowed set is dropped, dot runs collapse to a single dot and leading
/// or trailing `.`/`_` are stripped. The result may be empty.
pub fn secure_segment(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let mut out = String::with_capacity(joined.len());
    for c in joined.chars() {
        if !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
            continue;
        }
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }

    out.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// True if `name` is non-empty and already in sanitized form.
pub fn is_secure_segment(name: &str) -> bool {
    !name.is_empty() && secure_segment(name) == name
}
