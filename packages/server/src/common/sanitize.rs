//! File-name sanitization for object-store keys.
//!
//! Uploaded file names are attacker-controlled and end up inside storage
//! keys. The sanitizer reduces them to a restricted character set so keys
//! can never traverse paths or break key parsing.

/// Longest file name kept in a storage key.
const MAX_NAME_LEN: usize = 128;

/// Reduce a user-supplied file name to `[A-Za-z0-9._-]`, collapsing any
/// other run of characters to a single `_`. Leading dots are stripped so a
/// name can never start with `.` or `..`, and the result is length-capped.
/// Returns "upload" if nothing survives.
pub fn sanitize_file_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_NAME_LEN));
    let mut last_was_replacement = false;

    for c in raw.chars() {
        if out.len() >= MAX_NAME_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            out.push(c);
            last_was_replacement = false;
        } else if !last_was_replacement && !out.is_empty() {
            out.push('_');
            last_was_replacement = true;
        } else {
            last_was_replacement = true;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_').to_string();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed
    }
}
