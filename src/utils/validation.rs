//! Input validation primitives.
//!
//! Replaces verbose `ok_or_else` + `Error::config_invalid_value` chains in
//! session-file validation.

use crate::error::{Error, Result};

/// Require a string to be non-empty after trimming.
///
/// Returns a reference to the trimmed string on success.
pub fn require_non_empty<'a>(value: &'a str, key: &str, message: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::config_invalid_value(key, None, message))
    } else {
        Ok(trimmed)
    }
}

/// Require a collection to be non-empty.
pub fn require_non_empty_vec<'a, T>(vec: &'a [T], key: &str, message: &str) -> Result<&'a [T]> {
    if vec.is_empty() {
        Err(Error::config_invalid_value(key, None, message))
    } else {
        Ok(vec)
    }
}

/// Reject names that cannot be used as session identifiers on the command line.
pub fn require_session_name(name: &str) -> Result<&str> {
    let name = require_non_empty(name, "session.name", "Session name cannot be empty")?;
    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\\')
    {
        return Err(Error::config_invalid_value(
            "session.name",
            Some(name.to_string()),
            "Session names cannot contain whitespace or path separators",
        ));
    }
    Ok(name)
}
