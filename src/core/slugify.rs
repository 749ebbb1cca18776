use crate::error::Error;
use crate::Result;

/// Turn an instance id such as `tests-3.7` into a directory-safe slug (`tests-3-7`).
pub(crate) fn slugify_id(value: &str, field_name: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation_invalid_argument(
            field_name,
            format!("{} cannot be empty", field_name),
            None,
        ));
    }

    let mut out = String::new();
    let mut prev_was_dash = false;

    for ch in trimmed.chars() {
        let normalized = match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            _ if ch.is_whitespace() || ch == '_' || ch == '-' || ch == '.' => Some('-'),
            _ => None,
        };

        if let Some(c) = normalized {
            if c == '-' {
                if out.is_empty() || prev_was_dash {
                    continue;
                }
                out.push('-');
                prev_was_dash = true;
            } else {
                out.push(c);
                prev_was_dash = false;
            }
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.is_empty() {
        return Err(Error::validation_invalid_argument(
            field_name,
            format!("{} must contain at least one letter or number", field_name),
            Some(value.to_string()),
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_instance_ids() {
        assert_eq!(slugify_id("tests-3.7", "instance").unwrap(), "tests-3-7");
        assert_eq!(
            slugify_id("build_executable_linux", "instance").unwrap(),
            "build-executable-linux"
        );
        assert_eq!(slugify_id("Lint", "instance").unwrap(), "lint");
    }

    #[test]
    fn rejects_symbol_only_ids() {
        assert!(slugify_id("???", "instance").is_err());
        assert!(slugify_id("  ", "instance").is_err());
    }
}
