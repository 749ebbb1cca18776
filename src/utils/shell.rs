//! Shell-style quoting for displaying command lines in the run log.
//!
//! Commands are never executed through a shell; quoting only makes logged
//! invocations copy-pasteable.

const SHELL_META: &[char] = &[
    ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}', '<',
    '>', '|', '&', ';', '#', '~',
];

/// Quote a single argument.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped as `'\''`
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Quote and join multiple arguments.
pub fn quote_args(args: &[String]) -> String {
    args.iter()
        .map(|a| quote_arg(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render `program arg1 arg2` for log lines and failure summaries.
pub fn display_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        quote_arg(program)
    } else {
        format!("{} {}", quote_arg(program), quote_args(args))
    }
}
