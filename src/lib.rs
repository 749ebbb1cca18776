/// Macro for prefixed status logging to stderr.
///
/// The prefix is the active instance id, or `drover` for orchestrator lines,
/// so every action in the run log can be attributed. Suppressed by `--quiet`.
///
/// Usage:
/// ```ignore
/// log_status!("tests-3.7", "Creating environment at {}", location.display());
/// log_status!("drover", "Running {} session(s)", count);
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        if !$crate::logging::is_quiet() {
            eprintln!("[{}] {}", $prefix, format_args!($($arg)*));
        }
    };
}

/// Like `log_status!`, but printed even when quiet.
#[macro_export]
macro_rules! log_warn {
    ($prefix:expr, $($arg:tt)*) => {
        eprintln!("[{}] warning: {}", $prefix, format_args!($($arg)*));
    };
}

pub mod core;
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `drover::registry` instead of `drover::core::registry`
pub use core::*;
pub use utils::*;
