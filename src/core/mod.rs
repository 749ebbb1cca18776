// Public modules
pub mod config;
pub mod defaults;
pub mod error;
pub mod executor;
pub mod logging;
pub mod notify;
pub mod provision;
pub mod registry;
pub mod report;
pub mod runner;
pub mod session;

// Internal modules - not part of public API
pub(crate) mod paths;
pub(crate) mod slugify;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use registry::{Registry, SessionInstance};
pub use report::{Outcome, RunReport};
pub use runner::{RunRequest, Runner};
pub use session::{BodyOutcome, Session, SessionDef};
