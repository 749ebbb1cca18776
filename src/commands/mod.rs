use std::path::PathBuf;

use drover::config::{self, SessionConfig};

pub type CmdResult<T> = drover::Result<(T, i32)>;

pub struct GlobalArgs {
    /// `--file`, resolved against the current directory.
    pub file: Option<PathBuf>,
}

pub mod list;
pub mod run;

/// What the flat command line asked for.
pub enum Action {
    List,
    Run(run::RunArgs),
}

pub(crate) fn load_config(global: &GlobalArgs) -> drover::Result<SessionConfig> {
    let cwd = std::env::current_dir().map_err(|e| {
        drover::Error::internal_io(e.to_string(), Some("read current directory".to_string()))
    })?;
    let path = config::locate(global.file.as_deref(), &cwd)?;
    config::load(&path)
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($global))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(action: Action, global: &GlobalArgs) -> (drover::Result<serde_json::Value>, i32) {
    match action {
        Action::List => dispatch!(global, list),
        Action::Run(args) => dispatch!(args, global, run),
    }
}

pub(crate) fn run_text(action: Action, global: &GlobalArgs) -> drover::Result<(String, i32)> {
    match action {
        Action::List => list::run_text(global),
        Action::Run(args) => run::run_text(args, global),
    }
}
