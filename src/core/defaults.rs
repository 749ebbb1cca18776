use serde::{Deserialize, Serialize};

use crate::paths;

/// What to do when a non-external command is only found outside the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExternalPolicy {
    /// Fail the command before it starts.
    Error,
    /// Run the host program and log a warning.
    #[default]
    Warn,
}

/// How a session's environment is provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Isolated virtual environment created with `<interpreter> -m venv`.
    #[default]
    Venv,
    /// No environment; every command runs on the host and installs are rejected.
    None,
}

/// `[options]` table of the session file. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileOptions {
    #[serde(default)]
    pub sessions: Option<Vec<String>>,
    #[serde(default)]
    pub envdir: Option<String>,
    #[serde(default)]
    pub reuse_existing: Option<bool>,
    #[serde(default)]
    pub external: Option<ExternalPolicy>,
    #[serde(default)]
    pub default_interpreter: Option<String>,
    #[serde(default)]
    pub stop_on_first_error: Option<bool>,
    #[serde(default)]
    pub error_on_missing_interpreters: Option<bool>,
}

/// Effective options for one run: CLI flags over file options over defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default = "default_envdir")]
    pub envdir: String,

    #[serde(default)]
    pub reuse_existing: bool,

    #[serde(default)]
    pub external: ExternalPolicy,

    #[serde(default = "default_interpreter")]
    pub default_interpreter: String,

    #[serde(default)]
    pub stop_on_first_error: bool,

    #[serde(default)]
    pub error_on_missing_interpreters: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            envdir: default_envdir(),
            reuse_existing: false,
            external: ExternalPolicy::default(),
            default_interpreter: default_interpreter(),
            stop_on_first_error: false,
            error_on_missing_interpreters: false,
        }
    }
}

/// Command-line overrides. `None` / `false` means "not given".
#[derive(Debug, Clone, Default)]
pub struct OptionOverrides {
    pub envdir: Option<String>,
    pub reuse_existing: bool,
    pub error_on_external_run: bool,
    pub stop_on_first_error: bool,
    pub error_on_missing_interpreters: bool,
}

impl RunOptions {
    pub fn from_file(file: &FileOptions) -> Self {
        let defaults = Self::default();
        Self {
            envdir: file.envdir.clone().unwrap_or(defaults.envdir),
            reuse_existing: file.reuse_existing.unwrap_or(defaults.reuse_existing),
            external: file.external.unwrap_or(defaults.external),
            default_interpreter: file
                .default_interpreter
                .clone()
                .unwrap_or(defaults.default_interpreter),
            stop_on_first_error: file.stop_on_first_error.unwrap_or(defaults.stop_on_first_error),
            error_on_missing_interpreters: file
                .error_on_missing_interpreters
                .unwrap_or(defaults.error_on_missing_interpreters),
        }
    }

    pub fn apply(mut self, overrides: &OptionOverrides) -> Self {
        if let Some(envdir) = &overrides.envdir {
            self.envdir = envdir.clone();
        }
        self.reuse_existing |= overrides.reuse_existing;
        self.stop_on_first_error |= overrides.stop_on_first_error;
        self.error_on_missing_interpreters |= overrides.error_on_missing_interpreters;
        if overrides.error_on_external_run {
            self.external = ExternalPolicy::Error;
        }
        self
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_envdir() -> String {
    paths::DEFAULT_ENVDIR.to_string()
}

fn default_interpreter() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}
