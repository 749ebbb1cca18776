use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigSessionNotFound,
    ConfigInvalidValue,
    ConfigInvalidToml,
    ConfigMissingFile,

    ValidationInvalidArgument,

    ProvisionInterpreterNotFound,
    ProvisionCreateFailed,
    ProvisionInstallFailed,
    ProvisionEnvironmentFailed,
    ProvisionNoEnvironment,

    CommandFailed,
    CommandNotFound,
    CommandNotInEnvironment,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigSessionNotFound => "config.session_not_found",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigInvalidToml => "config.invalid_toml",
            ErrorCode::ConfigMissingFile => "config.missing_file",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ProvisionInterpreterNotFound => "provision.interpreter_not_found",
            ErrorCode::ProvisionCreateFailed => "provision.create_failed",
            ErrorCode::ProvisionInstallFailed => "provision.install_failed",
            ErrorCode::ProvisionEnvironmentFailed => "provision.environment_failed",
            ErrorCode::ProvisionNoEnvironment => "provision.no_environment",

            ErrorCode::CommandFailed => "command.failed",
            ErrorCode::CommandNotFound => "command.not_found",
            ErrorCode::CommandNotInEnvironment => "command.not_in_environment",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Errors raised while loading configuration or resolving requested names.
    /// These abort the run before any instance executes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigSessionNotFound
                | ErrorCode::ConfigInvalidValue
                | ErrorCode::ConfigInvalidToml
                | ErrorCode::ConfigMissingFile
                | ErrorCode::ValidationInvalidArgument
        )
    }

    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            ErrorCode::ProvisionInterpreterNotFound
                | ErrorCode::ProvisionCreateFailed
                | ErrorCode::ProvisionInstallFailed
                | ErrorCode::ProvisionEnvironmentFailed
                | ErrorCode::ProvisionNoEnvironment
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionDetails {
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    pub error: String,
}

/// The command that made a session fail. Serialized into error details and
/// surfaced per failed instance in the run report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn session_not_found(id: impl Into<String>, available: Vec<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ConfigSessionNotFound,
            format!("Session '{}' not found", id),
            to_details(NotFoundDetails { id, available }),
        )
        .with_hint("Run 'drover --list' to see available sessions")
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value: {}", problem),
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem,
            }),
        )
    }

    pub fn config_invalid_toml(path: impl Into<String>, err: toml::de::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidToml,
            "Invalid TOML in session file",
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn config_missing_file(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigMissingFile,
            format!("Session file not found: {}", path),
            serde_json::json!({ "path": path }),
        )
        .with_hint("Pass --file <path> or run drover from the directory containing drover.toml")
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem: problem.into(),
                id,
            }),
        )
    }

    pub fn interpreter_not_found(environment: impl Into<String>, interpreter: &str) -> Self {
        Self::new(
            ErrorCode::ProvisionInterpreterNotFound,
            format!("Interpreter '{}' not found", interpreter),
            to_details(ProvisionDetails {
                environment: environment.into(),
                interpreter: Some(interpreter.to_string()),
                error: "not found on PATH".to_string(),
            }),
        )
    }

    pub fn provision_create_failed(
        environment: impl Into<String>,
        interpreter: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        let environment = environment.into();
        Self::new(
            ErrorCode::ProvisionCreateFailed,
            format!("Failed to create environment {}", environment),
            to_details(ProvisionDetails {
                environment,
                interpreter,
                error: error.into(),
            }),
        )
    }

    pub fn provision_install_failed(environment: impl Into<String>, error: impl Into<String>) -> Self {
        let environment = environment.into();
        Self::new(
            ErrorCode::ProvisionInstallFailed,
            format!("Failed to install dependencies into {}", environment),
            to_details(ProvisionDetails {
                environment,
                interpreter: None,
                error: error.into(),
            }),
        )
    }

    /// Any operation against a handle that already failed.
    pub fn provision_environment_failed(environment: impl Into<String>) -> Self {
        let environment = environment.into();
        Self::new(
            ErrorCode::ProvisionEnvironmentFailed,
            format!("Environment {} is in a failed state", environment),
            to_details(ProvisionDetails {
                environment,
                interpreter: None,
                error: "a previous provisioning step failed".to_string(),
            }),
        )
    }

    pub fn provision_no_environment(session: impl Into<String>) -> Self {
        let session = session.into();
        Self::new(
            ErrorCode::ProvisionNoEnvironment,
            format!("Session {} has no environment to install into", session),
            serde_json::json!({ "session": session }),
        )
        .with_hint("Use backend = \"venv\" for sessions that install dependencies")
    }

    pub fn command_failed(details: CommandFailedDetails) -> Self {
        let message = match (details.exit_code, details.signal) {
            (Some(code), _) => format!("Command {} failed with exit code {}", details.program, code),
            (None, Some(signal)) => {
                format!("Command {} terminated by signal {}", details.program, signal)
            }
            (None, None) => format!("Command {} failed", details.program),
        };
        Self::new(ErrorCode::CommandFailed, message, to_details(details))
    }

    pub fn command_not_found(program: impl Into<String>) -> Self {
        let program = program.into();
        Self::new(
            ErrorCode::CommandNotFound,
            format!("Program '{}' not found", program),
            to_details(CommandFailedDetails {
                program,
                args: Vec::new(),
                exit_code: None,
                signal: None,
                stdout: String::new(),
                stderr: String::new(),
            }),
        )
    }

    pub fn command_not_in_environment(program: impl Into<String>, host_path: impl Into<String>) -> Self {
        let program = program.into();
        Self::new(
            ErrorCode::CommandNotInEnvironment,
            format!(
                "Program '{}' is not installed into the environment (found at {})",
                program,
                host_path.into()
            ),
            to_details(CommandFailedDetails {
                program: program.clone(),
                args: Vec::new(),
                exit_code: None,
                signal: None,
                stdout: String::new(),
                stderr: String::new(),
            }),
        )
        .with_hint(format!(
            "Install '{}' into the session or mark the step external = true",
            program
        ))
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn is_configuration(&self) -> bool {
        self.code.is_configuration()
    }

    pub fn is_provisioning(&self) -> bool {
        self.code.is_provisioning()
    }

    /// The failing command, when this error was produced by a command invocation.
    pub fn failed_command(&self) -> Option<CommandFailedDetails> {
        match self.code {
            ErrorCode::CommandFailed
            | ErrorCode::CommandNotFound
            | ErrorCode::CommandNotInEnvironment => {
                serde_json::from_value(self.details.clone()).ok()
            }
            _ => None,
        }
    }

    /// Attach the full argument list to a command error raised during resolution.
    pub(crate) fn with_command_args(mut self, args: &[String]) -> Self {
        if let Some(mut details) = self.failed_command() {
            details.args = args.to_vec();
            self.details = to_details(details);
        }
        self
    }
}
