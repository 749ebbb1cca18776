// Command execution for session bodies.
//
// ## Resolution
// A program is resolved against the bound environment's bin directory first.
// If it is only found on the host PATH and the invocation is not `external`,
// the path-safety check applies: `ExternalPolicy::Error` fails the call,
// `ExternalPolicy::Warn` runs the host program and reports a warning.
// `external = true` and `Target::Host` resolve against the host PATH only.
//
// ## Output
// Child stdout/stderr are inherited so tool output interleaves with the run
// log. `silent` invocations capture instead; the caller decides whether to
// print the captured text.
//
// Execution is blocking. There is no timeout: a hung child hangs the run.

use crate::defaults::ExternalPolicy;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::paths;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Outside any provisioned environment.
    Host,
    /// Inside the environment rooted at `location`.
    Environment { location: PathBuf },
}

/// A single program invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub target: Target,
    pub external: bool,
    pub external_policy: ExternalPolicy,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub silent: bool,
    pub success_codes: Vec<i32>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, target: Target) -> Self {
        Self {
            program: program.into(),
            args,
            target,
            external: false,
            external_policy: ExternalPolicy::default(),
            env: Vec::new(),
            cwd: None,
            silent: false,
            success_codes: vec![0],
        }
    }
}

/// Structured outcome of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub program: String,
    pub args: Vec<String>,
    pub resolved: PathBuf,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn failure_details(&self) -> CommandFailedDetails {
        CommandFailedDetails {
            program: self.program.clone(),
            args: self.args.clone(),
            exit_code: self.exit_code,
            signal: self.signal,
            stdout: self.stdout.trim().to_string(),
            stderr: self.stderr.trim().to_string(),
        }
    }

    /// Everything a silent command captured: stdout first, then stderr.
    pub fn captured_output(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs one invocation to completion.
///
/// Returns `Err` only when the program could not be started (not found,
/// blocked by the path-safety check, spawn failure). A nonzero exit is an
/// `Ok` result with `success == false`.
pub trait CommandExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<CommandResult>;
}

/// Production executor backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<CommandResult> {
        let host_path = std::env::var_os("PATH");
        let resolved = resolve_program(invocation, host_path.as_deref())?;

        let mut cmd = Command::new(&resolved.path);
        cmd.args(&invocation.args);

        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        if let Target::Environment { location } = &invocation.target {
            cmd.env("VIRTUAL_ENV", location);
            cmd.env("PATH", prepend_path(&paths::bin_dir(location), host_path.as_deref())?);
            cmd.env_remove("PYTHONHOME");
        }

        cmd.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut result = CommandResult {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            resolved: resolved.path.clone(),
            warnings: resolved.warning.into_iter().collect(),
            ..CommandResult::default()
        };

        let status = if invocation.silent {
            let out = cmd.output().map_err(|e| spawn_error(invocation, e))?;
            result.stdout = String::from_utf8_lossy(&out.stdout).to_string();
            result.stderr = String::from_utf8_lossy(&out.stderr).to_string();
            out.status
        } else {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|e| spawn_error(invocation, e))?
        };

        result.exit_code = status.code();
        result.signal = exit_signal(&status);
        result.success = result
            .exit_code
            .is_some_and(|code| invocation.success_codes.contains(&code));

        Ok(result)
    }
}

fn spawn_error(invocation: &Invocation, err: std::io::Error) -> Error {
    Error::internal_io(
        err.to_string(),
        Some(format!("spawn {}", invocation.program)),
    )
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn prepend_path(dir: &Path, host_path: Option<&std::ffi::OsStr>) -> Result<OsString> {
    let mut entries = vec![dir.to_path_buf()];
    if let Some(host) = host_path {
        entries.extend(std::env::split_paths(host));
    }
    std::env::join_paths(entries)
        .map_err(|e| Error::internal_io(e.to_string(), Some("build PATH".to_string())))
}

/// Result of program resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    pub warning: Option<String>,
}

/// Resolve `invocation.program` according to its target and `external` flag.
pub fn resolve_program(invocation: &Invocation, host_path: Option<&std::ffi::OsStr>) -> Result<Resolved> {
    let program = invocation.program.as_str();

    if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        if path.is_relative() || path.exists() {
            return Ok(Resolved { path, warning: None });
        }
        return Err(Error::command_not_found(program).with_command_args(&invocation.args));
    }

    let host_dirs: Vec<PathBuf> = host_path
        .map(|p| std::env::split_paths(p).collect())
        .unwrap_or_default();

    let env_location = match &invocation.target {
        Target::Environment { location } if !invocation.external => Some(location),
        _ => None,
    };

    if let Some(location) = env_location {
        if let Some(found) = find_in(program, &[paths::bin_dir(location)]) {
            return Ok(Resolved {
                path: found,
                warning: None,
            });
        }

        let host = find_in(program, &host_dirs)
            .ok_or_else(|| Error::command_not_found(program).with_command_args(&invocation.args))?;

        return match invocation.external_policy {
            ExternalPolicy::Error => Err(Error::command_not_in_environment(
                program,
                host.display().to_string(),
            )
            .with_command_args(&invocation.args)),
            ExternalPolicy::Warn => Ok(Resolved {
                warning: Some(format!(
                    "{} is not installed into the environment, it is located at {}. Pass external = true to silence this warning",
                    program,
                    host.display()
                )),
                path: host,
            }),
        };
    }

    find_in(program, &host_dirs)
        .map(|path| Resolved {
            path,
            warning: None,
        })
        .ok_or_else(|| Error::command_not_found(program).with_command_args(&invocation.args))
}

/// Search directories in order for an executable named `program`.
pub fn find_in(program: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    for dir in dirs {
        for name in candidate_names(program) {
            let candidate = dir.join(&name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn candidate_names(program: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(program).extension().is_none() {
        vec![
            format!("{}.exe", program),
            format!("{}.cmd", program),
            format!("{}.bat", program),
            program.to_string(),
        ]
    } else {
        vec![program.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
