//! Session definitions and the context handed to a running body.
//!
//! A body receives `&mut Session` and nothing else. Every install, command
//! and notify goes through it, so the borrow ends when the body returns and
//! the runner then consumes the context with `finish`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::defaults::{Backend, ExternalPolicy};
use crate::error::{Error, Result};
use crate::executor::{CommandExecutor, CommandResult, Invocation};
use crate::provision::{EnvironmentHandle, Provisioner};
use crate::registry::{Registry, SessionInstance};
use crate::utils::shell;

/// How a body finished when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyOutcome {
    Completed,
    /// The body decided it does not apply here (wrong platform, missing tool).
    Skipped(String),
}

pub type SessionBody = Arc<dyn Fn(&mut Session<'_>) -> Result<BodyOutcome> + Send + Sync>;

/// A named unit of work, optionally parameterized over interpreter versions.
#[derive(Clone)]
pub struct SessionDef {
    name: String,
    description: Option<String>,
    python: Vec<String>,
    posargs: Vec<String>,
    backend: Backend,
    body: SessionBody,
}

impl SessionDef {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Session<'_>) -> Result<BodyOutcome> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            python: Vec::new(),
            posargs: Vec::new(),
            backend: Backend::Venv,
            body: Arc::new(body),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Matrix of interpreter versions. Empty means a single unparameterized instance.
    pub fn python<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.python = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn posargs<I, S>(mut self, posargs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.posargs = posargs.into_iter().map(Into::into).collect();
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn about(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn versions(&self) -> &[String] {
        &self.python
    }

    pub fn default_posargs(&self) -> &[String] {
        &self.posargs
    }

    pub fn env_backend(&self) -> Backend {
        self.backend
    }

    pub(crate) fn body(&self) -> SessionBody {
        Arc::clone(&self.body)
    }
}

impl fmt::Debug for SessionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDef")
            .field("name", &self.name)
            .field("python", &self.python)
            .field("posargs", &self.posargs)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

/// A follow-up request issued from a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub name: String,
    /// Positional args for the notified session. `None` keeps the run's args.
    pub posargs: Option<Vec<String>>,
}

/// Services a context calls back into. Owned by the runner.
#[derive(Clone, Copy)]
pub struct Services<'r> {
    pub registry: &'r Registry,
    pub executor: &'r dyn CommandExecutor,
    pub provisioner: &'r dyn Provisioner,
    pub external_policy: ExternalPolicy,
    pub cwd: &'r Path,
}

/// What the runner gets back once the body is done.
#[derive(Debug)]
pub struct Finished {
    pub notifications: Vec<Notification>,
}

/// The scoped, single-use context of one running instance.
pub struct Session<'r> {
    instance: &'r SessionInstance,
    env: EnvironmentHandle,
    posargs: Vec<String>,
    services: Services<'r>,
    notifications: Vec<Notification>,
}

impl<'r> Session<'r> {
    pub fn new(
        instance: &'r SessionInstance,
        env: EnvironmentHandle,
        posargs: Vec<String>,
        services: Services<'r>,
    ) -> Self {
        Self {
            instance,
            env,
            posargs,
            services,
            notifications: Vec::new(),
        }
    }

    /// Instance id, e.g. `tests-3.7`.
    pub fn id(&self) -> &str {
        self.instance.id()
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }

    pub fn python(&self) -> Option<&str> {
        self.instance.version()
    }

    /// Environment location. Meaningless for `backend = "none"`.
    pub fn envdir(&self) -> &Path {
        self.env.location()
    }

    pub fn cwd(&self) -> &Path {
        self.services.cwd
    }

    /// Positional args for this invocation: supplied ones, else the definition's defaults.
    pub fn posargs(&self) -> &[String] {
        &self.posargs
    }

    pub fn log(&self, message: impl fmt::Display) {
        log_status!(self.id(), "{}", message);
    }

    /// Return value for a body that does not apply here.
    pub fn skip(&self, reason: impl Into<String>) -> Result<BodyOutcome> {
        Ok(BodyOutcome::Skipped(reason.into()))
    }

    /// Install dependency specifiers into this instance's environment.
    ///
    /// A repeated request for the exact same set is a no-op.
    pub fn install<I, S>(&mut self, specifiers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let specifiers: Vec<String> = specifiers.into_iter().map(Into::into).collect();
        if specifiers.is_empty() {
            return Ok(());
        }

        log_status!(self.id(), "pip install {}", shell::quote_args(&specifiers));
        let ran = self
            .env
            .install(self.services.provisioner, &specifiers)
            .map_err(|err| {
                if let Some(text) = err.details.get("error").and_then(|v| v.as_str()) {
                    if !text.is_empty() {
                        eprintln!("{}", text);
                    }
                }
                err
            })?;
        if !ran {
            log_status!(self.id(), "Requirements already installed");
        }
        Ok(())
    }

    /// Start building a command invocation.
    pub fn cmd(&mut self, program: impl Into<String>) -> Cmd<'_, 'r> {
        let mut invocation = Invocation::new(program, Vec::new(), self.env.target());
        invocation.external_policy = self.services.external_policy;
        invocation.cwd = Some(self.services.cwd.to_path_buf());
        Cmd {
            session: self,
            invocation,
            may_fail: false,
        }
    }

    /// Run a program; a nonzero exit aborts the body with a command failure.
    pub fn run<I, S>(&mut self, program: &str, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd(program).args(args).run()
    }

    /// Run a program and hand back the result whatever the exit code.
    pub fn run_may_fail<I, S>(&mut self, program: &str, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd(program).args(args).may_fail().run()
    }

    /// Queue another session to run after the current pass.
    pub fn notify(&mut self, name: &str) -> Result<()> {
        self.queue_notification(name, None)
    }

    /// Like `notify`, handing explicit positional args to the notified session.
    pub fn notify_with_args<I, S>(&mut self, name: &str, posargs: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let posargs = posargs.into_iter().map(Into::into).collect();
        self.queue_notification(name, Some(posargs))
    }

    fn queue_notification(&mut self, name: &str, posargs: Option<Vec<String>>) -> Result<()> {
        if !self.services.registry.contains(name) {
            return Err(Error::session_not_found(name, self.services.registry.names()));
        }
        if self.notifications.iter().all(|n| n.name != name) {
            self.notifications.push(Notification {
                name: name.to_string(),
                posargs,
            });
        }
        Ok(())
    }

    /// Consume the context once the body has returned.
    pub fn finish(self) -> Finished {
        Finished {
            notifications: self.notifications,
        }
    }
}

/// Builder for one command, created by `Session::cmd`.
pub struct Cmd<'s, 'r> {
    session: &'s mut Session<'r>,
    invocation: Invocation,
    may_fail: bool,
}

impl Cmd<'_, '_> {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.invocation.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program lives outside the environment (git, release tools).
    pub fn external(mut self) -> Self {
        self.invocation.external = true;
        self
    }

    /// Capture output; it is printed only if the command fails.
    pub fn silent(mut self) -> Self {
        self.invocation.silent = true;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.invocation.env.push((key.into(), value.into()));
        self
    }

    pub fn success_codes(mut self, codes: Vec<i32>) -> Self {
        if !codes.is_empty() {
            self.invocation.success_codes = codes;
        }
        self
    }

    pub fn may_fail(mut self) -> Self {
        self.may_fail = true;
        self
    }

    pub fn run(self) -> Result<CommandResult> {
        let Cmd {
            session,
            invocation,
            may_fail,
        } = self;
        let instance = session.instance;
        let id = instance.id();

        log_status!(id, "{}", shell::display_command(&invocation.program, &invocation.args));

        let result = session
            .services
            .executor
            .execute(&invocation)
            .map_err(|err| err.with_command_args(&invocation.args))?;

        for warning in &result.warnings {
            log_warn!(id, "{}", warning);
        }

        if result.success {
            return Ok(result);
        }

        if invocation.silent {
            let text = result.captured_output();
            if !text.is_empty() {
                eprintln!("{}", text);
            }
        }

        if may_fail {
            log_status!(id, "Command {} exited with {:?} (allowed)", invocation.program, result.exit_code);
            Ok(result)
        } else {
            Err(Error::command_failed(result.failure_details()))
        }
    }
}

/// Canonical name of the host platform (`linux`, `macos`, `windows`, ...).
pub fn host_platform() -> &'static str {
    std::env::consts::OS
}

/// Accept the `sys.platform` spellings people put in session files.
pub fn normalize_platform(platform: &str) -> String {
    match platform.trim().to_ascii_lowercase().as_str() {
        "darwin" | "mac" | "osx" => "macos".to_string(),
        "win32" | "win" | "cygwin" => "windows".to_string(),
        other => other.to_string(),
    }
}

pub fn platform_matches(platform: &str) -> bool {
    normalize_platform(platform) == host_platform()
}
