//! Environment provisioning.
//!
//! - `Provisioner` - the primitive that creates environments and installs into them
//! - `VenvProvisioner` - production primitive (`<python> -m venv`, `pip install`)
//! - `EnvironmentHandle` - per-instance state machine with idempotent installs
//! - `Environments` - acquires one handle per session instance

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults::Backend;
use crate::error::{Error, ErrorCode, Result};
use crate::executor::{CommandExecutor, Invocation, Target};
use crate::paths;
use crate::registry::SessionInstance;
use crate::utils::io;

/// Lifecycle of an environment handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvState {
    Uninitialized,
    Ready,
    Failed,
}

/// Everything a provisioner needs to know about one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSpec {
    /// Instance id the environment belongs to (`tests-3.7`).
    pub name: String,
    /// Matrix version, `None` for unparameterized sessions.
    pub version: Option<String>,
    /// Interpreter program used to create the environment.
    pub interpreter: String,
    pub backend: Backend,
    pub location: PathBuf,
    pub reuse: bool,
}

/// What `Provisioner::create` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    Fresh,
    Reused,
}

pub trait Provisioner {
    /// Create the environment described by `spec`, or reuse it when allowed.
    fn create(&self, spec: &EnvSpec) -> Result<Created>;

    /// Install `specifiers` into an existing environment.
    fn install(&self, spec: &EnvSpec, specifiers: &[String]) -> Result<()>;
}

/// Contents of the marker file left in every environment we create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvMarker {
    pub interpreter: String,
    pub created_at: String,
}

impl EnvMarker {
    pub fn read(location: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(paths::env_marker(location)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write(&self, location: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize env marker".to_string())))?;
        io::write_file_atomic(&paths::env_marker(location), &content, "write env marker")
    }
}

/// Map a matrix version to the interpreter program that creates its environment.
///
/// `3.7` becomes `python3.7`; names such as `pypy3.9` or absolute paths are used as-is;
/// no version means the configured default interpreter.
pub fn interpreter_for(version: Option<&str>, default_interpreter: &str) -> String {
    match version {
        None => default_interpreter.to_string(),
        Some(v) if v.chars().next().is_some_and(|c| c.is_ascii_digit()) => format!("python{}", v),
        Some(v) => v.to_string(),
    }
}

/// Production provisioner: virtual environments via the interpreter's `venv`
/// module, dependencies via the environment's `pip`.
pub struct VenvProvisioner<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> VenvProvisioner<'a> {
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    fn can_reuse(&self, spec: &EnvSpec) -> bool {
        spec.reuse
            && paths::bin_dir(&spec.location).is_dir()
            && EnvMarker::read(&spec.location).is_some_and(|m| m.interpreter == spec.interpreter)
    }
}

impl Provisioner for VenvProvisioner<'_> {
    fn create(&self, spec: &EnvSpec) -> Result<Created> {
        if self.can_reuse(spec) {
            return Ok(Created::Reused);
        }

        io::remove_dir_if_exists(&spec.location, "remove stale environment")?;
        if let Some(parent) = spec.location.parent() {
            io::ensure_dir(parent, "create envdir")?;
        }

        let mut invocation = Invocation::new(
            spec.interpreter.clone(),
            vec![
                "-m".to_string(),
                "venv".to_string(),
                spec.location.display().to_string(),
            ],
            Target::Host,
        );
        invocation.silent = true;

        let result = self.executor.execute(&invocation).map_err(|e| {
            if e.code == ErrorCode::CommandNotFound {
                Error::interpreter_not_found(spec.name.clone(), &spec.interpreter)
            } else {
                Error::provision_create_failed(
                    spec.name.clone(),
                    Some(spec.interpreter.clone()),
                    e.message,
                )
            }
        })?;

        if !result.success {
            return Err(Error::provision_create_failed(
                spec.name.clone(),
                Some(spec.interpreter.clone()),
                result.captured_output(),
            ));
        }

        EnvMarker {
            interpreter: spec.interpreter.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
        .write(&spec.location)?;

        Ok(Created::Fresh)
    }

    fn install(&self, spec: &EnvSpec, specifiers: &[String]) -> Result<()> {
        let mut args = vec!["-m".to_string(), "pip".to_string(), "install".to_string()];
        args.extend(specifiers.iter().cloned());

        let mut invocation = Invocation::new(
            "python",
            args,
            Target::Environment {
                location: spec.location.clone(),
            },
        );
        invocation.silent = true;

        let result = self
            .executor
            .execute(&invocation)
            .map_err(|e| Error::provision_install_failed(spec.name.clone(), e.message))?;

        if result.success {
            Ok(())
        } else {
            Err(Error::provision_install_failed(
                spec.name.clone(),
                result.captured_output(),
            ))
        }
    }
}

/// One isolated environment, exclusively owned by the running instance.
#[derive(Debug)]
pub struct EnvironmentHandle {
    spec: EnvSpec,
    state: EnvState,
    installed: HashSet<BTreeSet<String>>,
}

impl EnvironmentHandle {
    pub fn new(spec: EnvSpec) -> Self {
        Self {
            spec,
            state: EnvState::Uninitialized,
            installed: HashSet::new(),
        }
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn location(&self) -> &Path {
        &self.spec.location
    }

    /// Where commands issued through this handle run.
    pub fn target(&self) -> Target {
        match self.spec.backend {
            Backend::Venv => Target::Environment {
                location: self.spec.location.clone(),
            },
            Backend::None => Target::Host,
        }
    }

    fn check_not_failed(&self) -> Result<()> {
        if self.state == EnvState::Failed {
            Err(Error::provision_environment_failed(self.spec.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Create the environment on first use.
    pub fn ensure_ready(&mut self, provisioner: &dyn Provisioner) -> Result<Option<Created>> {
        self.check_not_failed()?;
        if self.state == EnvState::Ready {
            return Ok(None);
        }

        if self.spec.backend == Backend::None {
            self.state = EnvState::Ready;
            return Ok(None);
        }

        match provisioner.create(&self.spec) {
            Ok(created) => {
                self.state = EnvState::Ready;
                Ok(Some(created))
            }
            Err(err) => {
                self.state = EnvState::Failed;
                Err(err)
            }
        }
    }

    /// Install `specifiers` unless this exact set is already installed.
    ///
    /// Returns `true` when an install step actually ran.
    pub fn install(&mut self, provisioner: &dyn Provisioner, specifiers: &[String]) -> Result<bool> {
        self.check_not_failed()?;

        if self.spec.backend == Backend::None {
            return Err(Error::provision_no_environment(self.spec.name.clone()));
        }

        let key: BTreeSet<String> = specifiers.iter().cloned().collect();
        if key.is_empty() || self.installed.contains(&key) {
            return Ok(false);
        }

        self.ensure_ready(provisioner)?;

        match provisioner.install(&self.spec, specifiers) {
            Ok(()) => {
                self.installed.insert(key);
                Ok(true)
            }
            Err(err) => {
                self.state = EnvState::Failed;
                Err(err)
            }
        }
    }
}

/// Hands out environment handles, one per session instance.
pub struct Environments<'a> {
    provisioner: &'a dyn Provisioner,
    envdir: PathBuf,
    reuse: bool,
    default_interpreter: String,
}

impl<'a> Environments<'a> {
    pub fn new(
        provisioner: &'a dyn Provisioner,
        envdir: PathBuf,
        reuse: bool,
        default_interpreter: impl Into<String>,
    ) -> Self {
        Self {
            provisioner,
            envdir,
            reuse,
            default_interpreter: default_interpreter.into(),
        }
    }

    /// Build the handle for `instance` and create its environment.
    ///
    /// On failure the error is returned; the instance never reaches its body.
    pub fn acquire(&self, instance: &SessionInstance) -> Result<(EnvironmentHandle, Option<Created>)> {
        let spec = EnvSpec {
            name: instance.id().to_string(),
            version: instance.version().map(str::to_string),
            interpreter: interpreter_for(instance.version(), &self.default_interpreter),
            backend: instance.definition().env_backend(),
            location: paths::env_location(&self.envdir, instance.id())?,
            reuse: self.reuse,
        };
        let mut handle = EnvironmentHandle::new(spec);
        let created = handle.ensure_ready(self.provisioner)?;
        Ok((handle, created))
    }
}
