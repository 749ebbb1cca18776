#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;

use drover::error::{Error, Result};
use drover::executor::{CommandExecutor, CommandResult, Invocation};
use drover::provision::{Created, EnvSpec, Provisioner};

/// Records every invocation; never spawns anything.
#[derive(Default)]
pub struct RecordingExecutor {
    pub calls: RefCell<Vec<Invocation>>,
    /// Programs that exit with status 1.
    pub failing: HashSet<String>,
    /// Programs that cannot be resolved at all.
    pub missing: HashSet<String>,
}

impl RecordingExecutor {
    pub fn failing(programs: &[&str]) -> Self {
        Self {
            failing: programs.iter().map(|p| p.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|i| i.program.clone()).collect()
    }

    pub fn find(&self, program: &str) -> Option<Invocation> {
        self.calls.borrow().iter().find(|i| i.program == program).cloned()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<CommandResult> {
        if self.missing.contains(&invocation.program) {
            return Err(Error::command_not_found(invocation.program.clone()));
        }
        self.calls.borrow_mut().push(invocation.clone());

        let success = !self.failing.contains(&invocation.program);
        let mut result = CommandResult {
            program: invocation.program.clone(),
            args: invocation.args.clone(),
            exit_code: Some(if success { 0 } else { 1 }),
            success,
            ..CommandResult::default()
        };
        // Silent failures capture a diagnostic on stdout and a warning on stderr.
        if invocation.silent && !success {
            result.stdout = format!("{}: failure detail\n", invocation.program);
            result.stderr = format!("{}: deprecation warning\n", invocation.program);
        }
        Ok(result)
    }
}

/// Counts environment creations and install operations.
#[derive(Default)]
pub struct RecordingProvisioner {
    pub created: RefCell<Vec<String>>,
    pub installs: RefCell<Vec<(String, Vec<String>)>>,
    /// Interpreter programs reported as not found.
    pub missing_interpreters: HashSet<String>,
    /// Environments whose installs fail.
    pub failing_installs: HashSet<String>,
}

impl RecordingProvisioner {
    pub fn install_count(&self, env: &str) -> usize {
        self.installs.borrow().iter().filter(|(name, _)| name == env).count()
    }
}

impl Provisioner for RecordingProvisioner {
    fn create(&self, spec: &EnvSpec) -> Result<Created> {
        if self.missing_interpreters.contains(&spec.interpreter) {
            return Err(Error::interpreter_not_found(spec.name.clone(), &spec.interpreter));
        }
        self.created.borrow_mut().push(spec.name.clone());
        Ok(Created::Fresh)
    }

    fn install(&self, spec: &EnvSpec, specifiers: &[String]) -> Result<()> {
        if self.failing_installs.contains(&spec.name) {
            return Err(Error::provision_install_failed(spec.name.clone(), "resolver error"));
        }
        self.installs
            .borrow_mut()
            .push((spec.name.clone(), specifiers.to_vec()));
        Ok(())
    }
}
