//! Runs requested session instances in order, then drains the notify queue.
//!
//! Per instance: pending -> provisioning -> running -> succeeded | failed | skipped.
//! A failing instance never blocks its siblings unless `stop_on_first_error`
//! is set. Requested names are resolved up front, so an unknown name aborts
//! before anything runs.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use crate::defaults::RunOptions;
use crate::error::{Error, ErrorCode, Result};
use crate::executor::CommandExecutor;
use crate::notify::{NotifyDecision, NotifyQueue};
use crate::paths;
use crate::provision::{Created, Environments, Provisioner};
use crate::registry::{Registry, SessionInstance};
use crate::report::{Outcome, ReportEntry, RunReport};
use crate::session::{BodyOutcome, Notification, Services, Session};

const LOG_PREFIX: &str = "drover";

/// What the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Session names or instance ids. Empty means the default run set.
    pub sessions: Vec<String>,
    /// Positional args handed to every body, overriding definition defaults.
    pub posargs: Vec<String>,
    /// Only run matrix entries with these versions.
    pub python: Vec<String>,
}

impl RunRequest {
    pub fn sessions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sessions: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_posargs<I, S>(mut self, posargs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.posargs = posargs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_python<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.python = versions.into_iter().map(Into::into).collect();
        self
    }
}

pub struct Runner<'r> {
    registry: &'r Registry,
    executor: &'r dyn CommandExecutor,
    provisioner: &'r dyn Provisioner,
    options: RunOptions,
    root: PathBuf,
}

impl<'r> Runner<'r> {
    /// `root` is the directory commands run in and relative envdirs resolve against.
    pub fn new(
        registry: &'r Registry,
        executor: &'r dyn CommandExecutor,
        provisioner: &'r dyn Provisioner,
        options: RunOptions,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            executor,
            provisioner,
            options,
            root: root.into(),
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Resolve the request to the ordered list of instances for the initial pass.
    pub fn plan(&self, request: &RunRequest) -> Result<Vec<SessionInstance>> {
        let names = if request.sessions.is_empty() {
            self.registry.default_names()
        } else {
            request.sessions.clone()
        };

        let mut planned: Vec<SessionInstance> = Vec::new();
        for name in &names {
            for instance in self.registry.resolve(name)? {
                if !matches_python(&instance, &request.python) {
                    continue;
                }
                if planned.iter().any(|p| p.id() == instance.id()) {
                    continue;
                }
                planned.push(instance);
            }
        }
        Ok(planned)
    }

    pub fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let planned = self.plan(request)?;
        let envdir = paths::envdir(&self.root, &self.options.envdir)?;
        let environments = Environments::new(
            self.provisioner,
            envdir,
            self.options.reuse_existing,
            self.options.default_interpreter.clone(),
        );

        let mut report = RunReport::new();
        let mut queue = NotifyQueue::new();

        if planned.is_empty() {
            log_status!(LOG_PREFIX, "No sessions selected");
            return Ok(report);
        }
        log_status!(LOG_PREFIX, "Running {} session instance(s)", planned.len());

        for (index, instance) in planned.iter().enumerate() {
            let pending: HashSet<String> = planned[index..]
                .iter()
                .map(|i| i.name().to_string())
                .collect();
            let posargs = select_posargs(instance, None, &request.posargs);
            let (entry, notifications) = self.run_instance(instance, posargs, &environments, false);
            offer_all(&mut queue, notifications, &pending, instance.id());

            if self.record(&mut report, entry) {
                return Ok(report);
            }
        }

        let nothing_pending = HashSet::new();
        while let Some(notification) = queue.pop() {
            let instances: Vec<&SessionInstance> = self
                .registry
                .instances_of(&notification.name)
                .iter()
                .filter(|i| matches_python(i, &request.python))
                .collect();

            for instance in instances {
                let posargs = select_posargs(instance, notification.posargs.as_deref(), &request.posargs);
                let (entry, notifications) = self.run_instance(instance, posargs, &environments, true);
                offer_all(&mut queue, notifications, &nothing_pending, instance.id());

                if self.record(&mut report, entry) {
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }

    /// Push the entry; returns `true` when the run must stop here.
    fn record(&self, report: &mut RunReport, entry: ReportEntry) -> bool {
        let stop = entry.outcome.is_failure() && self.options.stop_on_first_error;
        report.push(entry);
        if stop {
            report.stopped_early = true;
            log_status!(LOG_PREFIX, "Stopping after first error");
        }
        stop
    }

    fn run_instance(
        &self,
        instance: &SessionInstance,
        posargs: Vec<String>,
        environments: &Environments<'_>,
        notified: bool,
    ) -> (ReportEntry, Vec<Notification>) {
        let started = Instant::now();
        let id = instance.id();
        log_status!(id, "Running session {}", id);

        let mut entry = ReportEntry {
            id: id.to_string(),
            name: instance.name().to_string(),
            python: instance.version().map(str::to_string),
            outcome: Outcome::Success,
            reason: None,
            failed_command: None,
            notified,
            duration_ms: 0,
        };

        let handle = match environments.acquire(instance) {
            Ok((handle, created)) => {
                match created {
                    Some(Created::Fresh) => {
                        log_status!(id, "Created environment at {}", handle.location().display())
                    }
                    Some(Created::Reused) => {
                        log_status!(id, "Re-using existing environment at {}", handle.location().display())
                    }
                    None => {}
                }
                handle
            }
            Err(err) => {
                let missing_interpreter = err.code == ErrorCode::ProvisionInterpreterNotFound
                    && !self.options.error_on_missing_interpreters;
                entry.outcome = if missing_interpreter {
                    Outcome::Skipped
                } else {
                    Outcome::Errored
                };
                entry.reason = Some(describe(&err));
                return (self.finish_entry(entry, started), Vec::new());
            }
        };

        let services = Services {
            registry: self.registry,
            executor: self.executor,
            provisioner: self.provisioner,
            external_policy: self.options.external,
            cwd: &self.root,
        };
        let mut session = Session::new(instance, handle, posargs, services);
        let body = instance.definition().body();
        let result = body(&mut session);
        let finished = session.finish();

        match result {
            Ok(BodyOutcome::Completed) => {}
            Ok(BodyOutcome::Skipped(reason)) => {
                entry.outcome = Outcome::Skipped;
                entry.reason = Some(reason);
            }
            Err(err) => {
                entry.outcome = Outcome::Failed;
                entry.failed_command = err.failed_command();
                entry.reason = Some(describe(&err));
            }
        }

        (self.finish_entry(entry, started), finished.notifications)
    }

    fn finish_entry(&self, mut entry: ReportEntry, started: Instant) -> ReportEntry {
        entry.duration_ms = started.elapsed().as_millis() as u64;
        match &entry.reason {
            Some(reason) => log_status!(entry.id, "Session {} {}: {}", entry.id, entry.outcome.label(), reason),
            None => log_status!(entry.id, "Session {} {}", entry.id, entry.outcome.label()),
        }
        entry
    }
}

fn matches_python(instance: &SessionInstance, filter: &[String]) -> bool {
    match instance.version() {
        Some(version) => filter.is_empty() || filter.iter().any(|f| f == version),
        None => true,
    }
}

/// Notify args, else run args, else the definition's defaults.
fn select_posargs(instance: &SessionInstance, notified: Option<&[String]>, requested: &[String]) -> Vec<String> {
    if let Some(args) = notified {
        return args.to_vec();
    }
    if !requested.is_empty() {
        return requested.to_vec();
    }
    instance.definition().default_posargs().to_vec()
}

fn offer_all(
    queue: &mut NotifyQueue,
    notifications: Vec<Notification>,
    pending: &HashSet<String>,
    from: &str,
) {
    for notification in notifications {
        let name = notification.name.clone();
        match queue.offer(notification, pending) {
            NotifyDecision::Queued => log_status!(from, "Notified {}", name),
            NotifyDecision::AlreadyQueued => log_status!(from, "{} already notified", name),
            NotifyDecision::PendingInInitialPass => {
                log_status!(from, "{} is already scheduled in this run", name)
            }
        }
    }
}

fn describe(err: &Error) -> String {
    let mut text = err.message.clone();
    for hint in &err.hints {
        text.push_str(&format!(" (hint: {})", hint.message));
    }
    text
}
