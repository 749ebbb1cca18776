use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CommandFailedDetails, Error, Result};
use crate::utils::{io, shell};

/// Final state of one executed instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    Skipped,
    /// Setup failed before the body ran.
    Errored,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed | Outcome::Errored)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "was successful",
            Outcome::Failed => "failed",
            Outcome::Skipped => "was skipped",
            Outcome::Errored => "errored",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_command: Option<CommandFailedDetails>,
    /// Run because another session notified it.
    #[serde(default)]
    pub notified: bool,
    pub duration_ms: u64,
}

impl ReportEntry {
    pub fn summary_line(&self) -> String {
        let mut line = format!("{} {}", self.id, self.outcome.label());
        if let Some(reason) = &self.reason {
            line.push_str(&format!(": {}", reason));
        }
        if let Some(cmd) = &self.failed_command {
            line.push_str(&format!(" ({})", shell::display_command(&cmd.program, &cmd.args)));
        }
        line
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
}

/// One entry per executed instance, in execution order. Complete only after
/// the notify queue has drained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub entries: Vec<ReportEntry>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stopped_early: bool,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            entries: Vec::new(),
            stopped_early: false,
        }
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn success(&self) -> bool {
        !self.entries.iter().any(|e| e.outcome.is_failure())
    }

    /// 0 iff no instance failed or errored.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> RunSummary {
        let count = |o: Outcome| self.entries.iter().filter(|e| e.outcome == o).count();
        RunSummary {
            total: self.entries.len(),
            succeeded: count(Outcome::Success),
            failed: count(Outcome::Failed),
            skipped: count(Outcome::Skipped),
            errored: count(Outcome::Errored),
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn entry(&self, id: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize run report".to_string())))?;
        io::write_file_atomic(path, &content, "write run report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, outcome: Outcome) -> ReportEntry {
        ReportEntry {
            id: id.to_string(),
            name: id.to_string(),
            python: None,
            outcome,
            reason: None,
            failed_command: None,
            notified: false,
            duration_ms: 0,
        }
    }

    #[test]
    fn skipped_does_not_fail_the_run() {
        let mut report = RunReport::new();
        report.push(entry("tests", Outcome::Success));
        report.push(entry("build_executable_linux", Outcome::Skipped));
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn failed_or_errored_fails_the_run() {
        let mut report = RunReport::new();
        report.push(entry("lint", Outcome::Failed));
        assert_eq!(report.exit_code(), 1);

        let mut report = RunReport::new();
        report.push(entry("tests-3.7", Outcome::Errored));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn summary_line_names_the_failing_command() {
        let mut failed = entry("lint", Outcome::Failed);
        failed.reason = Some("Command flake8 failed with exit code 1".to_string());
        failed.failed_command = Some(CommandFailedDetails {
            program: "flake8".to_string(),
            args: vec!["src".to_string()],
            exit_code: Some(1),
            signal: None,
            stdout: String::new(),
            stderr: String::new(),
        });

        let line = failed.summary_line();
        assert!(line.starts_with("lint failed"));
        assert!(line.contains("(flake8 src)"));
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut report = RunReport::new();
        report.push(entry("a", Outcome::Success));
        report.push(entry("b", Outcome::Skipped));
        report.push(entry("c", Outcome::Failed));

        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn writes_json_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let mut report = RunReport::new();
        report.push(entry("docs", Outcome::Success));
        report.write_json(&path).unwrap();

        let parsed: RunReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.ids(), ["docs"]);
    }
}
