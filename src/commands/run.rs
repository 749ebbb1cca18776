use std::path::PathBuf;

use drover::defaults::{OptionOverrides, RunOptions};
use drover::executor::SystemExecutor;
use drover::{log_status, log_warn};
use drover::provision::VenvProvisioner;
use drover::report::RunReport;
use drover::{RunRequest, Runner};

use super::{CmdResult, GlobalArgs};

#[derive(Debug, Default)]
pub struct RunArgs {
    pub sessions: Vec<String>,
    pub posargs: Vec<String>,
    pub python: Vec<String>,
    pub overrides: OptionOverrides,
    /// Also write the report as JSON to this path.
    pub report: Option<PathBuf>,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunReport> {
    let config = super::load_config(global)?;
    let options = RunOptions::from_file(&config.options).apply(&args.overrides);

    let executor = SystemExecutor;
    let provisioner = VenvProvisioner::new(&executor);
    let runner = Runner::new(&config.registry, &executor, &provisioner, options, config.root.clone());

    let request = RunRequest {
        sessions: args.sessions,
        posargs: args.posargs,
        python: args.python,
    };
    let report = runner.run(&request)?;

    print_summary(&report);
    if let Some(path) = &args.report {
        report.write_json(path)?;
        log_status!("drover", "Report written to {}", path.display());
    }

    let exit_code = report.exit_code();
    Ok((report, exit_code))
}

pub fn run_text(args: RunArgs, global: &GlobalArgs) -> drover::Result<(String, i32)> {
    let (_, exit_code) = run(args, global)?;
    Ok((String::new(), exit_code))
}

/// Failures are always printed; the full list only when not quiet.
fn print_summary(report: &RunReport) {
    if report.entries.is_empty() {
        return;
    }

    log_status!("drover", "Ran {} session instance(s):", report.entries.len());
    for entry in &report.entries {
        if entry.outcome.is_failure() {
            log_warn!("drover", "{}", entry.summary_line());
        } else {
            log_status!("drover", "  {}", entry.summary_line());
        }
    }
    let summary = report.summary();
    log_status!(
        "drover",
        "{} succeeded, {} failed, {} errored, {} skipped",
        summary.succeeded,
        summary.failed,
        summary.errored,
        summary.skipped
    );
    if report.stopped_early {
        log_warn!("drover", "run stopped after the first failure");
    }
}
