mod common;

use std::fs;

use common::{RecordingExecutor, RecordingProvisioner};
use drover::config::{self, SessionConfig};
use drover::defaults::{ExternalPolicy, RunOptions};
use drover::executor::Target;
use drover::report::Outcome;
use drover::{RunRequest, Runner};
use tempfile::TempDir;

const DEMO: &str = include_str!("../demos/drover.toml");

fn demo_project() -> (TempDir, SessionConfig) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("setup.py"), "").unwrap();
    fs::write(dir.path().join("make_executable.py"), "").unwrap();
    let path = dir.path().join("drover.toml");
    fs::write(&path, DEMO).unwrap();

    let config = config::load(&path).unwrap();
    (dir, config)
}

fn run(config: &SessionConfig, executor: &RecordingExecutor, provisioner: &RecordingProvisioner, request: RunRequest) -> drover::report::RunReport {
    drover::logging::set_quiet(true);
    let options = RunOptions::from_file(&config.options);
    Runner::new(&config.registry, executor, provisioner, options, config.root.clone())
        .run(&request)
        .unwrap()
}

#[test]
fn demo_file_registers_every_session() {
    let (_dir, config) = demo_project();

    assert_eq!(config.registry.len(), 14);
    assert_eq!(config.registry.default_names(), ["tests", "lint", "docs"]);
    let tests: Vec<&str> = config
        .registry
        .instances_of("tests")
        .iter()
        .map(|i| i.id())
        .collect();
    assert_eq!(tests, ["tests-3.6", "tests-3.7", "tests-3.8"]);
    assert_eq!(
        config.registry.get("cover").unwrap().about(),
        Some("Coverage analysis")
    );
}

#[test]
fn default_run_executes_defaults_then_notified_cover() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    let report = run(&config, &executor, &provisioner, RunRequest::default());

    assert_eq!(
        report.ids(),
        ["tests-3.6", "tests-3.7", "tests-3.8", "lint-3.7", "docs-3.7", "cover"]
    );
    assert_eq!(report.exit_code(), 0);

    let pytest = executor.find("pytest").unwrap();
    assert_eq!(pytest.args.last().map(String::as_str), Some("tests"));
    assert!(executor.find("yarn").unwrap().external);
    assert!(!pytest.external);
    assert!(matches!(pytest.target, Target::Environment { .. }));
    assert_eq!(pytest.cwd.as_deref(), Some(config.root.as_path()));
}

#[test]
fn posargs_replace_session_defaults() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    run(
        &config,
        &executor,
        &provisioner,
        RunRequest::sessions(["tests-3.8"]).with_posargs(["tests/test_cli.py", "-x"]),
    );

    let pytest = executor.find("pytest").unwrap();
    assert_eq!(
        pytest.args,
        [
            "--cov=gdbgui",
            "--cov-config",
            ".coveragerc",
            "--cov-report=",
            "tests/test_cli.py",
            "-x"
        ]
    );
}

#[test]
fn vars_and_globs_expand_into_arguments() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    run(&config, &executor, &provisioner, RunRequest::sessions(["lint"]));

    let black = executor.find("black").unwrap();
    assert_eq!(
        black.args,
        ["--check", "gdbgui", "tests", "make_executable.py", "setup.py"]
    );
    let installs = provisioner.installs.borrow();
    assert_eq!(installs[0].1, ["black", "flake8", "mypy", "check-manifest"]);
}

#[test]
fn failing_tool_names_the_command_in_the_report() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::failing(&["flake8"]);
    let provisioner = RecordingProvisioner::default();

    let report = run(&config, &executor, &provisioner, RunRequest::sessions(["lint", "docs"]));

    let lint = report.entry("lint-3.7").unwrap();
    assert_eq!(lint.outcome, Outcome::Failed);
    assert_eq!(lint.failed_command.as_ref().unwrap().program, "flake8");
    assert_eq!(outcome_of(&report, "docs-3.7"), Outcome::Success);
    assert!(executor.find("mypy").is_none());
    assert_eq!(report.exit_code(), 1);
}

fn outcome_of(report: &drover::report::RunReport, id: &str) -> Outcome {
    report.entry(id).unwrap().outcome
}

#[test]
fn publish_includes_build_steps() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    run(&config, &executor, &provisioner, RunRequest::sessions(["publish"]));

    assert_eq!(
        executor.programs(),
        ["rm", "yarn", "python", "twine", "python"]
    );
    let upload = executor.calls.borrow().last().cloned().unwrap();
    assert_eq!(upload.args, ["-m", "twine", "upload", "dist/*"]);
}

#[test]
fn platform_guard_skips_other_platforms() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    let report = run(
        &config,
        &executor,
        &provisioner,
        RunRequest::sessions([
            "build_executable_mac",
            "build_executable_linux",
            "build_executable_windows",
        ]),
    );

    let host = drover::session::host_platform();
    let expect = |id: &str, platform: &str| {
        let want = if platform == host {
            Outcome::Success
        } else {
            Outcome::Skipped
        };
        assert_eq!(outcome_of(&report, id), want, "{}", id);
    };
    expect("build_executable_mac-3.8", "macos");
    expect("build_executable_linux-3.8", "linux");
    expect("build_executable_windows-3.8", "windows");

    let built = report.entry("build_executable_current_platform-3.8").is_some();
    assert_eq!(built, ["macos", "linux", "windows"].contains(&host));
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn python_filter_limits_the_matrix() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    let report = run(
        &config,
        &executor,
        &provisioner,
        RunRequest::sessions(["tests", "lint"]).with_python(["3.8"]),
    );

    assert_eq!(report.ids(), ["tests-3.8", "cover"]);
}

#[test]
fn develop_logs_the_environment_location() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    let report = run(&config, &executor, &provisioner, RunRequest::sessions(["develop-3.8"]));

    assert_eq!(outcome_of(&report, "develop-3.8"), Outcome::Success);
    assert!(executor.calls.borrow().is_empty());
    let installs = provisioner.installs.borrow();
    assert_eq!(installs.len(), 2);
    assert_eq!(installs[1].1, ["-e", "."]);
}

#[test]
fn report_file_round_trips() {
    let (dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    let report = run(&config, &executor, &provisioner, RunRequest::sessions(["docs"]));
    let path = dir.path().join("report.json");
    report.write_json(&path).unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["entries"][0]["id"], "docs-3.7");
    assert_eq!(json["entries"][0]["outcome"], "success");
    assert!(json["run_id"].as_str().is_some());
}

#[test]
fn build_runs_yarn_from_the_host_with_a_warning() {
    let (_dir, config) = demo_project();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    run(&config, &executor, &provisioner, RunRequest::sessions(["build"]));

    let yarn = executor.find("yarn").unwrap();
    assert!(!yarn.external);
    assert_eq!(yarn.external_policy, ExternalPolicy::Warn);
    assert!(executor.find("rm").unwrap().external);
}

#[test]
fn run_step_expanding_to_nothing_fails_the_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("drover.toml");
    fs::write(
        &path,
        r#"
[[session]]
name = "exec"
[[session.step]]
run = ["{{posargs}}"]
"#,
    )
    .unwrap();
    let config = config::load(&path).unwrap();
    let executor = RecordingExecutor::default();
    let provisioner = RecordingProvisioner::default();

    let report = run(&config, &executor, &provisioner, RunRequest::sessions(["exec"]));

    let entry = report.entry("exec").unwrap();
    assert_eq!(entry.outcome, Outcome::Failed);
    assert!(entry.reason.as_deref().unwrap().contains("empty command"));
    assert!(executor.calls.borrow().is_empty());
}
