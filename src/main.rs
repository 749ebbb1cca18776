use std::path::PathBuf;

use clap::Parser;

use commands::{Action, GlobalArgs};
use drover::defaults::OptionOverrides;

mod commands;
mod output;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(version = VERSION)]
#[command(about = "Run named sessions in isolated per-session environments")]
struct Cli {
    /// Sessions to run: names (all matrix entries) or instance ids such as tests-3.8
    #[arg(value_name = "SESSION")]
    sessions: Vec<String>,

    /// Session to run (repeatable, combined with positional sessions)
    #[arg(short = 's', long = "session", value_name = "SESSION")]
    session: Vec<String>,

    /// Arguments after `--` are handed to session bodies as posargs
    #[arg(last = true, value_name = "POSARGS")]
    posargs: Vec<String>,

    /// List sessions instead of running them
    #[arg(short, long)]
    list: bool,

    /// Session file (default: ./drover.toml)
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Only run matrix entries for these interpreter versions
    #[arg(short, long, value_name = "VERSION")]
    python: Vec<String>,

    /// Re-use existing environments created with the same interpreter
    #[arg(short, long)]
    reuse_existing: bool,

    /// Stop the run after the first failed session
    #[arg(short = 'x', long)]
    stop_on_first_error: bool,

    /// Directory holding the environments
    #[arg(long, value_name = "DIR")]
    envdir: Option<String>,

    /// Fail commands whose program is only found outside the environment
    #[arg(long)]
    error_on_external_run: bool,

    /// Fail instead of skip when an interpreter is missing
    #[arg(long)]
    error_on_missing_interpreters: bool,

    /// Write the run report as JSON to FILE
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Print the result as a JSON envelope on stdout
    #[arg(long)]
    json: bool,

    /// Only print failures and child output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn into_action(self) -> (Action, GlobalArgs, bool) {
        let global = GlobalArgs { file: self.file };
        let json = self.json;

        if self.list {
            return (Action::List, global, json);
        }

        let mut sessions = self.sessions;
        sessions.extend(self.session);

        let args = commands::run::RunArgs {
            sessions,
            posargs: self.posargs,
            python: self.python,
            overrides: OptionOverrides {
                envdir: self.envdir,
                reuse_existing: self.reuse_existing,
                error_on_external_run: self.error_on_external_run,
                stop_on_first_error: self.stop_on_first_error,
                error_on_missing_interpreters: self.error_on_missing_interpreters,
            },
            report: self.report,
        };
        (Action::Run(args), global, json)
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    drover::logging::set_quiet(cli.quiet);

    let (action, global, json) = cli.into_action();

    if json {
        let (json_result, exit_code) = commands::run_json(action, &global);
        if let Err(err) = output::print_json_result(json_result) {
            output::print_error(&err);
            return std::process::ExitCode::from(1);
        }
        return std::process::ExitCode::from(exit_code_to_u8(exit_code));
    }

    match commands::run_text(action, &global) {
        Ok((content, exit_code)) => {
            print!("{}", content);
            std::process::ExitCode::from(exit_code_to_u8(exit_code))
        }
        Err(err) => {
            output::print_error(&err);
            std::process::ExitCode::from(exit_code_to_u8(output::exit_code_for_error(err.code)))
        }
    }
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posargs_follow_double_dash() {
        let cli = Cli::parse_from(["drover", "tests", "-s", "lint", "--", "-k", "fast"]);
        let (action, _, _) = cli.into_action();
        match action {
            Action::Run(args) => {
                assert_eq!(args.sessions, ["tests", "lint"]);
                assert_eq!(args.posargs, ["-k", "fast"]);
            }
            Action::List => panic!("expected run"),
        }
    }

    #[test]
    fn list_flag_selects_list() {
        let cli = Cli::parse_from(["drover", "--list", "--json"]);
        let (action, _, json) = cli.into_action();
        assert!(matches!(action, Action::List));
        assert!(json);
    }

    #[test]
    fn flags_become_overrides() {
        let cli = Cli::parse_from(["drover", "-r", "-x", "--error-on-external-run", "-p", "3.8"]);
        let (action, _, _) = cli.into_action();
        let Action::Run(args) = action else {
            panic!("expected run");
        };
        assert!(args.overrides.reuse_existing);
        assert!(args.overrides.stop_on_first_error);
        assert!(args.overrides.error_on_external_run);
        assert_eq!(args.python, ["3.8"]);
    }
}
