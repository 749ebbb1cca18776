//! Session file (`drover.toml`) loading.
//!
//! The file is read once, validated completely, and turned into an immutable
//! [`Registry`]. Every step becomes a typed [`Step`]; a session's body is the
//! step interpreter closed over its steps and the file's `[vars]`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::defaults::{Backend, FileOptions};
use crate::error::{Error, Result};
use crate::paths;
use crate::registry::Registry;
use crate::session::{normalize_platform, platform_matches, BodyOutcome, Session, SessionDef};
use crate::utils::template::{self, Bindings, TemplateVars};
use crate::utils::{io, validation};

const GLOB_PREFIX: &str = "glob:";

const BUILTIN_VARS: &[&str] = &[
    TemplateVars::POSARGS,
    TemplateVars::ENVDIR,
    TemplateVars::PYTHON,
    TemplateVars::SESSION,
];

// ============================================================================
// Raw file schema
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionFile {
    #[serde(default)]
    options: FileOptions,
    #[serde(default)]
    vars: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "session")]
    sessions: Vec<SessionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    python: Option<PythonSpec>,
    #[serde(default)]
    posargs: Vec<String>,
    #[serde(default)]
    backend: Backend,
    #[serde(default, rename = "step")]
    steps: Vec<StepEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PythonSpec {
    One(String),
    Many(Vec<String>),
}

impl PythonSpec {
    fn versions(&self) -> Vec<String> {
        match self {
            PythonSpec::One(v) => vec![v.clone()],
            PythonSpec::Many(vs) => vs.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepEntry {
    #[serde(default)]
    install: Option<Vec<String>>,
    #[serde(default)]
    run: Option<Vec<String>>,
    #[serde(default)]
    notify: Option<String>,
    #[serde(default)]
    log: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    include: Option<String>,

    #[serde(default)]
    posargs: Option<Vec<String>>,
    #[serde(default)]
    external: bool,
    #[serde(default)]
    may_fail: bool,
    #[serde(default)]
    silent: bool,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    success_codes: Vec<i32>,
}

impl StepEntry {
    fn actions(&self) -> Vec<&'static str> {
        let mut found = Vec::new();
        if self.install.is_some() {
            found.push("install");
        }
        if self.run.is_some() {
            found.push("run");
        }
        if self.notify.is_some() {
            found.push("notify");
        }
        if self.log.is_some() {
            found.push("log");
        }
        if self.platform.is_some() {
            found.push("platform");
        }
        if self.include.is_some() {
            found.push("include");
        }
        found
    }

    fn has_run_modifiers(&self) -> bool {
        self.external
            || self.may_fail
            || self.silent
            || !self.env.is_empty()
            || !self.success_codes.is_empty()
    }
}

// ============================================================================
// Typed steps
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStep {
    pub argv: Vec<String>,
    pub external: bool,
    pub may_fail: bool,
    pub silent: bool,
    pub env: Vec<(String, String)>,
    pub success_codes: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Install(Vec<String>),
    Run(RunStep),
    Notify {
        session: String,
        posargs: Option<Vec<String>>,
    },
    Log(String),
    /// Skip the rest of the body unless the host matches.
    Platform(String),
}

/// A loaded and validated session file.
#[derive(Debug)]
pub struct SessionConfig {
    pub path: PathBuf,
    /// Directory containing the file. Commands run here.
    pub root: PathBuf,
    pub options: FileOptions,
    pub vars: BTreeMap<String, Vec<String>>,
    pub registry: Registry,
}

/// Find the session file: an explicit path, else `drover.toml` in `cwd`.
pub fn locate(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    let path = match explicit {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => cwd.join(p),
        None => cwd.join(paths::SESSION_FILE),
    };
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::config_missing_file(path.display().to_string()))
    }
}

pub fn load(path: &Path) -> Result<SessionConfig> {
    let content = io::read_file(path, "read session file")?;
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    parse(&content, &path)
}

/// Parse and validate session-file content. `path` locates relative globs and
/// the working directory.
pub fn parse(content: &str, path: &Path) -> Result<SessionConfig> {
    let file: SessionFile = toml::from_str(content)
        .map_err(|e| Error::config_invalid_toml(path.display().to_string(), e))?;

    let root = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let vars = expand_vars(&file.vars, &root)?;
    let registry = build_registry(&file, &vars)?;

    Ok(SessionConfig {
        path: path.to_path_buf(),
        root,
        options: file.options,
        vars,
        registry,
    })
}

fn expand_vars(
    raw: &BTreeMap<String, Vec<String>>,
    root: &Path,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut vars = BTreeMap::new();
    for (key, entries) in raw {
        if BUILTIN_VARS.contains(&key.as_str()) {
            return Err(Error::config_invalid_value(
                format!("vars.{}", key),
                None,
                format!("'{}' is a built-in placeholder and cannot be redefined", key),
            ));
        }

        let mut values = Vec::new();
        for entry in entries {
            match entry.strip_prefix(GLOB_PREFIX) {
                Some(pattern) => values.extend(expand_glob(pattern.trim(), root, key)?),
                None => values.push(entry.clone()),
            }
        }
        vars.insert(key.clone(), values);
    }
    Ok(vars)
}

/// Matches are relative to `root` and sorted, so runs are reproducible.
fn expand_glob(pattern: &str, root: &Path, key: &str) -> Result<Vec<String>> {
    let full = root.join(pattern);
    let entries = glob::glob(&full.to_string_lossy()).map_err(|e| {
        Error::config_invalid_value(format!("vars.{}", key), Some(pattern.to_string()), e.to_string())
    })?;

    let mut matches = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::internal_io(e.to_string(), Some(format!("expand vars.{}", key))))?;
        let relative = path.strip_prefix(root).unwrap_or(&path);
        matches.push(relative.display().to_string());
    }
    matches.sort();
    Ok(matches)
}

fn build_registry(file: &SessionFile, vars: &BTreeMap<String, Vec<String>>) -> Result<Registry> {
    let mut by_name: HashMap<&str, &SessionEntry> = HashMap::new();
    for entry in &file.sessions {
        validation::require_session_name(&entry.name)?;
        by_name.insert(entry.name.as_str(), entry);
    }
    let known: HashSet<&str> = by_name.keys().copied().collect();
    let vars = Arc::new(vars.clone());

    let mut registry = Registry::new();
    for entry in &file.sessions {
        let mut stack = Vec::new();
        let steps = Arc::new(flatten_steps(entry, &by_name, &known, vars.as_ref(), &mut stack)?);
        let versions = entry.python.as_ref().map(PythonSpec::versions).unwrap_or_default();
        for version in &versions {
            validation::require_non_empty(version, &format!("session.{}.python", entry.name), "Python version cannot be empty")?;
        }

        let body_vars = Arc::clone(&vars);
        let mut definition = SessionDef::new(entry.name.clone(), move |session| {
            execute_steps(session, &steps, &body_vars)
        })
        .python(versions)
        .posargs(entry.posargs.clone())
        .backend(entry.backend);
        if let Some(description) = &entry.description {
            definition = definition.description(description.clone());
        }
        registry.register(definition)?;
    }

    if let Some(defaults) = &file.options.sessions {
        registry.set_defaults(defaults.clone())?;
    }

    Ok(registry)
}

fn flatten_steps(
    entry: &SessionEntry,
    by_name: &HashMap<&str, &SessionEntry>,
    known: &HashSet<&str>,
    vars: &BTreeMap<String, Vec<String>>,
    stack: &mut Vec<String>,
) -> Result<Vec<Step>> {
    if stack.iter().any(|name| name == &entry.name) {
        stack.push(entry.name.clone());
        return Err(Error::config_invalid_value(
            format!("session.{}.step", entry.name),
            None,
            format!("include cycle: {}", stack.join(" -> ")),
        ));
    }
    stack.push(entry.name.clone());

    let mut steps = Vec::new();
    for (index, raw) in entry.steps.iter().enumerate() {
        let key = format!("session.{}.step[{}]", entry.name, index);
        match convert_step(raw, &key, known, vars)? {
            Converted::Step(step) => steps.push(step),
            Converted::Include(target) => {
                let included = by_name.get(target.as_str()).ok_or_else(|| {
                    Error::session_not_found(target.clone(), sorted(known))
                        .with_hint(format!("Referenced by include in {}", key))
                })?;
                steps.extend(flatten_steps(included, by_name, known, vars, stack)?);
            }
        }
    }

    stack.pop();
    Ok(steps)
}

enum Converted {
    Step(Step),
    Include(String),
}

fn convert_step(
    raw: &StepEntry,
    key: &str,
    known: &HashSet<&str>,
    vars: &BTreeMap<String, Vec<String>>,
) -> Result<Converted> {
    let actions = raw.actions();
    if actions.len() != 1 {
        return Err(Error::config_invalid_value(
            key,
            None,
            format!(
                "each step needs exactly one of install, run, notify, log, platform, include (found: {})",
                if actions.is_empty() { "none".to_string() } else { actions.join(", ") }
            ),
        ));
    }
    if raw.run.is_none() && raw.has_run_modifiers() {
        return Err(Error::config_invalid_value(
            key,
            None,
            "external, may_fail, silent, env and success_codes only apply to run steps",
        ));
    }
    if raw.notify.is_none() && raw.posargs.is_some() {
        return Err(Error::config_invalid_value(key, None, "posargs only applies to notify steps"));
    }

    if let Some(specs) = &raw.install {
        validation::require_non_empty_vec(specs, key, "install needs at least one specifier")?;
        check_placeholders(specs, key, vars)?;
        return Ok(Converted::Step(Step::Install(specs.clone())));
    }

    if let Some(argv) = &raw.run {
        validation::require_non_empty_vec(argv, key, "run needs a program")?;
        validation::require_non_empty(&argv[0], key, "run needs a program")?;
        check_placeholders(argv, key, vars)?;
        let env: Vec<String> = raw.env.values().cloned().collect();
        check_placeholders(&env, key, vars)?;
        return Ok(Converted::Step(Step::Run(RunStep {
            argv: argv.clone(),
            external: raw.external,
            may_fail: raw.may_fail,
            silent: raw.silent,
            env: raw.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            success_codes: raw.success_codes.clone(),
        })));
    }

    if let Some(target) = &raw.notify {
        if !known.contains(target.as_str()) {
            return Err(Error::session_not_found(target.clone(), sorted(known))
                .with_hint(format!("Referenced by notify in {}", key)));
        }
        if let Some(args) = &raw.posargs {
            check_placeholders(args, key, vars)?;
        }
        return Ok(Converted::Step(Step::Notify {
            session: target.clone(),
            posargs: raw.posargs.clone(),
        }));
    }

    if let Some(message) = &raw.log {
        check_placeholders(std::slice::from_ref(message), key, vars)?;
        return Ok(Converted::Step(Step::Log(message.clone())));
    }

    if let Some(platform) = &raw.platform {
        let platform = validation::require_non_empty(platform, key, "platform cannot be empty")?;
        return Ok(Converted::Step(Step::Platform(normalize_platform(platform))));
    }

    match &raw.include {
        Some(target) => Ok(Converted::Include(target.clone())),
        None => Err(Error::internal_unexpected(format!("{}: step without action", key))),
    }
}

fn check_placeholders(args: &[String], key: &str, vars: &BTreeMap<String, Vec<String>>) -> Result<()> {
    for arg in args {
        for name in template::referenced(arg) {
            if !BUILTIN_VARS.contains(&name.as_str()) && !vars.contains_key(&name) {
                return Err(Error::config_invalid_value(
                    key,
                    Some(arg.clone()),
                    format!("unknown placeholder {{{{{}}}}}", name),
                ));
            }
        }
    }
    Ok(())
}

fn sorted(known: &HashSet<&str>) -> Vec<String> {
    let mut names: Vec<String> = known.iter().map(|s| s.to_string()).collect();
    names.sort();
    names
}

// ============================================================================
// Step interpreter
// ============================================================================

/// Run `steps` as a session body.
pub fn execute_steps(
    session: &mut Session<'_>,
    steps: &[Step],
    vars: &BTreeMap<String, Vec<String>>,
) -> Result<BodyOutcome> {
    let bindings = bindings_for(session, vars);

    for step in steps {
        match step {
            Step::Platform(platform) => {
                if !platform_matches(platform) {
                    return session.skip(format!("only runs on {}", platform));
                }
            }
            Step::Install(specs) => session.install(template::expand_args(specs, &bindings))?,
            Step::Run(run) => {
                let argv = template::expand_args(&run.argv, &bindings);
                let Some((program, args)) = argv.split_first() else {
                    return Err(Error::config_invalid_value(
                        format!("session.{}.step", session.name()),
                        Some(run.argv.join(" ")),
                        "run expanded to an empty command",
                    ));
                };

                let mut cmd = session
                    .cmd(program.clone())
                    .args(args.iter().cloned())
                    .success_codes(run.success_codes.clone());
                if run.external {
                    cmd = cmd.external();
                }
                if run.may_fail {
                    cmd = cmd.may_fail();
                }
                if run.silent {
                    cmd = cmd.silent();
                }
                for (k, v) in &run.env {
                    cmd = cmd.env(k.clone(), template::render(v, &bindings));
                }
                cmd.run()?;
            }
            Step::Notify {
                session: target,
                posargs,
            } => match posargs {
                Some(args) => session.notify_with_args(target, template::expand_args(args, &bindings))?,
                None => session.notify(target)?,
            },
            Step::Log(message) => session.log(template::render(message, &bindings)),
        }
    }

    Ok(BodyOutcome::Completed)
}

fn bindings_for(session: &Session<'_>, vars: &BTreeMap<String, Vec<String>>) -> Bindings {
    let mut bindings = Bindings::new()
        .list(TemplateVars::POSARGS, session.posargs().to_vec())
        .scalar(TemplateVars::ENVDIR, session.envdir().display().to_string())
        .scalar(TemplateVars::PYTHON, session.python().unwrap_or_default())
        .scalar(TemplateVars::SESSION, session.id());
    for (key, values) in vars {
        bindings = bindings.list(key, values.clone());
    }
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(content: &str) -> Result<SessionConfig> {
        parse(content, Path::new("/project/drover.toml"))
    }

    #[test]
    fn parses_sessions_in_declaration_order() {
        let config = parse_str(
            r#"
[options]
sessions = ["tests", "lint"]

[[session]]
name = "tests"
python = ["3.7", "3.8"]
[[session.step]]
install = ["pytest"]
[[session.step]]
run = ["pytest", "{{posargs}}"]

[[session]]
name = "lint"
python = "3.7"
[[session.step]]
run = ["flake8"]

[[session]]
name = "docs"
backend = "none"
[[session.step]]
log = "building docs"
"#,
        )
        .unwrap();

        assert_eq!(config.registry.names(), ["tests", "lint", "docs"]);
        assert_eq!(config.registry.default_names(), ["tests", "lint"]);
        assert_eq!(config.registry.instances_of("tests").len(), 2);
        assert_eq!(config.registry.instances_of("lint")[0].id(), "lint-3.7");
        assert_eq!(
            config.registry.get("docs").unwrap().env_backend(),
            Backend::None
        );
        assert_eq!(config.root, PathBuf::from("/project"));
    }

    #[test]
    fn rejects_step_with_two_actions() {
        let err = parse_str(
            r#"
[[session]]
name = "lint"
[[session.step]]
run = ["flake8"]
install = ["flake8"]
"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
        assert!(err.details["problem"].as_str().unwrap().contains("install, run"));
    }

    #[test]
    fn rejects_run_modifiers_on_other_steps() {
        let err = parse_str(
            r#"
[[session]]
name = "lint"
[[session.step]]
install = ["flake8"]
external = true
"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn rejects_unknown_notify_target() {
        let err = parse_str(
            r#"
[[session]]
name = "tests"
[[session.step]]
notify = "cover"
"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.session_not_found");
    }

    #[test]
    fn rejects_unknown_default_session() {
        let err = parse_str(
            r#"
[options]
sessions = ["missing"]

[[session]]
name = "tests"
"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.session_not_found");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = parse_str(
            r#"
[[session]]
name = "lint"
[[session.step]]
run = ["black", "{{files}}"]
"#,
        )
        .unwrap_err();
        assert!(err.details["problem"].as_str().unwrap().contains("{{files}}"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_str(
            r#"
[[session]]
name = "lint"
pyhton = "3.7"
"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_toml");
    }

    #[test]
    fn clashing_instance_ids_are_rejected() {
        let err = parse_str(
            r#"
[[session]]
name = "tests"
python = ["3.7"]

[[session]]
name = "tests-3.7"
"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
        assert_eq!(err.details["key"], "session.tests-3.7");
    }

    #[test]
    fn include_inlines_steps() {
        let config = parse_str(
            r#"
[[session]]
name = "build"
[[session.step]]
run = ["python", "setup.py", "sdist"]

[[session]]
name = "publish"
[[session.step]]
include = "build"
[[session.step]]
run = ["twine", "upload", "dist/*"]
"#,
        )
        .unwrap();
        assert!(config.registry.contains("publish"));
    }

    #[test]
    fn include_cycle_is_rejected() {
        let err = parse_str(
            r#"
[[session]]
name = "a"
[[session.step]]
include = "b"

[[session]]
name = "b"
[[session.step]]
include = "a"
"#,
        )
        .unwrap_err();
        assert!(err.details["problem"].as_str().unwrap().contains("include cycle"));
    }

    #[test]
    fn builtin_vars_cannot_be_redefined() {
        let err = parse_str(
            r#"
[vars]
posargs = ["x"]
"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn glob_vars_expand_relative_to_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("setup.py"), "").unwrap();
        std::fs::write(dir.path().join("noxlike.py"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();
        let path = dir.path().join("drover.toml");

        let config = parse(
            r#"
[vars]
files = ["gdbgui", "tests", "glob:*.py"]
"#,
            &path,
        )
        .unwrap();

        assert_eq!(
            config.vars["files"],
            ["gdbgui", "tests", "noxlike.py", "setup.py"]
        );
    }

    #[test]
    fn locate_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = locate(None, dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_file");

        std::fs::write(dir.path().join("drover.toml"), "").unwrap();
        assert!(locate(None, dir.path()).is_ok());
    }
}
