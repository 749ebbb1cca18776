//! `{{name}}` placeholder expansion for step arguments.
//!
//! An argument that consists of exactly one placeholder naming a list is
//! spliced into that list's elements. Any other placeholder is substituted
//! inline with its scalar value. Unknown placeholders are left untouched.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

pub struct TemplateVars;

impl TemplateVars {
    pub const POSARGS: &'static str = "posargs";
    pub const ENVDIR: &'static str = "envdir";
    pub const PYTHON: &'static str = "python";
    pub const SESSION: &'static str = "session";
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid regex"))
}

fn whole_placeholder(arg: &str) -> Option<&str> {
    let caps = placeholder().captures(arg)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == arg.len() {
        caps.get(1).map(|m| m.as_str())
    } else {
        None
    }
}

/// Values available to a template: scalars substitute inline, lists splice.
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    scalars: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, key: &str, value: impl Into<String>) -> Self {
        self.scalars.insert(key.to_string(), value.into());
        self
    }

    pub fn list(mut self, key: &str, values: Vec<String>) -> Self {
        self.lists.insert(key.to_string(), values);
        self
    }
}

/// Substitute placeholders inside a single string.
pub fn render(template: &str, bindings: &Bindings) -> String {
    placeholder()
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            if let Some(value) = bindings.scalars.get(key) {
                value.clone()
            } else if let Some(values) = bindings.lists.get(key) {
                values.join(" ")
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Expand an argument list, splicing whole-argument list placeholders.
pub fn expand_args(args: &[String], bindings: &Bindings) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        if let Some(values) = whole_placeholder(arg).and_then(|key| bindings.lists.get(key)) {
            out.extend(values.iter().cloned());
        } else {
            out.push(render(arg, bindings));
        }
    }
    out
}

/// Names of all placeholders referenced by a string.
pub fn referenced(template: &str) -> Vec<String> {
    placeholder()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}
