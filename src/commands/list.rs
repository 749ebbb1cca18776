use serde::Serialize;

use drover::config::SessionConfig;

use super::{CmdResult, GlobalArgs};

#[derive(Debug, Serialize)]
pub struct ListOutput {
    pub file: String,
    pub sessions: Vec<ListedSession>,
}

#[derive(Debug, Serialize)]
pub struct ListedSession {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Part of the default run set.
    pub default: bool,
}

pub fn run(global: &GlobalArgs) -> CmdResult<ListOutput> {
    let config = super::load_config(global)?;
    Ok((collect(&config), 0))
}

pub fn run_text(global: &GlobalArgs) -> drover::Result<(String, i32)> {
    let config = super::load_config(global)?;
    if config.registry.is_empty() {
        return Ok((format!("No sessions defined in {}\n", config.path.display()), 0));
    }
    Ok((render(&collect(&config)), 0))
}

fn collect(config: &SessionConfig) -> ListOutput {
    let registry = &config.registry;
    let sessions = registry
        .instances()
        .map(|instance| ListedSession {
            id: instance.id().to_string(),
            name: instance.name().to_string(),
            python: instance.version().map(str::to_string),
            description: instance.definition().about().map(str::to_string),
            default: registry.is_default(instance.name()),
        })
        .collect();

    ListOutput {
        file: config.path.display().to_string(),
        sessions,
    }
}

/// `*` marks sessions that run by default, `-` the rest.
fn render(output: &ListOutput) -> String {
    let mut text = format!("Sessions defined in {}:\n\n", output.file);
    for session in &output.sessions {
        let marker = if session.default { '*' } else { '-' };
        match &session.description {
            Some(description) => text.push_str(&format!("{} {} -> {}\n", marker, session.id, description)),
            None => text.push_str(&format!("{} {}\n", marker, session.id)),
        }
    }
    text.push_str("\nsessions marked with * are selected, sessions marked with - are skipped.\n");
    text
}
