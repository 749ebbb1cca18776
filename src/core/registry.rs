//! Session registry: definition name -> concrete instances, one per matrix entry.
//!
//! Built once during configuration load, then shared immutably with the runner.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::session::SessionDef;
use crate::slugify;

/// One (definition, version) execution unit.
#[derive(Debug, Clone)]
pub struct SessionInstance {
    id: String,
    version: Option<String>,
    definition: Arc<SessionDef>,
}

impl SessionInstance {
    /// `name` for unparameterized sessions, `name-version` otherwise.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn definition(&self) -> &SessionDef {
        &self.definition
    }
}

#[derive(Debug)]
struct Entry {
    definition: Arc<SessionDef>,
    instances: Vec<SessionInstance>,
}

fn expand(definition: Arc<SessionDef>) -> Entry {
    let mut versions: Vec<&String> = Vec::new();
    for version in definition.versions() {
        if !versions.contains(&version) {
            versions.push(version);
        }
    }

    let instances = if versions.is_empty() {
        vec![SessionInstance {
            id: definition.name().to_string(),
            version: None,
            definition: Arc::clone(&definition),
        }]
    } else {
        versions
            .into_iter()
            .map(|version| SessionInstance {
                id: format!("{}-{}", definition.name(), version),
                version: Some(version.clone()),
                definition: Arc::clone(&definition),
            })
            .collect()
    };

    Entry {
        definition,
        instances,
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
    defaults: Option<Vec<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Re-registering a name replaces the previous
    /// definition in place, keeping its original position.
    ///
    /// Fails when one of its instances would share an id or an environment
    /// directory with an instance of another definition.
    pub fn register(&mut self, definition: SessionDef) -> Result<&mut Self> {
        let entry = expand(Arc::new(definition));
        self.check_collisions(&entry)?;

        match self
            .entries
            .iter_mut()
            .find(|e| e.definition.name() == entry.definition.name())
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(self)
    }

    fn check_collisions(&self, entry: &Entry) -> Result<()> {
        let name = entry.definition.name();
        let others = self
            .entries
            .iter()
            .filter(|e| e.definition.name() != name)
            .flat_map(|e| e.instances.iter());

        let mut taken = Vec::new();
        for other in others {
            taken.push((other, slugify::slugify_id(other.id(), "instance")?));
        }

        for instance in &entry.instances {
            let slug = slugify::slugify_id(instance.id(), "instance")?;
            for (other, other_slug) in &taken {
                let problem = if other.id() == instance.id() {
                    format!(
                        "instance '{}' is already defined by session '{}'",
                        instance.id(),
                        other.name()
                    )
                } else if *other_slug == slug {
                    format!(
                        "instance '{}' would share environment directory '{}' with '{}'",
                        instance.id(),
                        slug,
                        other.id()
                    )
                } else {
                    continue;
                };
                return Err(Error::config_invalid_value(
                    format!("session.{}", name),
                    Some(instance.id().to_string()),
                    problem,
                ));
            }
        }
        Ok(())
    }

    /// Configure the default run set. Every name must already be registered.
    pub fn set_defaults(&mut self, names: Vec<String>) -> Result<()> {
        for name in &names {
            if !self.contains(name) {
                return Err(Error::session_not_found(name.clone(), self.names())
                    .with_hint("Every name in options.sessions must be a defined session"));
            }
        }
        self.defaults = Some(names);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.definition.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&SessionDef> {
        self.entries
            .iter()
            .find(|e| e.definition.name() == name)
            .map(|e| e.definition.as_ref())
    }

    /// Definition names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.definition.name().to_string())
            .collect()
    }

    /// The default run set: configured defaults, else every session in order.
    pub fn default_names(&self) -> Vec<String> {
        self.defaults.clone().unwrap_or_else(|| self.names())
    }

    pub fn is_default(&self, name: &str) -> bool {
        match &self.defaults {
            Some(defaults) => defaults.iter().any(|d| d == name),
            None => true,
        }
    }

    pub fn instances(&self) -> impl Iterator<Item = &SessionInstance> {
        self.entries.iter().flat_map(|e| e.instances.iter())
    }

    /// All instances of one definition, in matrix order.
    pub fn instances_of(&self, name: &str) -> &[SessionInstance] {
        self.entries
            .iter()
            .find(|e| e.definition.name() == name)
            .map(|e| e.instances.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve a requested name: a definition name selects all its instances,
    /// an instance id (`tests-3.7`) selects exactly one.
    pub fn resolve(&self, requested: &str) -> Result<Vec<SessionInstance>> {
        let by_name = self.instances_of(requested);
        if !by_name.is_empty() {
            return Ok(by_name.to_vec());
        }

        if let Some(instance) = self.instances().find(|i| i.id() == requested) {
            return Ok(vec![instance.clone()]);
        }

        let mut available = self.names();
        available.extend(
            self.instances()
                .filter(|i| i.version().is_some())
                .map(|i| i.id().to_string()),
        );
        Err(Error::session_not_found(requested, available))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
