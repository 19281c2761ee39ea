//! Script registry.
//!
//! Read-mostly store of script definitions: concurrent lookups, serialized
//! registration and unregistration. Lookups clone the definition out, so
//! executions hold no live reference into the registry and unregistering a
//! script never aborts an in-flight run.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use tracing::debug;

use crate::definition::ScriptDefinition;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors surfaced synchronously by registration APIs. Never retried
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A script with the given identifier already exists.
    #[error("Duplicate script id: {0}")]
    DuplicateId(String),

    /// The definition is malformed (empty source, zero timeout).
    #[error("Invalid script definition: {0}")]
    InvalidDefinition(String),

    /// No script with the given identifier.
    #[error("Script not found: {0}")]
    NotFound(String),
}

/// Thread-safe registry of script definitions.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: RwLock<HashMap<String, ScriptDefinition>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Fails on duplicate id or malformed definition.
    pub fn register(&self, def: ScriptDefinition) -> Result<()> {
        if def.source.trim().is_empty() {
            return Err(RegistryError::InvalidDefinition(format!(
                "{}: source is empty",
                def.id
            )));
        }
        if def.timeout.is_zero() {
            return Err(RegistryError::InvalidDefinition(format!(
                "{}: timeout must be positive",
                def.id
            )));
        }

        let mut scripts = self.scripts.write().expect("registry lock poisoned");
        if scripts.contains_key(&def.id) {
            return Err(RegistryError::DuplicateId(def.id));
        }
        debug!(script_id = %def.id, kind = %def.kind, "registered script");
        scripts.insert(def.id.clone(), def);
        Ok(())
    }

    /// Look up a definition by id, cloning it out.
    pub fn lookup(&self, id: &str) -> Option<ScriptDefinition> {
        self.scripts
            .read()
            .expect("registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// Remove a definition. In-flight executions captured it by value and
    /// complete un-aborted.
    pub fn unregister(&self, id: &str) -> Result<()> {
        let mut scripts = self.scripts.write().expect("registry lock poisoned");
        match scripts.remove(id) {
            Some(_) => {
                debug!(script_id = %id, "unregistered script");
                Ok(())
            }
            None => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scripts
            .read()
            .expect("registry lock poisoned")
            .contains_key(id)
    }

    /// All registered definitions, in no particular order.
    pub fn list(&self) -> Vec<ScriptDefinition> {
        self.scripts
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scripts.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
