//! Harness configuration.
//!
//! Routes and script sources are loaded at startup from a JSON document:
//!
//! ```json
//! {
//!   "scripts": [
//!     { "id": "temp-range", "kind": "filter", "source": "return msg.temp > 25;" }
//!   ],
//!   "routes": {
//!     "telemetry": { "filters": ["temp-range"], "transforms": [], "enrichers": [] }
//!   }
//! }
//! ```
//!
//! Validation happens before any message flows: every script id referenced
//! by a route must be defined with the kind its stage requires, and every
//! source must pass the static sandbox checks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rulebench_scripts::{ScriptDefinition, ScriptEngine, ScriptKind, ScriptRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::pipeline::Pipeline;
use crate::route::Route;
use crate::sink::DeliverySink;

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Route {route} references undefined script `{script_id}`")]
    UnknownScript { route: String, script_id: String },

    #[error("Route {route} uses `{script_id}` as a {expected} stage but it is declared {actual}")]
    KindMismatch {
        route: String,
        script_id: String,
        expected: ScriptKind,
        actual: ScriptKind,
    },

    #[error("Invalid script: {0}")]
    InvalidScript(String),
}

/// One script in the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub id: String,
    pub kind: ScriptKind,
    pub source: String,
    /// Per-execution time budget; the engine default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ScriptEntry {
    fn to_definition(&self) -> ScriptDefinition {
        let mut def = ScriptDefinition::new(&self.id, self.kind, &self.source);
        if let Some(ms) = self.timeout_ms {
            def = def.with_timeout(Duration::from_millis(ms));
        }
        def
    }
}

/// The full harness configuration: scripts plus route chains.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub scripts: Vec<ScriptEntry>,
    #[serde(default)]
    pub routes: HashMap<String, Route>,
}

impl HarnessConfig {
    pub fn from_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    /// Check cross-references and script sources without running anything.
    pub fn validate(&self) -> Result<()> {
        let engine = ScriptEngine::new();
        let mut kinds: HashMap<&str, ScriptKind> = HashMap::new();
        for entry in &self.scripts {
            engine
                .validate(&entry.to_definition())
                .map_err(ConfigError::InvalidScript)?;
            kinds.insert(entry.id.as_str(), entry.kind);
        }

        for (route_id, route) in &self.routes {
            let stages = route
                .decoder
                .iter()
                .map(|id| (id, ScriptKind::Decoder))
                .chain(route.filters.iter().map(|id| (id, ScriptKind::Filter)))
                .chain(route.transforms.iter().map(|id| (id, ScriptKind::Transform)))
                .chain(route.enrichers.iter().map(|id| (id, ScriptKind::Transform)));

            for (script_id, expected) in stages {
                match kinds.get(script_id.as_str()) {
                    None => {
                        return Err(ConfigError::UnknownScript {
                            route: route_id.clone(),
                            script_id: script_id.clone(),
                        })
                    }
                    Some(actual) if *actual != expected => {
                        return Err(ConfigError::KindMismatch {
                            route: route_id.clone(),
                            script_id: script_id.clone(),
                            expected,
                            actual: *actual,
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Register all scripts and assemble a pipeline around the given sink.
    pub fn build(&self, sink: Arc<dyn DeliverySink>) -> Result<(Arc<ScriptRegistry>, Pipeline)> {
        let registry = Arc::new(ScriptRegistry::new());
        for entry in &self.scripts {
            registry
                .register(entry.to_definition())
                .map_err(|e| ConfigError::InvalidScript(e.to_string()))?;
        }
        info!(
            scripts = self.scripts.len(),
            routes = self.routes.len(),
            "harness configuration loaded"
        );
        let pipeline = Pipeline::new(registry.clone(), self.routes.clone(), sink);
        Ok((registry, pipeline))
    }
}
