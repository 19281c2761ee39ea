//! Script definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time budget for a single script execution.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_millis(500);

/// What a script is allowed to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// Decides whether a message continues; must return a boolean.
    Filter,
    /// Rewrites a message; must return `{ msg, metadata, msgType }`.
    Transform,
    /// Decodes a raw byte payload into a flat telemetry mapping.
    Decoder,
}

impl ScriptKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Filter => "filter",
            Self::Transform => "transform",
            Self::Decoder => "decoder",
        }
    }
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named script. Immutable once registered; executions capture the
/// definition by value, so unregistration never aborts an in-flight run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDefinition {
    /// Unique identifier.
    pub id: String,
    /// Script kind; constrains the legal execution results.
    pub kind: ScriptKind,
    /// JavaScript function body. Receives `msg`, `metadata`, `msgType`.
    pub source: String,
    /// Per-execution time budget.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_SCRIPT_TIMEOUT
}

impl ScriptDefinition {
    /// Create a definition with the default timeout.
    pub fn new(id: impl Into<String>, kind: ScriptKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Shorthand for a filter script.
    pub fn filter(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(id, ScriptKind::Filter, source)
    }

    /// Shorthand for a transform script.
    pub fn transform(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(id, ScriptKind::Transform, source)
    }

    /// Shorthand for a decoder script.
    pub fn decoder(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(id, ScriptKind::Decoder, source)
    }

    /// Override the execution timeout (builder style).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
