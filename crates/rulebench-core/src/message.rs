//! Telemetry message model.
//!
//! A [`Message`] is the unit of work flowing through the pipeline: an opaque
//! key-value payload, string metadata, and a message-type tag. Each pipeline
//! stage receives its own clone, so a failed stage can never corrupt what an
//! earlier stage (or the run telemetry) already observed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message payload: dynamically-typed fields keyed by name.
pub type Payload = serde_json::Map<String, Value>;

/// Message metadata: string-to-string only.
pub type Metadata = HashMap<String, String>;

/// Unique identifier for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A telemetry message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Key-value payload.
    pub payload: Payload,
    /// String metadata accompanying the payload.
    #[serde(default)]
    pub metadata: Metadata,
    /// Message-type tag, e.g. `POST_TELEMETRY_REQUEST`.
    #[serde(default)]
    pub msg_type: String,
}

impl Message {
    /// Create an empty message of the given type.
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            payload: Payload::new(),
            metadata: Metadata::new(),
            msg_type: msg_type.into(),
        }
    }

    /// Create a message from its parts.
    pub fn from_parts(payload: Payload, metadata: Metadata, msg_type: impl Into<String>) -> Self {
        Self {
            payload,
            metadata,
            msg_type: msg_type.into(),
        }
    }

    /// Set a payload field (builder style).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Set a metadata entry (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get a payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Get a payload field as a number.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }
}
