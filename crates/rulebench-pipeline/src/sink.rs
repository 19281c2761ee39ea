//! Delivery sinks.
//!
//! The downstream boundary: on `Delivered`, the pipeline hands the final
//! message to an injected sink exactly once per run. Retry policy belongs to
//! the sink, not the pipeline.

use std::sync::Mutex;

use async_trait::async_trait;
use rulebench_core::Message;
use thiserror::Error;

/// The single delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Downstream consumer of delivered messages (telemetry store, message bus).
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Sink that discards everything. Useful when only run telemetry matters.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl DeliverySink for NullSink {
    async fn deliver(&self, _message: &Message) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// In-memory sink collecting delivered messages, for tests and replay.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<Message>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far.
    pub fn delivered(&self) -> Vec<Message> {
        self.delivered.lock().expect("sink lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.delivered.lock().expect("sink lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeliverySink for MemorySink {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        self.delivered
            .lock()
            .expect("sink lock poisoned")
            .push(message.clone());
        Ok(())
    }
}
