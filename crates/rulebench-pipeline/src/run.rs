//! Per-run telemetry.
//!
//! A [`PipelineRun`] is ephemeral: created per incoming message, returned to
//! the caller, never persisted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rulebench_core::{Message, RunId};
use rulebench_scripts::ExecutionResult;
use serde::{Deserialize, Serialize};

/// Which pipeline phase a stage outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Decode,
    Filter,
    Transform,
    Enrich,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Decode => "decode",
            Self::Filter => "filter",
            Self::Transform => "transform",
            Self::Enrich => "enrich",
        };
        write!(f, "{}", s)
    }
}

/// One script execution step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Identifier of the script that ran (or failed to resolve).
    pub script_id: String,
    /// Pipeline phase.
    pub stage: StageKind,
    /// What the execution produced.
    pub result: ExecutionResult,
    /// Wall time spent in this stage.
    pub elapsed: Duration,
}

/// Final disposition of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// All stages succeeded and the message was handed to the sink.
    Delivered,
    /// A filter rejected the message. Not an error.
    Dropped,
    /// A stage failed, a referenced script was missing, or the pipeline
    /// shut down mid-run.
    Errored,
}

/// Record of one message's trip through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub route_id: String,
    pub msg_type: String,
    pub received_at: DateTime<Utc>,
    /// Stage outcomes in execution order, including the failing stage of an
    /// errored run. Prior successful outputs are preserved for diagnostics
    /// but never applied downstream of a failure.
    pub stages: Vec<StageOutcome>,
    /// Terminal state. Initialized to `Errored`; every terminal transition
    /// overwrites it.
    pub disposition: Disposition,
    /// Final message, present only when the run was delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Message>,
    /// Sink error from the single delivery attempt, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
    /// Set when the run was cut short between stages (shutdown).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl PipelineRun {
    pub fn new(route_id: impl Into<String>, msg_type: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            route_id: route_id.into(),
            msg_type: msg_type.into(),
            received_at: Utc::now(),
            stages: Vec::new(),
            disposition: Disposition::Errored,
            output: None,
            delivery_error: None,
            abort_reason: None,
        }
    }

    pub fn record(&mut self, outcome: StageOutcome) {
        self.stages.push(outcome);
    }

    /// Outcome of the stage that ran the given script, if it ran.
    pub fn stage(&self, script_id: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.script_id == script_id)
    }

    /// Total wall time across recorded stages.
    pub fn elapsed_total(&self) -> Duration {
        self.stages.iter().map(|s| s.elapsed).sum()
    }

    pub fn is_delivered(&self) -> bool {
        self.disposition == Disposition::Delivered
    }
}
