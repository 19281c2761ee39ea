//! Execution results.
//!
//! A script execution always yields a value of this type; script failures are
//! data, never engine-level errors.

use rulebench_core::{Message, Payload};
use serde::{Deserialize, Serialize};

/// Why a script execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The script tried to reach outside the capability allow-list.
    SandboxViolation,
    /// The script exceeded its declared time budget.
    Timeout,
    /// The script raised a runtime error (throw, type error, bad access).
    RuntimeError,
    /// The script's output shape does not match its declared kind.
    ContractViolation,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SandboxViolation => "sandbox violation",
            Self::Timeout => "timeout",
            Self::RuntimeError => "runtime error",
            Self::ContractViolation => "contract violation",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single script execution. Exactly one variant per execution;
/// the script's kind determines which non-failure variant is legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// A filter's verdict.
    FilterDecision { accept: bool },
    /// A transform's rewritten message (payload, metadata and type).
    Transformed { message: Message },
    /// A decoder's flat telemetry mapping.
    DecodedTelemetry { telemetry: Payload },
    /// The execution failed; the pipeline run records this and stops.
    Failure { kind: FailureKind, detail: String },
}

impl ExecutionResult {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// The failure kind, if this is a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The filter verdict, if this is a filter decision.
    pub fn accepted(&self) -> Option<bool> {
        match self {
            Self::FilterDecision { accept } => Some(*accept),
            _ => None,
        }
    }
}
