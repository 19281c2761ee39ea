//! Message pipeline.
//!
//! Orchestrates script executions over incoming messages, one independent
//! run per message:
//!
//! ```text
//! Received -> [Decoding] -> Filtering -> {Dropped | Transforming}
//!                                      -> {Errored | Enriching} -> Delivered
//! ```
//!
//! A filter returning `false` drops the message; any script failure ends the
//! run as `Errored` with the partial stage history preserved. Every stage
//! outcome is recorded with its elapsed time, so tests can replay and assert
//! on the full run.

pub mod config;
pub mod pipeline;
pub mod route;
pub mod run;
pub mod sink;

pub use config::{ConfigError, HarnessConfig, ScriptEntry};
pub use pipeline::{IngressPayload, Pipeline, PipelineError};
pub use route::Route;
pub use run::{Disposition, PipelineRun, StageKind, StageOutcome};
pub use sink::{DeliveryError, DeliverySink, MemorySink, NullSink};
