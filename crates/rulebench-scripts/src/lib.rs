//! Script registry and sandboxed execution engine.
//!
//! Scripts are small JavaScript function bodies of three kinds:
//!
//! - **Filter**: decides whether a message continues down the pipeline,
//!   must return a boolean.
//! - **Transform**: rewrites a message, must return
//!   `{ msg, metadata, msgType }`.
//! - **Decoder**: turns a raw byte payload into a flat telemetry mapping.
//!
//! Execution is sandboxed: each script runs in a fresh isolate exposing only
//! `msg`, `metadata`, `msgType` and a fixed allow-list of pure helpers, under
//! the definition's declared timeout. Failures never surface as engine
//! errors; they are reported as [`ExecutionResult::Failure`] variants.

pub mod definition;
pub mod engine;
pub mod registry;
pub mod result;
pub mod sandbox;

pub use definition::{ScriptDefinition, ScriptKind, DEFAULT_SCRIPT_TIMEOUT};
pub use engine::ScriptEngine;
pub use registry::{RegistryError, ScriptRegistry};
pub use result::{ExecutionResult, FailureKind};
