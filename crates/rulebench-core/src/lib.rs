//! Core types for RuleBench.
//!
//! This crate defines the foundational abstractions shared across the
//! harness: the telemetry message model, run identifiers, and the common
//! error type.

pub mod error;
pub mod message;

pub use error::{Error, Result};
pub use message::{Message, Metadata, Payload, RunId};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::message::{Message, Metadata, Payload, RunId};
}
