//! Script execution engine.
//!
//! Runs a script definition against a message under the definition's time
//! budget, then validates the output shape against the script's kind. The
//! engine call itself never fails; every failure mode is reported as an
//! [`ExecutionResult::Failure`].

use rulebench_core::{Message, Metadata};
use serde_json::Value;
use tracing::{debug, warn};

use crate::definition::{ScriptDefinition, ScriptKind};
use crate::result::{ExecutionResult, FailureKind};
use crate::sandbox::{self, Fault, ScriptOutput};

/// Sandboxed script executor. Stateless; each execution gets a fresh,
/// disposable isolate on its own blocking worker.
#[derive(Debug, Default, Clone)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        Self
    }

    /// Execute a filter or transform script against a message.
    pub async fn execute(&self, def: &ScriptDefinition, message: &Message) -> ExecutionResult {
        self.run(
            def,
            Value::Object(message.payload.clone()),
            message.metadata.clone(),
            message.msg_type.clone(),
        )
        .await
    }

    /// Execute a decoder script. The raw payload is bound as `msg`, a byte
    /// array, instead of a key-value message.
    pub async fn execute_decoder(
        &self,
        def: &ScriptDefinition,
        payload: &[u8],
        metadata: &Metadata,
        msg_type: &str,
    ) -> ExecutionResult {
        let bytes = payload.iter().map(|b| Value::from(*b)).collect::<Vec<_>>();
        self.run(def, Value::Array(bytes), metadata.clone(), msg_type.to_string())
            .await
    }

    /// Static validation: non-empty source that passes the deny scan.
    /// Used at configuration load, before any message flows.
    pub fn validate(&self, def: &ScriptDefinition) -> Result<(), String> {
        if def.source.trim().is_empty() {
            return Err(format!("{}: source is empty", def.id));
        }
        sandbox::deny_scan(&def.source).map_err(|detail| format!("{}: {}", def.id, detail))
    }

    async fn run(
        &self,
        def: &ScriptDefinition,
        msg: Value,
        metadata: Metadata,
        msg_type: String,
    ) -> ExecutionResult {
        if let Err(detail) = sandbox::deny_scan(&def.source) {
            warn!(script_id = %def.id, %detail, "sandbox violation");
            return ExecutionResult::failure(FailureKind::SandboxViolation, detail);
        }

        // Fresh worker per execution. On timeout the handle is dropped and
        // the worker abandoned with its isolate; it is never reused, so a
        // runaway script cannot observe state of later executions.
        let source = def.source.clone();
        let worker =
            tokio::task::spawn_blocking(move || sandbox::evaluate(&source, msg, &metadata, &msg_type));

        let outcome = match tokio::time::timeout(def.timeout, worker).await {
            Err(_elapsed) => {
                warn!(script_id = %def.id, timeout_ms = def.timeout.as_millis() as u64, "script timed out");
                return ExecutionResult::failure(
                    FailureKind::Timeout,
                    format!("script exceeded its {}ms budget", def.timeout.as_millis()),
                );
            }
            Ok(Err(join_err)) => {
                return ExecutionResult::failure(
                    FailureKind::RuntimeError,
                    format!("script worker panicked: {}", join_err),
                );
            }
            Ok(Ok(result)) => result,
        };

        match outcome {
            Err(Fault::Violation(detail)) => {
                warn!(script_id = %def.id, %detail, "sandbox violation");
                ExecutionResult::failure(FailureKind::SandboxViolation, detail)
            }
            Err(Fault::Runtime(detail)) => {
                debug!(script_id = %def.id, %detail, "script runtime error");
                ExecutionResult::failure(FailureKind::RuntimeError, detail)
            }
            Ok(output) => validate_output(def.kind, output),
        }
    }
}

/// Check the script output against what its declared kind may legally
/// produce.
fn validate_output(kind: ScriptKind, output: ScriptOutput) -> ExecutionResult {
    match kind {
        ScriptKind::Filter => match output.value {
            Value::Bool(accept) if output.js_type == "boolean" => {
                ExecutionResult::FilterDecision { accept }
            }
            _ => ExecutionResult::failure(
                FailureKind::ContractViolation,
                format!("filter must return a boolean, got {}", output.js_type),
            ),
        },
        ScriptKind::Transform => validate_transform(output),
        ScriptKind::Decoder => validate_decoder(output),
    }
}

/// A transform must return `{ msg, metadata, msgType }`, each field
/// well-formed on its own.
fn validate_transform(output: ScriptOutput) -> ExecutionResult {
    let contract = |detail: String| ExecutionResult::failure(FailureKind::ContractViolation, detail);

    let Value::Object(fields) = output.value else {
        return contract(format!(
            "transform must return an object, got {}",
            output.js_type
        ));
    };

    let payload = match fields.get("msg") {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return contract(format!(
                "transform `msg` must be an object, got {}",
                type_name(other)
            ))
        }
        None => return contract("transform dropped required field `msg`".to_string()),
    };

    let metadata = match fields.get("metadata") {
        Some(Value::Object(map)) => {
            let mut metadata = Metadata::new();
            for (key, value) in map {
                match value {
                    Value::String(s) => {
                        metadata.insert(key.clone(), s.clone());
                    }
                    other => {
                        return contract(format!(
                            "transform metadata `{}` must be a string, got {}",
                            key,
                            type_name(other)
                        ))
                    }
                }
            }
            metadata
        }
        Some(other) => {
            return contract(format!(
                "transform `metadata` must be an object, got {}",
                type_name(other)
            ))
        }
        None => return contract("transform dropped required field `metadata`".to_string()),
    };

    let msg_type = match fields.get("msgType") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return contract(format!(
                "transform `msgType` must be a string, got {}",
                type_name(other)
            ))
        }
        None => return contract("transform dropped required field `msgType`".to_string()),
    };

    ExecutionResult::Transformed {
        message: Message::from_parts(payload, metadata, msg_type),
    }
}

/// A decoder must return a flat telemetry mapping: scalar values only.
fn validate_decoder(output: ScriptOutput) -> ExecutionResult {
    let Value::Object(map) = output.value else {
        return ExecutionResult::failure(
            FailureKind::ContractViolation,
            format!("decoder must return a telemetry object, got {}", output.js_type),
        );
    };

    for (key, value) in &map {
        if value.is_object() || value.is_array() {
            return ExecutionResult::failure(
                FailureKind::ContractViolation,
                format!("decoder telemetry must be flat, `{}` is a {}", key, type_name(value)),
            );
        }
    }

    ExecutionResult::DecodedTelemetry { telemetry: map }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
