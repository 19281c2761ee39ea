//! The message pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rulebench_core::{Message, Metadata, Payload};
use rulebench_scripts::{
    ExecutionResult, FailureKind, ScriptDefinition, ScriptEngine, ScriptRegistry,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::route::Route;
use crate::run::{Disposition, PipelineRun, StageKind, StageOutcome};
use crate::sink::DeliverySink;

/// Precondition errors surfaced synchronously by `submit`, before any stage
/// runs. Everything that happens after the run starts is reported inside the
/// returned [`PipelineRun`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Route {0} received a byte payload but declares no decoder")]
    MissingDecoder(String),
}

/// Raw inbound payload: bytes to be decoded, or ready key-value fields.
#[derive(Debug, Clone)]
pub enum IngressPayload {
    Bytes(Vec<u8>),
    Fields(Payload),
}

/// Message pipeline: one independent run per submitted message, stages
/// strictly sequential within a run, runs free to execute concurrently.
pub struct Pipeline {
    registry: Arc<ScriptRegistry>,
    engine: ScriptEngine,
    routes: HashMap<String, Route>,
    sink: Arc<dyn DeliverySink>,
    shutdown: AtomicBool,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ScriptRegistry>,
        routes: HashMap<String, Route>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            registry,
            engine: ScriptEngine::new(),
            routes,
            sink,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    /// Stop accepting new stages. In-flight runs end `Errored` at the next
    /// stage boundary; a mid-script stage runs to its timeout or completion
    /// and its result is discarded.
    pub fn shutdown(&self) {
        info!("pipeline shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run one message through the route's stages.
    pub async fn submit(
        &self,
        msg_type: &str,
        payload: IngressPayload,
        metadata: Metadata,
        route_id: &str,
    ) -> Result<PipelineRun, PipelineError> {
        let route = self
            .routes
            .get(route_id)
            .ok_or_else(|| PipelineError::RouteNotFound(route_id.to_string()))?;

        if matches!(payload, IngressPayload::Bytes(_)) && route.decoder.is_none() {
            return Err(PipelineError::MissingDecoder(route_id.to_string()));
        }

        let mut run = PipelineRun::new(route_id, msg_type);
        debug!(run_id = %run.run_id, route_id, msg_type, "run received");

        // Capture every referenced definition by value before the first
        // stage: unregistration mid-run never aborts this run.
        let Some(resolved) = self.resolve_route(route, &mut run) else {
            return Ok(run);
        };

        // Decoding.
        let mut message = match payload {
            IngressPayload::Bytes(bytes) => {
                // Checked above together with the decoder id.
                let Some(def) = resolved.decoder.as_ref() else {
                    return Err(PipelineError::MissingDecoder(route_id.to_string()));
                };
                let started = Instant::now();
                let result = self
                    .engine
                    .execute_decoder(def, &bytes, &metadata, msg_type)
                    .await;
                let elapsed = started.elapsed();

                let telemetry = match &result {
                    ExecutionResult::DecodedTelemetry { telemetry } => Some(telemetry.clone()),
                    _ => None,
                };
                let failed = result.is_failure();
                run.record(StageOutcome {
                    script_id: def.id.clone(),
                    stage: StageKind::Decode,
                    result,
                    elapsed,
                });
                match telemetry {
                    Some(telemetry) if !failed => {
                        Message::from_parts(telemetry, metadata.clone(), msg_type)
                    }
                    _ => return Ok(self.errored(run)),
                }
            }
            IngressPayload::Fields(fields) => Message::from_parts(fields, metadata, msg_type),
        };

        // Filtering: first `false` drops; failures are infrastructure
        // errors, never rejections.
        for def in &resolved.filters {
            if self.aborted(&mut run) {
                return Ok(run);
            }
            let started = Instant::now();
            let result = self.engine.execute(def, &message).await;
            let elapsed = started.elapsed();

            let verdict = result.accepted();
            let failed = result.is_failure();
            run.record(StageOutcome {
                script_id: def.id.clone(),
                stage: StageKind::Filter,
                result,
                elapsed,
            });

            if failed || verdict.is_none() {
                return Ok(self.errored(run));
            }
            if verdict == Some(false) {
                debug!(run_id = %run.run_id, script_id = %def.id, "message dropped by filter");
                run.disposition = Disposition::Dropped;
                return Ok(run);
            }
        }

        // Transforming, then enriching: chain each stage's output into the
        // next stage's input.
        let chained = resolved
            .transforms
            .iter()
            .map(|def| (StageKind::Transform, def))
            .chain(resolved.enrichers.iter().map(|def| (StageKind::Enrich, def)));
        for (stage, def) in chained {
            if self.aborted(&mut run) {
                return Ok(run);
            }
            let started = Instant::now();
            let result = self.engine.execute(def, &message).await;
            let elapsed = started.elapsed();

            let next = match &result {
                ExecutionResult::Transformed { message } => Some(message.clone()),
                _ => None,
            };
            run.record(StageOutcome {
                script_id: def.id.clone(),
                stage,
                result,
                elapsed,
            });

            match next {
                Some(next_message) => message = next_message,
                None => return Ok(self.errored(run)),
            }
        }

        // Delivered: exactly one sink attempt per run.
        run.disposition = Disposition::Delivered;
        run.output = Some(message.clone());
        if let Err(e) = self.sink.deliver(&message).await {
            warn!(run_id = %run.run_id, error = %e, "delivery attempt failed");
            run.delivery_error = Some(e.to_string());
        }
        debug!(run_id = %run.run_id, stages = run.stages.len(), "run delivered");
        Ok(run)
    }

    /// Resolve all route script ids against the registry. A missing script
    /// is an infrastructure error recorded as a synthetic failed stage.
    fn resolve_route(&self, route: &Route, run: &mut PipelineRun) -> Option<ResolvedRoute> {
        let mut resolve = |id: &String, stage: StageKind| match self.registry.lookup(id) {
            Some(def) => Some(def),
            None => {
                warn!(run_id = %run.run_id, script_id = %id, "route references unregistered script");
                run.record(StageOutcome {
                    script_id: id.clone(),
                    stage,
                    result: ExecutionResult::failure(
                        FailureKind::RuntimeError,
                        format!("script `{}` is not registered", id),
                    ),
                    elapsed: std::time::Duration::ZERO,
                });
                run.disposition = Disposition::Errored;
                None
            }
        };

        let decoder = match &route.decoder {
            Some(id) => Some(resolve(id, StageKind::Decode)?),
            None => None,
        };
        let mut filters = Vec::with_capacity(route.filters.len());
        for id in &route.filters {
            filters.push(resolve(id, StageKind::Filter)?);
        }
        let mut transforms = Vec::with_capacity(route.transforms.len());
        for id in &route.transforms {
            transforms.push(resolve(id, StageKind::Transform)?);
        }
        let mut enrichers = Vec::with_capacity(route.enrichers.len());
        for id in &route.enrichers {
            enrichers.push(resolve(id, StageKind::Enrich)?);
        }

        Some(ResolvedRoute {
            decoder,
            filters,
            transforms,
            enrichers,
        })
    }

    fn errored(&self, mut run: PipelineRun) -> PipelineRun {
        run.disposition = Disposition::Errored;
        run
    }

    /// Between-stage cancellation point.
    fn aborted(&self, run: &mut PipelineRun) -> bool {
        if self.is_shut_down() {
            run.disposition = Disposition::Errored;
            run.abort_reason = Some("pipeline shut down".to_string());
            true
        } else {
            false
        }
    }
}

/// Route definitions captured by value at run start.
struct ResolvedRoute {
    decoder: Option<ScriptDefinition>,
    filters: Vec<ScriptDefinition>,
    transforms: Vec<ScriptDefinition>,
    enrichers: Vec<ScriptDefinition>,
}
