//! End-to-end pipeline runs: filter/transform chains, decoding, failure
//! dispositions, delivery.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rulebench_core::{Message, Metadata, Payload};
use rulebench_pipeline::{
    DeliveryError, DeliverySink, Disposition, IngressPayload, MemorySink, Pipeline, PipelineError,
    Route,
};
use rulebench_scripts::{ExecutionResult, FailureKind, ScriptDefinition, ScriptRegistry};
use serde_json::{json, Value};

const ENSURE_TS: &str = "if (msg.ts === undefined) { msg.ts = datetime.now(); } \
     return { msg: msg, metadata: metadata, msgType: msgType };";

const COMPUTE_POWER: &str = "msg.power = msg.voltage * msg.current; \
     return { msg: msg, metadata: metadata, msgType: msgType };";

const TEMP_RANGE: &str = "return msg.temperature > 25 && msg.temperature < 100;";

const TEMP_HUMIDITY_DECODER: &str = "\
    if (msg.length !== 4) { throw new Error('payload must be exactly 4 bytes'); } \
    var raw = (msg[0] << 8) | msg[1]; \
    if (raw & 0x8000) { raw -= 0x10000; } \
    return { temperature: raw / 100, humidity: ((msg[2] << 8) | msg[3]) / 100 };";

fn fields(pairs: &[(&str, Value)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn telemetry_pipeline(sink: Arc<dyn DeliverySink>) -> Pipeline {
    let registry = Arc::new(ScriptRegistry::new());
    registry
        .register(ScriptDefinition::decoder("decode-th", TEMP_HUMIDITY_DECODER))
        .unwrap();
    registry
        .register(ScriptDefinition::filter("temp-range", TEMP_RANGE))
        .unwrap();
    registry
        .register(ScriptDefinition::transform("ensure-ts", ENSURE_TS))
        .unwrap();
    registry
        .register(ScriptDefinition::transform("compute-power", COMPUTE_POWER))
        .unwrap();
    registry
        .register(ScriptDefinition::filter(
            "always-accept",
            "return true;",
        ))
        .unwrap();
    registry
        .register(ScriptDefinition::filter("boom", "throw new Error('filter bug');"))
        .unwrap();
    registry
        .register(ScriptDefinition::transform(
            "transform-boom",
            "throw new Error('transform bug');",
        ))
        .unwrap();

    let mut routes = HashMap::new();
    routes.insert(
        "power".to_string(),
        Route::new()
            .with_filter("always-accept")
            .with_transform("ensure-ts")
            .with_enricher("compute-power"),
    );
    routes.insert(
        "temperature".to_string(),
        Route::new()
            .with_decoder("decode-th")
            .with_filter("temp-range"),
    );
    routes.insert(
        "broken-filter".to_string(),
        Route::new().with_filter("boom").with_transform("ensure-ts"),
    );
    routes.insert(
        "broken-transform".to_string(),
        Route::new()
            .with_transform("ensure-ts")
            .with_transform("transform-boom"),
    );
    routes.insert(
        "ghost-route".to_string(),
        Route::new().with_filter("no-such-script"),
    );
    routes.insert("passthrough".to_string(), Route::new());

    Pipeline::new(registry, routes, sink)
}

#[tokio::test]
async fn transform_chain_delivers_with_ts_and_power() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = telemetry_pipeline(sink.clone());

    let before = Utc::now().timestamp_millis() as f64;
    let run = pipeline
        .submit(
            "POST_TELEMETRY_REQUEST",
            IngressPayload::Fields(fields(&[("voltage", json!(12)), ("current", json!(2.5))])),
            Metadata::new(),
            "power",
        )
        .await
        .unwrap();
    let after = Utc::now().timestamp_millis() as f64;

    assert_eq!(run.disposition, Disposition::Delivered);
    let output = run.output.as_ref().unwrap();
    assert_eq!(output.number("power"), Some(30.0));

    let ts = output.number("ts").unwrap();
    assert!(ts >= before && ts <= after, "ts={} not in [{}, {}]", ts, before, after);

    assert_eq!(sink.len(), 1);
    assert_eq!(sink.delivered()[0].number("power"), Some(30.0));

    // Stage telemetry: filter, transform, enricher, each with an outcome.
    assert!(run.is_delivered());
    assert_eq!(run.stages.len(), 3);
    assert!(run.stage("always-accept").is_some());
    assert!(run.stage("compute-power").is_some());
    assert!(run.elapsed_total() >= run.stages[0].elapsed);
}

#[tokio::test]
async fn decoder_route_delivers_decoded_telemetry() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = telemetry_pipeline(sink.clone());

    let run = pipeline
        .submit(
            "POST_TELEMETRY_REQUEST",
            IngressPayload::Bytes(vec![0x09, 0xF6, 0x17, 0x70]),
            Metadata::new(),
            "temperature",
        )
        .await
        .unwrap();

    assert_eq!(run.disposition, Disposition::Delivered);
    let output = run.output.as_ref().unwrap();
    assert_eq!(output.number("temperature"), Some(25.5));
    assert_eq!(output.number("humidity"), Some(60.0));
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn decoder_boundary_rejection_drops_message() {
    // 25.00 degrees decodes to exactly the strict lower bound: excluded.
    let sink = Arc::new(MemorySink::new());
    let pipeline = telemetry_pipeline(sink.clone());

    let run = pipeline
        .submit(
            "POST_TELEMETRY_REQUEST",
            IngressPayload::Bytes(vec![0x09, 0xC4, 0x17, 0x70]),
            Metadata::new(),
            "temperature",
        )
        .await
        .unwrap();

    assert_eq!(run.disposition, Disposition::Dropped);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn short_payload_errors_the_run() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = telemetry_pipeline(sink.clone());

    let run = pipeline
        .submit(
            "POST_TELEMETRY_REQUEST",
            IngressPayload::Bytes(vec![0x09, 0xF6]),
            Metadata::new(),
            "temperature",
        )
        .await
        .unwrap();

    assert_eq!(run.disposition, Disposition::Errored);
    let outcome = run.stage("decode-th").unwrap();
    assert_eq!(outcome.result.failure_kind(), Some(FailureKind::RuntimeError));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn filter_failure_is_errored_not_dropped() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = telemetry_pipeline(sink.clone());

    let run = pipeline
        .submit(
            "POST_TELEMETRY_REQUEST",
            IngressPayload::Fields(Payload::new()),
            Metadata::new(),
            "broken-filter",
        )
        .await
        .unwrap();

    // A filter bug must surface as an infrastructure error, never as a
    // silent drop.
    assert_eq!(run.disposition, Disposition::Errored);
    assert_eq!(run.stages.len(), 1);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn transform_failure_preserves_prior_stage_outputs() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = telemetry_pipeline(sink.clone());

    let run = pipeline
        .submit(
            "POST_TELEMETRY_REQUEST",
            IngressPayload::Fields(Payload::new()),
            Metadata::new(),
            "broken-transform",
        )
        .await
        .unwrap();

    assert_eq!(run.disposition, Disposition::Errored);
    assert!(run.output.is_none());
    assert!(sink.is_empty());

    // Stage one succeeded and its output is preserved for diagnostics.
    let first = run.stage("ensure-ts").unwrap();
    match &first.result {
        ExecutionResult::Transformed { message } => assert!(message.field("ts").is_some()),
        other => panic!("expected transformed outcome, got {:?}", other),
    }
    let second = run.stage("transform-boom").unwrap();
    assert_eq!(second.result.failure_kind(), Some(FailureKind::RuntimeError));
}

#[tokio::test]
async fn unknown_route_is_rejected_synchronously() {
    let pipeline = telemetry_pipeline(Arc::new(MemorySink::new()));

    let err = pipeline
        .submit("t", IngressPayload::Fields(Payload::new()), Metadata::new(), "nowhere")
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::RouteNotFound("nowhere".to_string()));
}

#[tokio::test]
async fn bytes_without_decoder_is_rejected_synchronously() {
    let pipeline = telemetry_pipeline(Arc::new(MemorySink::new()));

    let err = pipeline
        .submit("t", IngressPayload::Bytes(vec![1, 2]), Metadata::new(), "power")
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::MissingDecoder("power".to_string()));
}

#[tokio::test]
async fn unregistered_script_errors_the_run() {
    let pipeline = telemetry_pipeline(Arc::new(MemorySink::new()));

    let run = pipeline
        .submit("t", IngressPayload::Fields(Payload::new()), Metadata::new(), "ghost-route")
        .await
        .unwrap();

    assert_eq!(run.disposition, Disposition::Errored);
    let outcome = run.stage("no-such-script").unwrap();
    assert_eq!(outcome.result.failure_kind(), Some(FailureKind::RuntimeError));
}

#[tokio::test]
async fn empty_route_delivers_passthrough() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = telemetry_pipeline(sink.clone());

    let run = pipeline
        .submit(
            "t",
            IngressPayload::Fields(fields(&[("v", json!(1))])),
            Metadata::new(),
            "passthrough",
        )
        .await
        .unwrap();

    assert_eq!(run.disposition, Disposition::Delivered);
    assert!(run.stages.is_empty());
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn shutdown_aborts_between_stages() {
    let pipeline = telemetry_pipeline(Arc::new(MemorySink::new()));
    pipeline.shutdown();

    let run = pipeline
        .submit(
            "t",
            IngressPayload::Fields(fields(&[("voltage", json!(12)), ("current", json!(2.5))])),
            Metadata::new(),
            "power",
        )
        .await
        .unwrap();

    assert_eq!(run.disposition, Disposition::Errored);
    assert_eq!(run.abort_reason.as_deref(), Some("pipeline shut down"));
    assert!(run.stages.is_empty());
}

struct FailingSink;

#[async_trait]
impl DeliverySink for FailingSink {
    async fn deliver(&self, _message: &Message) -> Result<(), DeliveryError> {
        Err(DeliveryError("telemetry store unreachable".to_string()))
    }
}

#[tokio::test]
async fn delivery_error_is_recorded_once() {
    let pipeline = telemetry_pipeline(Arc::new(FailingSink));

    let run = pipeline
        .submit(
            "t",
            IngressPayload::Fields(fields(&[("v", json!(1))])),
            Metadata::new(),
            "passthrough",
        )
        .await
        .unwrap();

    // The run still reached delivery; retrying is the sink's business.
    assert_eq!(run.disposition, Disposition::Delivered);
    assert!(run
        .delivery_error
        .as_deref()
        .unwrap()
        .contains("telemetry store unreachable"));
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = Arc::new(telemetry_pipeline(sink.clone()));

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline
                .submit(
                    "t",
                    IngressPayload::Fields(fields(&[
                        ("voltage", json!(i)),
                        ("current", json!(2)),
                    ])),
                    Metadata::new(),
                    "power",
                )
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let run = handle.await.unwrap();
        assert_eq!(run.disposition, Disposition::Delivered);
    }
    assert_eq!(sink.len(), 8);
}
