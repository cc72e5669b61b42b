// crates/flagdeck-ingest/tests/ingest_api.rs
// ============================================================================
// Module: Ingest API Integration Tests
// Description: End-to-end tests against a live ingest server.
// Purpose: Validate admission bounds, S4 validation, flushes, shutdown.
// ============================================================================

//! ## Overview
//! Boots the ingest service on an ephemeral port with a memory columnar
//! store and exercises the admission surface: batch caps, the S4 mixed
//! validation scenario, threshold- and timer-driven flushes, the mixed
//! batch endpoint, and the stopping gate.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use flagdeck_core::AllowAll;
use flagdeck_core::TokenVerifier;
use flagdeck_ingest::EventBuffers;
use flagdeck_ingest::IngestState;
use flagdeck_ingest::MemoryColumnarStore;
use flagdeck_ingest::drain;
use flagdeck_ingest::router;
use flagdeck_ingest::spawn_flusher;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

// ============================================================================
// SECTION: Harness
// ============================================================================

struct TestServer {
    base: String,
    client: reqwest::Client,
    state: Arc<IngestState>,
    store: Arc<MemoryColumnarStore>,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    /// Starts a server with a small flush threshold and fast flusher.
    async fn start(flush_threshold: usize, flush_interval: Duration) -> Self {
        let store = Arc::new(MemoryColumnarStore::new());
        let state = Arc::new(IngestState::new(
            EventBuffers::new(1000, flush_threshold),
            Arc::clone(&store) as _,
            None,
            Arc::new(AllowAll) as Arc<dyn TokenVerifier>,
            Duration::from_secs(30),
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);
        spawn_flusher(Arc::clone(&state), flush_interval, shutdown_rx.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::clone(&state));
        let mut server_shutdown = shutdown_rx;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.wait_for(|stopped| *stopped).await;
                })
                .await;
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            state,
            store,
            shutdown,
        }
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base))
            .bearer_auth("ingest-key")
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn wait_for_store(&self, expected: usize) {
        for _ in 0 .. 200 {
            if self.store.exposures().len() + self.store.metrics().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("store never reached {expected} events");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn exposure_json(env: &str) -> Value {
    json!({
        "env_key": env,
        "flag_key": "ff.banner",
        "variation_key": "on",
        "user_key_hash": "ab".repeat(32),
        "bucketing_id": "cd".repeat(32),
        "reason": "rollout"
    })
}

fn metric_json(value: f64) -> Value {
    json!({
        "env_key": "prod",
        "metric_key": "checkout.latency",
        "user_key_hash": "ab".repeat(32),
        "value": value
    })
}

// ============================================================================
// SECTION: Admission Bounds
// ============================================================================

#[tokio::test]
async fn empty_batch_is_invalid() {
    let server = TestServer::start(500, Duration::from_secs(60)).await;
    let response = server.post("/v1/events/exposure", json!({"events": []})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], json!("invalid_request"));
}

#[tokio::test]
async fn batch_of_exactly_1000_is_accepted_and_1001_rejected() {
    let server = TestServer::start(2000, Duration::from_secs(60)).await;

    let events: Vec<Value> = (0 .. 1000).map(|_| exposure_json("prod")).collect();
    let response = server.post("/v1/events/exposure", json!({"events": events})).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["accepted_count"], json!(1000));

    let events: Vec<Value> = (0 .. 1001).map(|_| exposure_json("prod")).collect();
    let response = server.post("/v1/events/exposure", json!({"events": events})).await;
    assert_eq!(response.status(), 413);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], json!("batch_too_large"));
}

#[tokio::test]
async fn missing_credential_is_unauthenticated() {
    let server = TestServer::start(500, Duration::from_secs(60)).await;
    let response = server
        .client
        .post(format!("{}/v1/events/exposure", server.base))
        .json(&json!({"events": [exposure_json("prod")]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

// ============================================================================
// SECTION: Validation (S4)
// ============================================================================

#[tokio::test]
async fn mixed_validity_batch_reports_counts_and_fields() {
    let server = TestServer::start(500, Duration::from_millis(100)).await;

    let mut future = exposure_json("prod");
    future["timestamp"] = json!("2099-01-01T00:00:00Z");
    let batch = json!({"events": [exposure_json(""), exposure_json("prod"), future]});

    let response = server.post("/v1/events/exposure", batch).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["accepted_count"], json!(1));
    assert_eq!(body["rejected_count"], json!(2));
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors[0]["field"], json!("events[0].env_key"));
    assert_eq!(errors[1]["field"], json!("events[2].timestamp"));

    // The valid event reaches the store via the periodic flusher.
    server.wait_for_store(1).await;
    let stored = server.store.exposures();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].event_id.is_some(), "ingest must assign event ids");
    assert!(stored[0].timestamp.is_some(), "ingest must stamp timestamps");
}

// ============================================================================
// SECTION: Flush Triggers
// ============================================================================

#[tokio::test]
async fn crossing_the_threshold_triggers_an_early_flush() {
    let server = TestServer::start(5, Duration::from_secs(3600)).await;
    let events: Vec<Value> = (0 .. 6).map(|_| exposure_json("prod")).collect();
    server.post("/v1/events/exposure", json!({"events": events})).await;
    // The periodic flusher is effectively disabled; only the threshold
    // flush can move events to the store.
    server.wait_for_store(6).await;
}

#[tokio::test]
async fn metrics_flow_through_their_own_buffer() {
    let server = TestServer::start(500, Duration::from_millis(100)).await;
    let response = server
        .post("/v1/events/metrics", json!({"events": [metric_json(12.5), metric_json(2e15)]}))
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["accepted_count"], json!(1));
    assert_eq!(body["rejected_count"], json!(1));

    server.wait_for_store(1).await;
    assert_eq!(server.store.metrics().len(), 1);
    assert!(server.store.exposures().is_empty());
}

// ============================================================================
// SECTION: Mixed Batch Endpoint
// ============================================================================

#[tokio::test]
async fn mixed_batch_combines_counts_and_prefixes_fields() {
    let server = TestServer::start(500, Duration::from_millis(100)).await;
    let response = server
        .post(
            "/v1/events/batch",
            json!({
                "batch_id": "batch-42",
                "batch_type": "mixed",
                "exposure_events": [exposure_json("prod"), exposure_json("")],
                "metric_events": [metric_json(1.0), metric_json(f64::MAX)]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["batch_id"], json!("batch-42"));
    assert_eq!(body["accepted_count"], json!(2));
    assert_eq!(body["rejected_count"], json!(2));
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors[0]["field"], json!("exposure_events[1].env_key"));
    assert_eq!(errors[1]["field"], json!("metric_events[1].value"));
}

// ============================================================================
// SECTION: Shutdown
// ============================================================================

#[tokio::test]
async fn stopping_rejects_new_events_and_drains_buffers() {
    let server = TestServer::start(500, Duration::from_secs(3600)).await;
    server.post("/v1/events/exposure", json!({"events": [exposure_json("prod")]})).await;
    assert!(server.store.exposures().is_empty(), "nothing flushed yet");

    drain(&server.state, Duration::from_secs(10)).await;
    assert_eq!(server.store.exposures().len(), 1, "drain must flush buffered events");

    let response =
        server.post("/v1/events/exposure", json!({"events": [exposure_json("prod")]})).await;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], json!("service_stopping"));
}

#[tokio::test]
async fn store_errors_are_counted_and_batches_dropped() {
    use async_trait::async_trait;
    use flagdeck_core::ExposureEvent;
    use flagdeck_core::MetricEvent;
    use flagdeck_ingest::ColumnarError;
    use flagdeck_ingest::ColumnarStore;
    use flagdeck_ingest::flush_exposures;

    /// Store that always fails.
    struct DownStore;

    #[async_trait]
    impl ColumnarStore for DownStore {
        async fn write_exposures(&self, _: Vec<ExposureEvent>) -> Result<(), ColumnarError> {
            Err(ColumnarError::Write("down".to_string()))
        }

        async fn write_metrics(&self, _: Vec<MetricEvent>) -> Result<(), ColumnarError> {
            Err(ColumnarError::Write("down".to_string()))
        }
    }

    let state = Arc::new(IngestState::new(
        EventBuffers::new(1000, 500),
        Arc::new(DownStore),
        None,
        Arc::new(AllowAll) as Arc<dyn TokenVerifier>,
        Duration::from_secs(1),
    ));
    let event: ExposureEvent =
        serde_json::from_value(exposure_json("prod")).unwrap();
    state.buffers.append_exposures(vec![event]);

    flush_exposures(&state).await;
    assert_eq!(state.store_error_total(), 1);
    assert_eq!(state.buffers.exposure_depth(), 0, "failed batches are dropped, not requeued");
}
