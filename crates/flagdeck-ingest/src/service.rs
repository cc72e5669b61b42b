// crates/flagdeck-ingest/src/service.rs
// ============================================================================
// Module: Ingest Service
// Description: Batch admission endpoints, flush workers, and shutdown.
// Purpose: Move validated events from the wire into the columnar store.
// Dependencies: axum, flagdeck-core, crate::{buffer, retry, store, validate}
// ============================================================================

//! ## Overview
//! Admission is bounded (1000 events per batch) and validated per event;
//! accepted events land in the in-memory buffers. Crossing the flush
//! threshold triggers an asynchronous flush, and a periodic flusher
//! drains both buffers every interval regardless. A failed store write
//! increments the error counter and drops the batch unless the optional
//! retry queue is enabled. Shutdown closes admission first
//! (`service_stopping`), drains the buffers under a bound, and stops the
//! workers through the shared shutdown channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use flagdeck_core::ApiError;
use flagdeck_core::ErrorBody;
use flagdeck_core::ExposureEvent;
use flagdeck_core::FieldError;
use flagdeck_core::MetricEvent;
use flagdeck_core::Timestamp;
use flagdeck_core::TokenVerifier;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::buffer::EventBuffers;
use crate::retry::PendingBatch;
use crate::retry::RetryQueue;
use crate::store::ColumnarStore;
use crate::validate::validate_exposures;
use crate::validate::validate_metrics;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum events admitted in one batch.
pub const MAX_BATCH_EVENTS: usize = 1000;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state behind the ingest router and its workers.
///
/// # Invariants
/// - `stopping` flips once and never resets; admission stays closed.
pub struct IngestState {
    /// Paired event buffers.
    pub buffers: EventBuffers,
    /// Columnar store sink.
    pub store: Arc<dyn ColumnarStore>,
    /// Optional bounded retry queue.
    pub retry: Option<Arc<RetryQueue>>,
    /// Credential verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Per-batch store write deadline.
    pub store_timeout: Duration,
    /// Admission gate; true once shutdown began.
    stopping: AtomicBool,
    /// Failed store writes.
    store_errors: AtomicU64,
    /// Events rejected by validation.
    rejected_total: AtomicU64,
}

impl IngestState {
    /// Creates service state over its collaborators.
    #[must_use]
    pub fn new(
        buffers: EventBuffers,
        store: Arc<dyn ColumnarStore>,
        retry: Option<Arc<RetryQueue>>,
        verifier: Arc<dyn TokenVerifier>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            buffers,
            store,
            retry,
            verifier,
            store_timeout,
            stopping: AtomicBool::new(false),
            store_errors: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
        }
    }

    /// Returns the failed store write count.
    #[must_use]
    pub fn store_error_total(&self) -> u64 {
        self.store_errors.load(Ordering::Relaxed)
    }

    /// Returns the rejected event count.
    #[must_use]
    pub fn rejected_total(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Axum-facing wrapper around the closed error set.
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Body of the exposure batch endpoint.
#[derive(Debug, Deserialize)]
pub struct ExposureBatchRequest {
    /// Events in this batch.
    pub events: Vec<ExposureEvent>,
}

/// Body of the metric batch endpoint.
#[derive(Debug, Deserialize)]
pub struct MetricBatchRequest {
    /// Events in this batch.
    pub events: Vec<MetricEvent>,
}

/// Body of the mixed batch endpoint.
#[derive(Debug, Deserialize)]
pub struct MixedBatchRequest {
    /// Client-chosen idempotency identifier, echoed back.
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Declared batch type, uninterpreted by the core.
    #[serde(default)]
    pub batch_type: Option<String>,
    /// Exposure events in this batch.
    #[serde(default)]
    pub exposure_events: Vec<ExposureEvent>,
    /// Metric events in this batch.
    #[serde(default)]
    pub metric_events: Vec<MetricEvent>,
}

/// Admission response with per-event errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Echo of the client batch identifier, when one was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Events accepted into the buffers.
    pub accepted_count: usize,
    /// Events rejected by validation.
    pub rejected_count: usize,
    /// Index-scoped rejection reasons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl IngestResponse {
    /// Builds a response from counts and errors.
    fn new(
        batch_id: Option<String>,
        accepted_count: usize,
        errors: Vec<FieldError>,
    ) -> Self {
        Self {
            batch_id,
            accepted_count,
            rejected_count: errors.len(),
            errors: if errors.is_empty() { None } else { Some(errors) },
        }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the ingest router.
pub fn router(state: Arc<IngestState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/events/exposure", post(post_exposures))
        .route("/v1/events/metrics", post(post_metrics))
        .route("/v1/events/batch", post(post_mixed))
        .with_state(state)
}

/// Serves the router until the shutdown signal fires, then drains.
///
/// # Errors
/// Returns the underlying I/O error when the listener fails.
pub async fn serve(
    state: Arc<IngestState>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    drain_timeout: Duration,
) -> std::io::Result<()> {
    let app = router(Arc::clone(&state));
    let mut server_shutdown = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stopped| *stopped).await;
        })
        .await;
    let _ = shutdown.wait_for(|stopped| *stopped).await;
    drain(&state, drain_timeout).await;
    result
}

/// Closes admission and drains both buffers under a bound.
pub async fn drain(state: &Arc<IngestState>, drain_timeout: Duration) {
    state.stopping.store(true, Ordering::Relaxed);
    let drained = tokio::time::timeout(drain_timeout, async {
        flush_exposures(state).await;
        flush_metrics(state).await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("shutdown drain exceeded its bound; remaining events lost");
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Liveness probe; requires no credential.
async fn healthz() -> &'static str {
    "ok"
}

/// Admits an exposure batch.
async fn post_exposures(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    Json(request): Json<ExposureBatchRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    admit(&state, &headers, request.events.len())?;
    let validated = validate_exposures(request.events, Timestamp::now());
    state.rejected_total.fetch_add(validated.rejected_count() as u64, Ordering::Relaxed);

    let accepted_count = validated.accepted_count();
    if state.buffers.append_exposures(validated.accepted) {
        let flush_state = Arc::clone(&state);
        tokio::spawn(async move {
            flush_exposures(&flush_state).await;
        });
    }
    Ok(Json(IngestResponse::new(None, accepted_count, validated.errors)))
}

/// Admits a metric batch.
async fn post_metrics(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    Json(request): Json<MetricBatchRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    admit(&state, &headers, request.events.len())?;
    let validated = validate_metrics(request.events, Timestamp::now());
    state.rejected_total.fetch_add(validated.rejected_count() as u64, Ordering::Relaxed);

    let accepted_count = validated.accepted_count();
    if state.buffers.append_metrics(validated.accepted) {
        let flush_state = Arc::clone(&state);
        tokio::spawn(async move {
            flush_metrics(&flush_state).await;
        });
    }
    Ok(Json(IngestResponse::new(None, accepted_count, validated.errors)))
}

/// Admits a mixed batch of exposures and metrics.
async fn post_mixed(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    Json(request): Json<MixedBatchRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let total = request.exposure_events.len() + request.metric_events.len();
    admit(&state, &headers, total)?;
    let now = Timestamp::now();

    let exposures = validate_exposures(request.exposure_events, now);
    let metrics = validate_metrics(request.metric_events, now);
    let mut errors = reprefix(exposures.errors, "exposure_events");
    errors.extend(reprefix(metrics.errors, "metric_events"));
    state.rejected_total.fetch_add(errors.len() as u64, Ordering::Relaxed);

    let accepted_count = exposures.accepted.len() + metrics.accepted.len();
    let flush_exposures_due = state.buffers.append_exposures(exposures.accepted);
    let flush_metrics_due = state.buffers.append_metrics(metrics.accepted);
    if flush_exposures_due || flush_metrics_due {
        let flush_state = Arc::clone(&state);
        tokio::spawn(async move {
            if flush_exposures_due {
                flush_exposures(&flush_state).await;
            }
            if flush_metrics_due {
                flush_metrics(&flush_state).await;
            }
        });
    }
    Ok(Json(IngestResponse::new(request.batch_id, accepted_count, errors)))
}

/// Shared admission checks: shutdown gate, credential, and batch bounds.
fn admit(state: &IngestState, headers: &HeaderMap, batch_len: usize) -> Result<(), AppError> {
    if state.is_stopping() {
        return Err(AppError(ApiError::ServiceStopping));
    }
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError(ApiError::Unauthenticated))?;
    if !state.verifier.verify(token).ok {
        return Err(AppError(ApiError::Unauthenticated));
    }
    if batch_len == 0 {
        return Err(AppError(ApiError::InvalidRequest("batch is empty".to_string())));
    }
    if batch_len > MAX_BATCH_EVENTS {
        return Err(AppError(ApiError::BatchTooLarge {
            limit: MAX_BATCH_EVENTS,
        }));
    }
    Ok(())
}

/// Rewrites `events[i].field` paths for the mixed endpoint.
fn reprefix(errors: Vec<FieldError>, prefix: &str) -> Vec<FieldError> {
    errors
        .into_iter()
        .map(|error| FieldError {
            field: error.field.replacen("events[", &format!("{prefix}["), 1),
            message: error.message,
        })
        .collect()
}

// ============================================================================
// SECTION: Flushing
// ============================================================================

/// Flushes the exposure buffer as one store batch.
pub async fn flush_exposures(state: &Arc<IngestState>) {
    let batch = state.buffers.take_exposures();
    if batch.is_empty() {
        return;
    }
    let size = batch.len();
    let retry_copy = state.retry.as_ref().map(|_| batch.clone());
    let result =
        tokio::time::timeout(state.store_timeout, state.store.write_exposures(batch)).await;
    match result {
        Ok(Ok(())) => {
            tracing::debug!(batch_size = size, "exposure batch flushed");
        }
        Ok(Err(err)) => {
            state.store_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(batch_size = size, error = %err, "exposure flush failed");
            if let (Some(retry), Some(copy)) = (&state.retry, retry_copy) {
                retry.push(PendingBatch::Exposures(copy));
            }
        }
        Err(_) => {
            state.store_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(batch_size = size, "exposure flush timed out");
            if let (Some(retry), Some(copy)) = (&state.retry, retry_copy) {
                retry.push(PendingBatch::Exposures(copy));
            }
        }
    }
}

/// Flushes the metric buffer as one store batch.
pub async fn flush_metrics(state: &Arc<IngestState>) {
    let batch = state.buffers.take_metrics();
    if batch.is_empty() {
        return;
    }
    let size = batch.len();
    let retry_copy = state.retry.as_ref().map(|_| batch.clone());
    let result =
        tokio::time::timeout(state.store_timeout, state.store.write_metrics(batch)).await;
    match result {
        Ok(Ok(())) => {
            tracing::debug!(batch_size = size, "metric batch flushed");
        }
        Ok(Err(err)) => {
            state.store_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(batch_size = size, error = %err, "metric flush failed");
            if let (Some(retry), Some(copy)) = (&state.retry, retry_copy) {
                retry.push(PendingBatch::Metrics(copy));
            }
        }
        Err(_) => {
            state.store_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(batch_size = size, "metric flush timed out");
            if let (Some(retry), Some(copy)) = (&state.retry, retry_copy) {
                retry.push(PendingBatch::Metrics(copy));
            }
        }
    }
}

/// Spawns the unconditional periodic flusher.
pub fn spawn_flusher(
    state: Arc<IngestState>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => break,
                _ = ticker.tick() => {
                    flush_exposures(&state).await;
                    flush_metrics(&state).await;
                }
            }
        }
    })
}
