// crates/flagdeck-control/src/api.rs
// ============================================================================
// Module: Control Plane API
// Description: Config distribution and admin mutation endpoints.
// Purpose: Serve versioned configs with conditional GET and SSE updates.
// Dependencies: axum, flagdeck-bus, flagdeck-core, flagdeck-store, tokio-stream
// ============================================================================

//! ## Overview
//! The control plane exposes the distribution surface (`GET
//! /v1/configs/{env}` with if-none-match semantics and `GET
//! /v1/stream/{env}` server-sent events) and the admin mutation surface
//! (flag/segment upserts and environment removal) that drives the publish
//! pipeline. Every non-health endpoint requires a bearer credential
//! resolved through the [`TokenVerifier`] seam.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::routing::get;
use axum::routing::put;
use flagdeck_bus::ConfigBus;
use flagdeck_bus::UpdateKind;
use flagdeck_core::ApiError;
use flagdeck_core::CompileError;
use flagdeck_core::EnvKey;
use flagdeck_core::ErrorBody;
use flagdeck_core::Flag;
use flagdeck_core::FlagKey;
use flagdeck_core::Segment;
use flagdeck_core::SegmentKey;
use flagdeck_store::ConfigStore;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use flagdeck_core::TokenVerifier;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::publisher::PublishError;
use crate::publisher::Publisher;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state behind the control-plane router.
pub struct ControlState {
    /// Publish pipeline for admin mutations.
    pub publisher: Publisher,
    /// Authoritative store for reads.
    pub store: Arc<dyn ConfigStore>,
    /// Bus feeding the SSE stream.
    pub bus: Arc<dyn ConfigBus>,
    /// Credential verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// SSE heartbeat interval.
    pub heartbeat: Duration,
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

impl From<ApiError> for AppError {
    fn from(error: ApiError) -> Self {
        Self(error)
    }
}

impl From<PublishError> for AppError {
    fn from(error: PublishError) -> Self {
        let api = match error {
            PublishError::InvalidKey(err) => ApiError::InvalidRequest(err.to_string()),
            PublishError::Compile(err) => match &err {
                CompileError::InvalidFlag {
                    ..
                }
                | CompileError::Hashing(_) => ApiError::InvalidRequest(err.to_string()),
                CompileError::InvalidRule {
                    reason,
                    rule_id,
                } => ApiError::InvalidRule {
                    reason: reason.clone(),
                    rule_id: rule_id.to_string(),
                },
                CompileError::UnknownOperator {
                    rule_id,
                    ..
                }
                | CompileError::UnknownSegmentRef {
                    rule_id,
                    ..
                }
                | CompileError::EmptyRollout {
                    rule_id,
                }
                | CompileError::NegativeWeight {
                    rule_id,
                    ..
                } => ApiError::InvalidRule {
                    reason: err.to_string(),
                    rule_id: rule_id.to_string(),
                },
            },
            PublishError::Store(err) => {
                tracing::error!(error = %err, "store failure during publish");
                ApiError::InternalError
            }
            PublishError::Bus(err) => {
                tracing::error!(error = %err, "bus failure during publish");
                ApiError::UpstreamUnavailable("config bus".to_string())
            }
            PublishError::Contention(env_key) => {
                tracing::warn!(env_key = %env_key, "publish contention exhausted retries");
                ApiError::InternalError
            }
        };
        Self(api)
    }
}

// ============================================================================
// SECTION: Auth Helper
// ============================================================================

/// Extracts and verifies the bearer credential for an environment.
fn authorize(
    state: &ControlState,
    headers: &HeaderMap,
    env_key: &EnvKey,
) -> Result<(), AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError(ApiError::Unauthenticated))?;
    let verification = state.verifier.verify(token);
    if !verification.ok {
        return Err(AppError(ApiError::Unauthenticated));
    }
    if !verification.allows(env_key) {
        return Err(AppError(ApiError::Forbidden));
    }
    Ok(())
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Publish receipt returned by mutation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptBody {
    /// Environment that was published.
    pub env_key: EnvKey,
    /// Version the publish produced.
    pub version: u64,
    /// Etag of the published document.
    pub etag: String,
}

/// Payload of one SSE update event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Update kind.
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Environment the update applies to.
    pub env_key: EnvKey,
    /// Version the control plane wrote.
    pub version: u64,
    /// Etag of the new document, when one exists.
    pub etag: String,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the control-plane router.
pub fn router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/configs/{env_key}", get(get_config))
        .route("/v1/stream/{env_key}", get(stream_config))
        .route(
            "/v1/envs/{env_key}/flags/{flag_key}",
            put(put_flag),
        )
        .route(
            "/v1/envs/{env_key}/segments/{segment_key}",
            put(put_segment),
        )
        .route("/v1/envs/{env_key}", axum::routing::delete(delete_env))
        .with_state(state)
}

/// Serves the router until the shutdown signal fires.
///
/// # Errors
/// Returns the underlying I/O error when the listener fails.
pub async fn serve(
    state: Arc<ControlState>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stopped| *stopped).await;
        })
        .await
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Liveness probe; requires no credential.
async fn healthz() -> &'static str {
    "ok"
}

/// Serves a config document with if-none-match semantics.
async fn get_config(
    State(state): State<Arc<ControlState>>,
    Path(env_key): Path<EnvKey>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    authorize(&state, &headers, &env_key)?;
    let config = state
        .store
        .load_config(&env_key)
        .map_err(|err| {
            tracing::error!(error = %err, "store failure during config read");
            AppError(ApiError::InternalError)
        })?
        .ok_or(AppError(ApiError::EnvNotFound))?;

    let presented = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().trim_matches('"'));
    if presented == Some(config.etag.as_str()) {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, format!("\"{}\"", config.etag))],
        )
            .into_response());
    }

    Ok((
        StatusCode::OK,
        [(header::ETAG, format!("\"{}\"", config.etag))],
        Json(config),
    )
        .into_response())
}

/// Streams config updates for one environment as server-sent events.
async fn stream_config(
    State(state): State<Arc<ControlState>>,
    Path(env_key): Path<EnvKey>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    authorize(&state, &headers, &env_key)?;
    let receiver = state.bus.subscribe().into_receiver();
    let stream = ReceiverStream::new(receiver)
        .filter(move |message| message.env_key == env_key)
        .map(|message| {
            let payload = StreamEvent {
                kind: message.kind,
                env_key: message.env_key,
                version: message.version,
                etag: message.config.map(|config| config.etag).unwrap_or_default(),
            };
            Event::default().event("config").json_data(&payload)
        });
    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new().interval(state.heartbeat).text("heartbeat"),
    );
    Ok(sse.into_response())
}

/// Creates or replaces a flag.
async fn put_flag(
    State(state): State<Arc<ControlState>>,
    Path((env_key, flag_key)): Path<(EnvKey, FlagKey)>,
    headers: HeaderMap,
    Json(flag): Json<Flag>,
) -> Result<Json<ReceiptBody>, AppError> {
    authorize(&state, &headers, &env_key)?;
    let receipt = state.publisher.upsert_flag(&env_key, &flag_key, flag)?;
    Ok(Json(ReceiptBody {
        env_key: receipt.env_key,
        version: receipt.version,
        etag: receipt.etag,
    }))
}

/// Creates or replaces a segment.
async fn put_segment(
    State(state): State<Arc<ControlState>>,
    Path((env_key, segment_key)): Path<(EnvKey, SegmentKey)>,
    headers: HeaderMap,
    Json(segment): Json<Segment>,
) -> Result<Json<ReceiptBody>, AppError> {
    authorize(&state, &headers, &env_key)?;
    let receipt = state.publisher.upsert_segment(&env_key, &segment_key, segment)?;
    Ok(Json(ReceiptBody {
        env_key: receipt.env_key,
        version: receipt.version,
        etag: receipt.etag,
    }))
}

/// Removes an environment and notifies edges.
async fn delete_env(
    State(state): State<Arc<ControlState>>,
    Path(env_key): Path<EnvKey>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    authorize(&state, &headers, &env_key)?;
    if state.publisher.remove_env(&env_key)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError(ApiError::EnvNotFound))
    }
}
