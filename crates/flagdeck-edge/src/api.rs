// crates/flagdeck-edge/src/api.rs
// ============================================================================
// Module: Edge Evaluation API
// Description: Low-latency flag evaluation endpoints with exposure emission.
// Purpose: Answer evaluation requests from installed config in memory.
// Dependencies: axum, flagdeck-core, flagdeck-distributor, crate::exposure
// ============================================================================

//! ## Overview
//! The evaluation surface serves `POST /v1/evaluate` (all or selected
//! flags) and `POST /v1/evaluate/{env}/{flag}` (single flag). Evaluation
//! is pure CPU over the config the distributor resolved; a per-flag fault
//! degrades that flag to its default with an `evaluation_error` reason and
//! never fails the request. Every evaluated flag enqueues exactly one
//! exposure event through the fire-and-forget emitter. Reasons appear on
//! the wire only when `include_reason` is set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
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
use axum::routing::get;
use axum::routing::post;
use flagdeck_core::ApiError;
use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;
use flagdeck_core::ErrorBody;
use flagdeck_core::EvalContext;
use flagdeck_core::EvalReason;
use flagdeck_core::Evaluation;
use flagdeck_core::ExposureEvent;
use flagdeck_core::FlagKey;
use flagdeck_core::FlagStatus;
use flagdeck_core::Timestamp;
use flagdeck_core::TokenVerifier;
use flagdeck_core::evaluate_flag;
use flagdeck_core::user_key_hash;
use flagdeck_distributor::Distributor;
use flagdeck_distributor::Resolution;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::exposure::ExposureEmitter;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state behind the edge router.
pub struct EdgeState {
    /// Config distribution component.
    pub distributor: Arc<Distributor>,
    /// Fire-and-forget exposure queue.
    pub emitter: ExposureEmitter,
    /// Credential verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Soft deadline for the miss-then-fetch resolution path.
    pub eval_timeout: Duration,
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

/// Body of `POST /v1/evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Environment to evaluate in.
    pub env_key: EnvKey,
    /// Flags to evaluate; absent or empty evaluates all active flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_keys: Option<Vec<FlagKey>>,
    /// Evaluation context.
    pub context: EvalContext,
    /// Whether to include reasons in the response.
    #[serde(default)]
    pub include_reason: bool,
}

/// Body of the single-flag endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleEvaluateRequest {
    /// Evaluation context.
    pub context: EvalContext,
    /// Whether to include the reason in the response.
    #[serde(default)]
    pub include_reason: bool,
}

/// Per-flag evaluation result on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagResult {
    /// Flag that was evaluated.
    pub flag_key: FlagKey,
    /// Assigned variation.
    pub variation_key: String,
    /// Value of the assigned variation.
    pub value: Value,
    /// Reason, present only when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<EvalReason>,
    /// Config version the evaluation used.
    pub config_version: u64,
    /// Evaluation timestamp.
    pub evaluated_at: Timestamp,
}

/// Body of the multi-flag response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    /// Results keyed by flag.
    pub flags: BTreeMap<FlagKey, FlagResult>,
    /// Config version the evaluation used.
    pub config_version: u64,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the edge router.
pub fn router(state: Arc<EdgeState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/evaluate", post(evaluate_many))
        .route("/v1/evaluate/{env_key}/{flag_key}", post(evaluate_single))
        .with_state(state)
}

/// Serves the router until the shutdown signal fires.
///
/// # Errors
/// Returns the underlying I/O error when the listener fails.
pub async fn serve(
    state: Arc<EdgeState>,
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

/// Evaluates all or selected flags for one context.
async fn evaluate_many(
    State(state): State<Arc<EdgeState>>,
    headers: HeaderMap,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, AppError> {
    authorize(&state, &headers, &request.env_key)?;
    validate_context(&request.context)?;

    let (config, offline) = resolve_config(&state, &request.env_key).await?;

    let selected: Vec<FlagKey> = match &request.flag_keys {
        Some(keys) if !keys.is_empty() => {
            // Unknown flags are silently omitted on the multi-flag path.
            keys.iter().filter(|key| config.flags.contains_key(*key)).cloned().collect()
        }
        _ => config
            .flags
            .iter()
            .filter(|(_, plan)| plan.status == FlagStatus::Active)
            .map(|(key, _)| key.clone())
            .collect(),
    };

    let mut flags = BTreeMap::new();
    for flag_key in selected {
        if let Some(result) =
            evaluate_one(&state, &config, &flag_key, &request.context, offline, request.include_reason)
        {
            flags.insert(flag_key, result);
        }
    }

    Ok(Json(EvaluateResponse {
        flags,
        config_version: config.version,
    }))
}

/// Evaluates one flag, erroring when it does not exist.
async fn evaluate_single(
    State(state): State<Arc<EdgeState>>,
    Path((env_key, flag_key)): Path<(EnvKey, FlagKey)>,
    headers: HeaderMap,
    Json(request): Json<SingleEvaluateRequest>,
) -> Result<Json<FlagResult>, AppError> {
    authorize(&state, &headers, &env_key)?;
    validate_context(&request.context)?;

    let (config, offline) = resolve_config(&state, &env_key).await?;
    if !config.flags.contains_key(&flag_key) {
        return Err(AppError(ApiError::FlagNotFound));
    }
    evaluate_one(&state, &config, &flag_key, &request.context, offline, request.include_reason)
        .map(Json)
        .ok_or(AppError(ApiError::FlagNotFound))
}

// ============================================================================
// SECTION: Evaluation Helpers
// ============================================================================

/// Extracts and verifies the bearer credential for an environment.
fn authorize(state: &EdgeState, headers: &HeaderMap, env_key: &EnvKey) -> Result<(), AppError> {
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

/// Rejects contexts without a user key.
fn validate_context(context: &EvalContext) -> Result<(), AppError> {
    if context.user_key.is_empty() {
        return Err(AppError(ApiError::InvalidRequest(
            "context invalid: user_key is required".to_string(),
        )));
    }
    Ok(())
}

/// Resolves the config to evaluate against, marking offline fallback.
///
/// The resolution path may fetch on a local miss; the soft evaluation
/// deadline bounds that fetch so a slow control plane surfaces as a
/// timeout instead of a hung request.
async fn resolve_config(
    state: &EdgeState,
    env_key: &EnvKey,
) -> Result<(Arc<EnvironmentConfig>, bool), AppError> {
    let resolution = tokio::time::timeout(state.eval_timeout, state.distributor.resolve(env_key))
        .await
        .map_err(|_| AppError(ApiError::Timeout))?;
    match resolution {
        Resolution::Live(config) => Ok((config, false)),
        Resolution::Offline(config) => Ok((config, true)),
        Resolution::Absent => Err(AppError(ApiError::EnvNotFound)),
    }
}

/// Evaluates one flag and enqueues its exposure event.
fn evaluate_one(
    state: &EdgeState,
    config: &EnvironmentConfig,
    flag_key: &FlagKey,
    context: &EvalContext,
    offline: bool,
    include_reason: bool,
) -> Option<FlagResult> {
    let plan = config.plan(flag_key)?;
    let evaluation = evaluate_flag(plan, &config.salt, context);
    let reason = if offline { EvalReason::OfflineFallback } else { evaluation.reason };
    let evaluated_at = Timestamp::now();

    state.emitter.emit(exposure_for(config, flag_key, context, &evaluation, reason));

    Some(FlagResult {
        flag_key: flag_key.clone(),
        variation_key: evaluation.variation_key.as_str().to_string(),
        value: evaluation.value,
        reason: include_reason.then_some(reason),
        config_version: config.version,
        evaluated_at,
    })
}

/// Builds the exposure event for one evaluation.
fn exposure_for(
    config: &EnvironmentConfig,
    flag_key: &FlagKey,
    context: &EvalContext,
    evaluation: &Evaluation,
    reason: EvalReason,
) -> ExposureEvent {
    let attributes =
        serde_json::to_value(&context.attributes).unwrap_or(Value::Null);
    ExposureEvent {
        event_id: None,
        env_key: config.env_key.clone(),
        flag_key: flag_key.clone(),
        variation_key: evaluation.variation_key.clone(),
        user_key_hash: user_key_hash(&context.user_key),
        bucketing_id: evaluation.bucketing.bucketing_id.clone(),
        experiment_key: None,
        session_id: None,
        timestamp: Some(Timestamp::now()),
        reason,
        rule_id: evaluation.rule_id.clone(),
        default_used: reason.is_default_path(),
        context: attributes,
        meta: Value::Null,
    }
}
