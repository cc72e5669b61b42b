// crates/flagdeck-sdk/src/client.rs
// ============================================================================
// Module: Flag Client
// Description: Embedded evaluation client over the distribution machinery.
// Purpose: Give applications millisecond flag answers without an edge hop.
// Dependencies: flagdeck-core, flagdeck-distributor, tokio, url
// ============================================================================

//! ## Overview
//! [`FlagClient`] wraps a [`Distributor`] configured for client use:
//! conditional-GET refresh against the control plane, an optional
//! bootstrap file, and the offline toggle. `evaluate` resolves the
//! environment, runs the pure engine, invokes the exposure callback, and
//! returns a [`FlagDetail`]. Shutting the client down stops the refresh
//! task deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flagdeck_core::EnvKey;
use flagdeck_core::EvalContext;
use flagdeck_core::EvalReason;
use flagdeck_core::ExposureEvent;
use flagdeck_core::FlagKey;
use flagdeck_core::Timestamp;
use flagdeck_core::evaluate_flag;
use flagdeck_core::user_key_hash;
use flagdeck_distributor::BootstrapError;
use flagdeck_distributor::Distributor;
use flagdeck_distributor::HttpConfigFetcher;
use flagdeck_distributor::Resolution;
use flagdeck_distributor::load_bootstrap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by the SDK client.
///
/// # Invariants
/// - Evaluation degrades inside the engine; only missing envs and flags
///   surface here.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No config is available for the environment.
    #[error("environment not found")]
    EnvNotFound,
    /// The flag does not exist in the resolved config.
    #[error("flag not found")]
    FlagNotFound,
    /// The bootstrap file failed to load.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The HTTP fetcher could not be constructed.
    #[error("client construction failed: {0}")]
    Construction(String),
}

// ============================================================================
// SECTION: Detail
// ============================================================================

/// Result of one client-side evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagDetail {
    /// Flag that was evaluated.
    pub flag_key: FlagKey,
    /// Assigned variation key.
    pub variation_key: String,
    /// Value of the assigned variation.
    pub value: Value,
    /// Why the variation was assigned.
    pub reason: EvalReason,
    /// Config version the evaluation used.
    pub config_version: u64,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Exposure hand-off callback supplied by the application.
type ExposureHandler = Arc<dyn Fn(ExposureEvent) + Send + Sync>;

/// Builder for [`FlagClient`].
#[derive(Default)]
pub struct FlagClientBuilder {
    /// Control-plane base URL for refresh.
    control_url: Option<Url>,
    /// Credential presented on refresh.
    api_key: Option<String>,
    /// Refresh interval; defaults to 30 seconds.
    refresh_interval: Option<Duration>,
    /// HTTP timeout for refresh requests.
    http_timeout: Option<Duration>,
    /// Bootstrap file path.
    bootstrap_path: Option<PathBuf>,
    /// Forces bootstrap use even when live config exists.
    offline: bool,
    /// Exposure hand-off callback.
    on_exposure: Option<ExposureHandler>,
}

impl FlagClientBuilder {
    /// Sets the control-plane base URL.
    #[must_use]
    pub fn control_url(mut self, url: Url) -> Self {
        self.control_url = Some(url);
        self
    }

    /// Sets the refresh credential.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the refresh interval.
    #[must_use]
    pub const fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Sets the HTTP timeout for refresh requests.
    #[must_use]
    pub const fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets the bootstrap file path.
    #[must_use]
    pub fn bootstrap_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bootstrap_path = Some(path.into());
        self
    }

    /// Forces offline mode.
    #[must_use]
    pub const fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Sets the exposure hand-off callback.
    #[must_use]
    pub fn on_exposure(mut self, handler: impl Fn(ExposureEvent) + Send + Sync + 'static) -> Self {
        self.on_exposure = Some(Arc::new(handler));
        self
    }

    /// Builds the client and starts its refresh task.
    ///
    /// # Errors
    /// Returns [`ClientError`] when the bootstrap file is unusable or the
    /// fetcher cannot be constructed.
    pub fn build(self) -> Result<FlagClient, ClientError> {
        let mut distributor = Distributor::builder()
            .offline(self.offline)
            .poll_interval(self.refresh_interval.unwrap_or(Duration::from_secs(30)));

        if let Some(path) = &self.bootstrap_path {
            distributor = distributor.bootstrap(load_bootstrap(path)?);
        }
        let has_fetcher = self.control_url.is_some();
        if let Some(url) = self.control_url {
            let fetcher = HttpConfigFetcher::new(
                url,
                self.api_key,
                self.http_timeout.unwrap_or(Duration::from_secs(15)),
            )
            .map_err(|err| ClientError::Construction(err.to_string()))?;
            distributor = distributor.fetcher(fetcher);
        }

        let distributor = Arc::new(distributor.build());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let refresh_task = has_fetcher.then(|| distributor.spawn_poller(shutdown_rx));

        Ok(FlagClient {
            distributor,
            on_exposure: self.on_exposure,
            shutdown,
            refresh_task,
        })
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Embedded flag evaluation client.
///
/// # Invariants
/// - One refresh task at most; stopped on [`FlagClient::shutdown`].
pub struct FlagClient {
    /// Distribution machinery shared with the edge.
    distributor: Arc<Distributor>,
    /// Exposure hand-off callback.
    on_exposure: Option<ExposureHandler>,
    /// Stop signal for the refresh task.
    shutdown: watch::Sender<bool>,
    /// Background refresh task handle.
    refresh_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FlagClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagClient")
            .field("has_on_exposure", &self.on_exposure.is_some())
            .field("shutdown", &self.shutdown)
            .field("refresh_task", &self.refresh_task)
            .finish()
    }
}

impl FlagClient {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> FlagClientBuilder {
        FlagClientBuilder::default()
    }

    /// Evaluates one flag for a context.
    ///
    /// # Errors
    /// Returns [`ClientError::EnvNotFound`] or
    /// [`ClientError::FlagNotFound`] when nothing can be evaluated.
    pub async fn evaluate(
        &self,
        env_key: &EnvKey,
        flag_key: &FlagKey,
        context: &EvalContext,
    ) -> Result<FlagDetail, ClientError> {
        let (config, offline) = match self.distributor.resolve(env_key).await {
            Resolution::Live(config) => (config, false),
            Resolution::Offline(config) => (config, true),
            Resolution::Absent => return Err(ClientError::EnvNotFound),
        };
        let plan = config.plan(flag_key).ok_or(ClientError::FlagNotFound)?;
        let evaluation = evaluate_flag(plan, &config.salt, context);
        let reason = if offline { EvalReason::OfflineFallback } else { evaluation.reason };

        if let Some(handler) = &self.on_exposure {
            handler(ExposureEvent {
                event_id: None,
                env_key: env_key.clone(),
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
                context: serde_json::to_value(&context.attributes).unwrap_or(Value::Null),
                meta: Value::Null,
            });
        }

        Ok(FlagDetail {
            flag_key: flag_key.clone(),
            variation_key: evaluation.variation_key.as_str().to_string(),
            value: evaluation.value,
            reason,
            config_version: config.version,
        })
    }

    /// Evaluates one flag, returning the default value on any failure.
    pub async fn value_or(
        &self,
        env_key: &EnvKey,
        flag_key: &FlagKey,
        context: &EvalContext,
        fallback: Value,
    ) -> Value {
        match self.evaluate(env_key, flag_key, context).await {
            Ok(detail) => detail.value,
            Err(_) => fallback,
        }
    }

    /// Returns the underlying distributor (used by integrations).
    #[must_use]
    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    /// Stops the refresh task and consumes the client.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.refresh_task.take() {
            let _ = task.await;
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
