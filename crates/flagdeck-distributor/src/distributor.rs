// crates/flagdeck-distributor/src/distributor.rs
// ============================================================================
// Module: Edge Config Distributor
// Description: Bus subscription, polling, warm-cache, and offline fallback.
// Purpose: Keep the edge's env map converged with the control plane.
// Dependencies: crate::{bootstrap, env_map, fetch}, flagdeck-bus, flagdeck-store
// ============================================================================

//! ## Overview
//! The distributor owns the edge's config lifecycle. Bus messages install
//! or invalidate configs as they arrive; the poll loop issues conditional
//! GETs at a fixed interval to compensate for anything the bus dropped;
//! the shared warm cache absorbs local misses before the control plane is
//! asked; and a bootstrap file keeps evaluation answering when nothing
//! live is available. Authentication failures on the pull path are logged
//! (rate-limited) and never invalidate cached config.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use flagdeck_bus::BusSubscription;
use flagdeck_bus::UpdateKind;
use flagdeck_bus::UpdateMessage;
use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;
use flagdeck_store::SharedCache;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::env_map::EnvConfigMap;
use crate::fetch::ConfigFetcher;
use crate::fetch::FetchOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum spacing between operator-visible auth-failure logs.
const AUTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Outcome of resolving an environment for evaluation.
///
/// # Invariants
/// - `Offline` configs come from the bootstrap file, never the live path.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A live config is installed.
    Live(Arc<EnvironmentConfig>),
    /// A bootstrap config answered; mark reason `offline_fallback`.
    Offline(Arc<EnvironmentConfig>),
    /// No config is available anywhere.
    Absent,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for the edge distributor.
///
/// # Invariants
/// - A distributor without a fetcher can still serve bootstrap configs.
#[derive(Default)]
pub struct DistributorBuilder {
    /// Pull-side fetcher against the control plane.
    fetcher: Option<Arc<dyn ConfigFetcher>>,
    /// Optional shared warm cache.
    cache: Option<Arc<dyn SharedCache>>,
    /// Bootstrap documents keyed by environment.
    bootstrap: HashMap<EnvKey, Arc<EnvironmentConfig>>,
    /// Forces bootstrap use even when live config exists.
    offline: bool,
    /// Poll interval for the compensation loop.
    poll_interval: Duration,
}

impl DistributorBuilder {
    /// Sets the control-plane fetcher.
    #[must_use]
    pub fn fetcher(mut self, fetcher: impl ConfigFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Sets the shared warm cache tier.
    #[must_use]
    pub fn shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the bootstrap documents.
    #[must_use]
    pub fn bootstrap(mut self, bootstrap: HashMap<EnvKey, Arc<EnvironmentConfig>>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Forces offline mode.
    #[must_use]
    pub const fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builds the distributor.
    #[must_use]
    pub fn build(self) -> Distributor {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(30)
        } else {
            self.poll_interval
        };
        Distributor {
            map: EnvConfigMap::new(),
            fetcher: self.fetcher,
            cache: self.cache,
            bootstrap: self.bootstrap,
            offline: self.offline,
            poll_interval,
            auth_failures: AtomicU64::new(0),
            last_auth_log: Mutex::new(None),
        }
    }
}

// ============================================================================
// SECTION: Distributor
// ============================================================================

/// Edge-side config distribution component.
///
/// # Invariants
/// - Evaluation reads go through [`Distributor::resolve`]; nothing else
///   reaches the env map from the request path.
pub struct Distributor {
    /// Installed live configs.
    map: EnvConfigMap,
    /// Pull-side fetcher, absent in bootstrap-only deployments.
    fetcher: Option<Arc<dyn ConfigFetcher>>,
    /// Warm cache consulted before the control plane.
    cache: Option<Arc<dyn SharedCache>>,
    /// Offline fallback documents.
    bootstrap: HashMap<EnvKey, Arc<EnvironmentConfig>>,
    /// Forces bootstrap use when true.
    offline: bool,
    /// Poll interval for the compensation loop.
    poll_interval: Duration,
    /// Count of auth failures observed on the pull path.
    auth_failures: AtomicU64,
    /// Last time an auth failure was logged.
    last_auth_log: Mutex<Option<Instant>>,
}

impl Distributor {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> DistributorBuilder {
        DistributorBuilder::default()
    }

    /// Resolves the config to evaluate against for an environment.
    ///
    /// Order: forced offline → installed live config → warm cache →
    /// control-plane fetch → bootstrap → absent.
    pub async fn resolve(&self, env_key: &EnvKey) -> Resolution {
        if self.offline {
            return self.bootstrap_resolution(env_key);
        }
        if let Some(config) = self.map.get(env_key) {
            return Resolution::Live(config);
        }
        if let Some(cache) = &self.cache
            && let Some(config) = cache.get(env_key)
        {
            self.map.install(config);
            if let Some(installed) = self.map.get(env_key) {
                return Resolution::Live(installed);
            }
        }
        if let Some(fetcher) = &self.fetcher {
            match fetcher.fetch(env_key, None).await {
                FetchOutcome::New(config) => {
                    self.map.install(*config);
                    if let Some(installed) = self.map.get(env_key) {
                        return Resolution::Live(installed);
                    }
                }
                FetchOutcome::Unauthorized => self.note_auth_failure(env_key),
                FetchOutcome::NotModified
                | FetchOutcome::NotFound
                | FetchOutcome::Unavailable(_) => {}
            }
        }
        self.bootstrap_resolution(env_key)
    }

    /// Resolves from the bootstrap documents only.
    fn bootstrap_resolution(&self, env_key: &EnvKey) -> Resolution {
        self.bootstrap
            .get(env_key)
            .map_or(Resolution::Absent, |config| Resolution::Offline(Arc::clone(config)))
    }

    /// Applies one bus message to the env map.
    pub async fn handle_message(&self, message: UpdateMessage) {
        match message.kind {
            UpdateKind::FullRefresh => {
                if let Some(config) = message.config {
                    if self.map.install(config) {
                        tracing::info!(
                            env_key = %message.env_key,
                            version = message.version,
                            "installed config from bus"
                        );
                    }
                } else {
                    tracing::warn!(
                        env_key = %message.env_key,
                        "full_refresh message without inline config"
                    );
                }
            }
            UpdateKind::Incremental => {
                self.refresh_env(&message.env_key).await;
            }
            UpdateKind::Invalidate => {
                if self.map.invalidate(&message.env_key) {
                    tracing::info!(env_key = %message.env_key, "config invalidated by bus");
                }
            }
            UpdateKind::Unknown => {
                tracing::warn!(env_key = %message.env_key, "ignoring unknown bus message kind");
            }
        }
    }

    /// Fetches one environment with the installed etag hint.
    async fn refresh_env(&self, env_key: &EnvKey) {
        let Some(fetcher) = &self.fetcher else {
            return;
        };
        let etag = self.map.etag(env_key);
        match fetcher.fetch(env_key, etag.as_deref()).await {
            FetchOutcome::New(config) => {
                let version = config.version;
                if self.map.install(*config) {
                    tracing::info!(env_key = %env_key, version, "installed config from poll");
                }
            }
            FetchOutcome::NotModified => {}
            FetchOutcome::NotFound => {
                if self.map.invalidate(env_key) {
                    tracing::info!(env_key = %env_key, "config invalidated by 404 poll");
                }
            }
            FetchOutcome::Unauthorized => self.note_auth_failure(env_key),
            FetchOutcome::Unavailable(reason) => {
                tracing::debug!(env_key = %env_key, reason = %reason, "poll fetch unavailable");
            }
        }
    }

    /// Polls every held environment once.
    pub async fn poll_once(&self) {
        for env_key in self.map.envs() {
            self.refresh_env(&env_key).await;
        }
    }

    /// Records an auth failure, logging at most once per interval.
    ///
    /// Cached config is deliberately left untouched: availability wins
    /// over freshness when credentials break.
    fn note_auth_failure(&self, env_key: &EnvKey) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
        let should_log = self.last_auth_log.lock().is_ok_and(|mut last| {
            let now = Instant::now();
            match *last {
                Some(at) if now.duration_since(at) < AUTH_LOG_INTERVAL => false,
                _ => {
                    *last = Some(now);
                    true
                }
            }
        });
        if should_log {
            tracing::error!(
                env_key = %env_key,
                total = self.auth_failures.load(Ordering::Relaxed),
                "control plane rejected credentials; keeping cached config"
            );
        }
    }

    /// Returns the cumulative auth-failure count.
    #[must_use]
    pub fn auth_failure_count(&self) -> u64 {
        self.auth_failures.load(Ordering::Relaxed)
    }

    /// Returns the installed version for an environment.
    #[must_use]
    pub fn installed_version(&self, env_key: &EnvKey) -> Option<u64> {
        self.map.version(env_key)
    }

    /// Spawns the bus subscriber task.
    pub fn spawn_subscriber(
        self: &Arc<Self>,
        mut subscription: BusSubscription,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let distributor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => break,
                    message = subscription.recv() => match message {
                        Some(message) => distributor.handle_message(message).await,
                        None => break,
                    },
                }
            }
        })
    }

    /// Spawns the conditional-GET poll loop.
    pub fn spawn_poller(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let distributor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(distributor.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => break,
                    _ = ticker.tick() => distributor.poll_once().await,
                }
            }
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
