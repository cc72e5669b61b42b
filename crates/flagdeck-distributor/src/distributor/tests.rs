// crates/flagdeck-distributor/src/distributor/tests.rs
// ============================================================================
// Module: Distributor Tests
// Description: Unit tests for the edge config lifecycle.
// Purpose: Validate bus handling, poll outcomes, and fallback ordering.
// Dependencies: flagdeck-distributor
// ============================================================================

//! ## Overview
//! Exercises the distributor against a scripted fetcher: bus installs and
//! invalidations, poll outcomes (200/304/404/401), warm-cache hits, and
//! the offline/bootstrap fallback ordering.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use flagdeck_bus::UpdateMessage;
use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;
use flagdeck_core::Timestamp;
use flagdeck_store::MemorySharedCache;
use flagdeck_store::SharedCache;
use serde_json::json;

use super::Distributor;
use super::Resolution;
use crate::fetch::ConfigFetcher;
use crate::fetch::FetchOutcome;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn config(env_key: &str, version: u64) -> EnvironmentConfig {
    EnvironmentConfig::build(
        env_key.into(),
        version,
        "salt".to_string(),
        BTreeMap::new(),
        BTreeMap::new(),
        Timestamp::from_unix_millis(0).unwrap(),
        None,
    )
    .unwrap()
}

fn ts() -> Timestamp {
    Timestamp::from_unix_millis(0).unwrap()
}

/// Fetcher that replays a scripted outcome sequence.
struct ScriptedFetcher {
    /// Outcomes served in order; exhausted script answers Unavailable.
    script: Mutex<VecDeque<FetchOutcome>>,
    /// Number of fetches issued.
    calls: AtomicU64,
    /// Etag hints observed, in order.
    etags: Mutex<Vec<Option<String>>>,
}

impl ScriptedFetcher {
    fn new(outcomes: Vec<FetchOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: AtomicU64::new(0),
            etags: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConfigFetcher for ScriptedFetcher {
    async fn fetch(&self, _env_key: &EnvKey, etag: Option<&str>) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.etags.lock().unwrap().push(etag.map(ToString::to_string));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FetchOutcome::Unavailable("script exhausted".to_string()))
    }
}

fn assert_live(resolution: &Resolution, version: u64) {
    let Resolution::Live(config) = resolution else {
        panic!("expected live resolution, got {resolution:?}");
    };
    assert_eq!(config.version, version);
}

// ============================================================================
// SECTION: Bus Handling
// ============================================================================

#[tokio::test]
async fn full_refresh_installs_the_inline_config() {
    let distributor = Distributor::builder().build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 8), ts())).await;
    assert_eq!(distributor.installed_version(&"prod".into()), Some(8));
    assert_live(&distributor.resolve(&"prod".into()).await, 8);
}

#[tokio::test]
async fn installs_never_go_backwards() {
    let distributor = Distributor::builder().build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 8), ts())).await;
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 7), ts())).await;
    assert_eq!(distributor.installed_version(&"prod".into()), Some(8));
}

#[tokio::test]
async fn invalidate_removes_the_env() {
    let distributor = Distributor::builder().build();
    distributor.handle_message(UpdateMessage::full_refresh(config("e1", 5), ts())).await;
    distributor.handle_message(UpdateMessage::invalidate("e1".into(), 5, ts())).await;
    assert!(distributor.installed_version(&"e1".into()).is_none());
    assert!(matches!(distributor.resolve(&"e1".into()).await, Resolution::Absent));
}

#[tokio::test]
async fn unknown_kinds_are_ignored() {
    let distributor = Distributor::builder().build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 3), ts())).await;
    let unknown: UpdateMessage = serde_json::from_value(json!({
        "type": "schema_migrated",
        "env_key": "prod",
        "version": 99,
        "timestamp": "2026-01-01T00:00:00Z"
    }))
    .unwrap();
    distributor.handle_message(unknown).await;
    assert_eq!(distributor.installed_version(&"prod".into()), Some(3));
}

#[tokio::test]
async fn incremental_triggers_a_conditional_fetch() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![FetchOutcome::New(Box::new(config(
        "prod", 9,
    )))]));
    let distributor = Arc::new(
        Distributor::builder().fetcher(ScriptedSharedFetcher(Arc::clone(&fetcher))).build(),
    );
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 8), ts())).await;
    distributor.handle_message(UpdateMessage::incremental("prod".into(), 9, ts())).await;
    assert_eq!(distributor.installed_version(&"prod".into()), Some(9));

    // The fetch carried the installed etag as its hint.
    let etags = fetcher.etags.lock().unwrap();
    assert_eq!(etags.len(), 1);
    assert!(etags[0].is_some());
}

/// Wrapper sharing one scripted fetcher between test and distributor.
struct ScriptedSharedFetcher(Arc<ScriptedFetcher>);

#[async_trait]
impl ConfigFetcher for ScriptedSharedFetcher {
    async fn fetch(&self, env_key: &EnvKey, etag: Option<&str>) -> FetchOutcome {
        self.0.fetch(env_key, etag).await
    }
}

// ============================================================================
// SECTION: Poll Outcomes
// ============================================================================

#[tokio::test]
async fn poll_installs_new_versions() {
    let fetcher = ScriptedFetcher::new(vec![FetchOutcome::New(Box::new(config("prod", 9)))]);
    let distributor = Distributor::builder().fetcher(fetcher).build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 7), ts())).await;
    distributor.poll_once().await;
    assert_eq!(distributor.installed_version(&"prod".into()), Some(9));
}

#[tokio::test]
async fn poll_not_modified_keeps_the_config() {
    let fetcher = ScriptedFetcher::new(vec![FetchOutcome::NotModified]);
    let distributor = Distributor::builder().fetcher(fetcher).build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 7), ts())).await;
    distributor.poll_once().await;
    assert_eq!(distributor.installed_version(&"prod".into()), Some(7));
}

#[tokio::test]
async fn poll_404_invalidates() {
    let fetcher = ScriptedFetcher::new(vec![FetchOutcome::NotFound]);
    let distributor = Distributor::builder().fetcher(fetcher).build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 7), ts())).await;
    distributor.poll_once().await;
    assert!(distributor.installed_version(&"prod".into()).is_none());
}

#[tokio::test]
async fn poll_auth_failure_keeps_config_and_counts() {
    let fetcher = ScriptedFetcher::new(vec![FetchOutcome::Unauthorized]);
    let distributor = Distributor::builder().fetcher(fetcher).build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 7), ts())).await;
    distributor.poll_once().await;
    assert_eq!(
        distributor.installed_version(&"prod".into()),
        Some(7),
        "auth failure must not invalidate cached config"
    );
    assert_eq!(distributor.auth_failure_count(), 1);
}

#[tokio::test]
async fn poll_unavailable_keeps_config() {
    let fetcher = ScriptedFetcher::new(vec![]);
    let distributor = Distributor::builder().fetcher(fetcher).build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 7), ts())).await;
    distributor.poll_once().await;
    assert_eq!(distributor.installed_version(&"prod".into()), Some(7));
}

// ============================================================================
// SECTION: Miss Path and Fallback Ordering
// ============================================================================

#[tokio::test]
async fn miss_consults_the_warm_cache_before_the_control_plane() {
    let cache: Arc<dyn SharedCache> = Arc::new(MemorySharedCache::new());
    cache.put(config("prod", 4), Duration::from_secs(60));
    let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
    let distributor = Distributor::builder()
        .fetcher(ScriptedSharedFetcher(Arc::clone(&fetcher)))
        .shared_cache(Arc::clone(&cache))
        .build();
    assert_live(&distributor.resolve(&"prod".into()).await, 4);
    assert_eq!(
        fetcher.calls.load(Ordering::Relaxed),
        0,
        "warm-cache hit must not reach the control plane"
    );
}

#[tokio::test]
async fn miss_falls_through_to_the_control_plane() {
    let fetcher = ScriptedFetcher::new(vec![FetchOutcome::New(Box::new(config("prod", 6)))]);
    let distributor = Distributor::builder().fetcher(fetcher).build();
    assert_live(&distributor.resolve(&"prod".into()).await, 6);
    // Subsequent resolves hit the installed config without refetching.
    assert_live(&distributor.resolve(&"prod".into()).await, 6);
}

#[tokio::test]
async fn bootstrap_answers_when_nothing_live_exists() {
    let mut bootstrap = HashMap::new();
    bootstrap.insert(EnvKey::new("prod"), Arc::new(config("prod", 3)));
    let fetcher = ScriptedFetcher::new(vec![]);
    let distributor = Distributor::builder().fetcher(fetcher).bootstrap(bootstrap).build();
    let Resolution::Offline(config) = distributor.resolve(&"prod".into()).await else {
        panic!("expected offline resolution");
    };
    assert_eq!(config.version, 3);
}

#[tokio::test]
async fn offline_toggle_forces_bootstrap_over_live_config() {
    let mut bootstrap = HashMap::new();
    bootstrap.insert(EnvKey::new("prod"), Arc::new(config("prod", 3)));
    let distributor = Distributor::builder().bootstrap(bootstrap).offline(true).build();
    distributor.handle_message(UpdateMessage::full_refresh(config("prod", 9), ts())).await;
    let Resolution::Offline(config) = distributor.resolve(&"prod".into()).await else {
        panic!("expected offline resolution");
    };
    assert_eq!(config.version, 3, "offline mode must ignore live config");
}

#[tokio::test]
async fn absent_everywhere_resolves_absent() {
    let distributor = Distributor::builder().build();
    assert!(matches!(distributor.resolve(&"ghost".into()).await, Resolution::Absent));
}
