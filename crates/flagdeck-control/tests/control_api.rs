// crates/flagdeck-control/tests/control_api.rs
// ============================================================================
// Module: Control API Integration Tests
// Description: End-to-end tests against a live control-plane server.
// Purpose: Validate auth, publish, conditional GET, and invalidation.
// ============================================================================

//! ## Overview
//! Boots the control plane on an ephemeral port and exercises the full
//! surface with a real HTTP client: authenticated publishes, conditional
//! GETs returning 304, compile failures surfacing as `invalid_rule`, and
//! environment removal yielding 404s.

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

use flagdeck_bus::BroadcastBus;
use flagdeck_bus::ConfigBus;
use flagdeck_control::ControlState;
use flagdeck_control::Publisher;
use flagdeck_control::StaticVerifier;
use flagdeck_control::TokenVerifier;
use flagdeck_control::serve;
use flagdeck_core::EnvironmentConfig;
use flagdeck_store::ConfigStore;
use flagdeck_store::MemoryConfigStore;
use flagdeck_store::MemorySharedCache;
use flagdeck_store::SharedCache;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

const API_KEY: &str = "test-admin-key";

struct TestServer {
    base: String,
    client: reqwest::Client,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    async fn start() -> Self {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        let cache: Arc<dyn SharedCache> = Arc::new(MemorySharedCache::new());
        let bus: Arc<dyn ConfigBus> = Arc::new(BroadcastBus::new());
        let publisher = Publisher::new(
            Arc::clone(&store),
            cache,
            Arc::clone(&bus),
            None,
            Duration::from_secs(3600),
        );
        let state = Arc::new(ControlState {
            publisher,
            store,
            bus,
            verifier: Arc::new(StaticVerifier::new([API_KEY.to_string()]))
                as Arc<dyn TokenVerifier>,
            heartbeat: Duration::from_secs(1),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            let _ = serve(state, listener, shutdown_rx).await;
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn put_flag(&self, env: &str, flag_key: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/v1/envs/{env}/flags/{flag_key}")))
            .bearer_auth(API_KEY)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn boolean_flag_body() -> Value {
    json!({
        "key": "ff.home.banner",
        "flag_type": "boolean",
        "variations": [
            {"key": "on", "value": true},
            {"key": "off", "value": false}
        ],
        "default_variation": "off",
        "rules": [],
        "status": "active",
        "version": 0
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn health_needs_no_credential() {
    let server = TestServer::start().await;
    let response = server.client.get(server.url("/healthz")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn config_read_requires_a_credential() {
    let server = TestServer::start().await;
    let response = server.client.get(server.url("/v1/configs/prod")).send().await.unwrap();
    assert_eq!(response.status(), 401);

    let response = server
        .client
        .get(server.url("/v1/configs/prod"))
        .bearer_auth("wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn publish_then_fetch_round_trips() {
    let server = TestServer::start().await;

    let response = server.put_flag("prod", "ff.home.banner", boolean_flag_body()).await;
    assert_eq!(response.status(), 200);
    let receipt: Value = response.json().await.unwrap();
    assert_eq!(receipt["version"], json!(1));
    let etag = receipt["etag"].as_str().unwrap().to_string();

    let response = server
        .client
        .get(server.url("/v1/configs/prod"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let header_etag = response.headers().get("etag").unwrap().to_str().unwrap().to_string();
    assert_eq!(header_etag, format!("\"{etag}\""));

    let config: EnvironmentConfig = response.json().await.unwrap();
    assert_eq!(config.version, 1);
    assert_eq!(config.etag, etag);
    assert!(config.flags.contains_key(&"ff.home.banner".into()));
}

#[tokio::test]
async fn conditional_get_returns_not_modified() {
    let server = TestServer::start().await;
    let response = server.put_flag("prod", "ff.home.banner", boolean_flag_body()).await;
    let receipt: Value = response.json().await.unwrap();
    let etag = receipt["etag"].as_str().unwrap();

    let response = server
        .client
        .get(server.url("/v1/configs/prod"))
        .bearer_auth(API_KEY)
        .header("if-none-match", format!("\"{etag}\""))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 304);

    let response = server
        .client
        .get(server.url("/v1/configs/prod"))
        .bearer_auth(API_KEY)
        .header("if-none-match", "\"stale-etag\"")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn unknown_env_is_not_found() {
    let server = TestServer::start().await;
    let response = server
        .client
        .get(server.url("/v1/configs/ghost"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], json!("env_not_found"));
}

#[tokio::test]
async fn bad_rule_publish_is_rejected_as_invalid_rule() {
    let server = TestServer::start().await;
    let mut body = boolean_flag_body();
    body["rules"] = json!([
        {
            "condition": {"attribute": "email", "operator": "regex", "value": "(unclosed"},
            "action": {"variation": "on"}
        }
    ]);
    let response = server.put_flag("prod", "ff.home.banner", body).await;
    assert_eq!(response.status(), 400);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["code"], json!("invalid_rule"));

    // The failed publish must not have created the environment.
    let response = server
        .client
        .get(server.url("/v1/configs/prod"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn delete_env_then_fetch_is_not_found() {
    let server = TestServer::start().await;
    server.put_flag("prod", "ff.home.banner", boolean_flag_body()).await;

    let response = server
        .client
        .delete(server.url("/v1/envs/prod"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = server
        .client
        .get(server.url("/v1/configs/prod"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = server
        .client
        .delete(server.url("/v1/envs/prod"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn republishing_identical_content_moves_the_version_and_etag() {
    let server = TestServer::start().await;
    let first: Value =
        server.put_flag("prod", "ff.home.banner", boolean_flag_body()).await.json().await.unwrap();
    let second: Value =
        server.put_flag("prod", "ff.home.banner", boolean_flag_body()).await.json().await.unwrap();
    assert_eq!(second["version"], json!(2));
    // The version participates in the etag payload, so the etag moves too.
    assert_ne!(first["etag"], second["etag"]);
}
