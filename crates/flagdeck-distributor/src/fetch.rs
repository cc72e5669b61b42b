// crates/flagdeck-distributor/src/fetch.rs
// ============================================================================
// Module: Config Fetcher
// Description: Conditional-GET client against the control plane.
// Purpose: Pull config documents with etag hints and classified outcomes.
// Dependencies: async-trait, flagdeck-core, reqwest, url
// ============================================================================

//! ## Overview
//! The fetcher is the distributor's only path to the control plane. Every
//! fetch carries the currently installed etag as an `if-none-match` hint
//! and classifies the response into a closed outcome set: the poll loop
//! and the miss path both branch on [`FetchOutcome`], never on raw status
//! codes. Authentication failures are their own outcome because they must
//! keep cached config alive (availability over freshness).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;
use url::Url;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Classified result of one config fetch.
///
/// # Invariants
/// - Variants are stable; callers exhaustively branch on them.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A new document was returned.
    New(Box<EnvironmentConfig>),
    /// The presented etag still matches; nothing to do.
    NotModified,
    /// The environment is unknown upstream.
    NotFound,
    /// The credential was rejected; keep cached config.
    Unauthorized,
    /// The control plane was unreachable or answered malformed data.
    Unavailable(String),
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Pull-side client used by the distributor.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// Fetches the config for an environment with an optional etag hint.
    async fn fetch(&self, env_key: &EnvKey, etag: Option<&str>) -> FetchOutcome;
}

// ============================================================================
// SECTION: HTTP Fetcher
// ============================================================================

/// HTTP fetcher against the control plane's config API.
///
/// # Invariants
/// - Requests carry a bounded timeout; a hung control plane surfaces as
///   [`FetchOutcome::Unavailable`].
#[derive(Debug, Clone)]
pub struct HttpConfigFetcher {
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Control-plane base URL.
    base: Url,
    /// Bearer credential presented on every request.
    api_key: Option<String>,
}

impl HttpConfigFetcher {
    /// Creates a fetcher for a control-plane base URL.
    ///
    /// # Errors
    /// Returns the underlying client build error when TLS or connection
    /// settings are unusable.
    pub fn new(
        base: Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    /// Builds the config URL for an environment.
    fn config_url(&self, env_key: &EnvKey) -> Option<Url> {
        self.base.join(&format!("v1/configs/{env_key}")).ok()
    }
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self, env_key: &EnvKey, etag: Option<&str>) -> FetchOutcome {
        let Some(url) = self.config_url(env_key) else {
            return FetchOutcome::Unavailable("invalid config url".to_string());
        };
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(etag) = etag {
            request = request.header("if-none-match", format!("\"{etag}\""));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return FetchOutcome::Unavailable(err.to_string()),
        };
        match response.status().as_u16() {
            200 => match response.json::<EnvironmentConfig>().await {
                Ok(config) => FetchOutcome::New(Box::new(config)),
                Err(err) => FetchOutcome::Unavailable(format!("malformed config: {err}")),
            },
            304 => FetchOutcome::NotModified,
            404 => FetchOutcome::NotFound,
            401 | 403 => FetchOutcome::Unauthorized,
            status => FetchOutcome::Unavailable(format!("unexpected status {status}")),
        }
    }
}
