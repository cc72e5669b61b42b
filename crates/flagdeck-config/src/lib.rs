// crates/flagdeck-config/src/lib.rs
// ============================================================================
// Module: Flagdeck Service Configuration
// Description: Typed settings for the control, edge, and ingest services.
// Purpose: Load `FF_`-prefixed environment variables with strict validation.
// Dependencies: thiserror, url
// ============================================================================

//! ## Overview
//! Every Flagdeck service reads its configuration from environment
//! variables prefixed `FF_`, with nested keys joined by `_`
//! (`FF_EDGE_POLL_SECS`). Loading is strict and fail-closed: malformed
//! values are structured [`ConfigError`]s, never silent fallbacks to a
//! default. Defaults follow the platform contract: ports 8080 (control),
//! 8081 (edge), 8082 (ingest); 30 s poll interval; 5 m cache TTL; 100 ms
//! evaluation timeout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while loading service settings.
///
/// # Invariants
/// - Messages name the offending variable so operators can fix it directly.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Variable was present but failed to parse.
    #[error("config variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// Parse or validation failure description.
        reason: String,
    },
    /// Variable parsed but violated a bound.
    #[error("config variable {key} is out of range: {reason}")]
    OutOfRange {
        /// Environment variable name.
        key: String,
        /// Bound description.
        reason: String,
    },
}

// ============================================================================
// SECTION: Environment Source
// ============================================================================

/// Snapshot of `FF_`-prefixed environment variables.
///
/// # Invariants
/// - Keys are stored verbatim, including the `FF_` prefix.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    /// Variable map keyed by full variable name.
    vars: BTreeMap<String, String>,
}

impl EnvSource {
    /// Captures the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        let vars = std::env::vars().filter(|(key, _)| key.starts_with("FF_")).collect();
        Self {
            vars,
        }
    }

    /// Builds a source from an explicit map (used by tests).
    #[must_use]
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self {
            vars,
        }
    }

    /// Returns the raw value for a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Reads a string with a default.
    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).map_or_else(|| default.to_string(), ToString::to_string)
    }

    /// Reads an optional string, treating the empty string as absent.
    fn optional_string(&self, key: &str) -> Option<String> {
        self.get(key).filter(|value| !value.is_empty()).map(ToString::to_string)
    }

    /// Reads a u64 with a default.
    fn u64_or(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("expected an unsigned integer, got `{raw}`"),
            }),
        }
    }

    /// Reads a TCP port with a default.
    fn port_or(&self, key: &str, default: u16) -> Result<u16, ConfigError> {
        let value = self.u64_or(key, u64::from(default))?;
        let port = u16::try_from(value).map_err(|_| ConfigError::OutOfRange {
            key: key.to_string(),
            reason: format!("port must fit in 16 bits, got {value}"),
        })?;
        if port == 0 {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                reason: "port must be non-zero".to_string(),
            });
        }
        Ok(port)
    }

    /// Reads a duration expressed in seconds with a default.
    fn secs_or(&self, key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
        let secs = self.u64_or(key, default_secs)?;
        if secs == 0 || secs > 86_400 {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                reason: format!("expected 1..=86400 seconds, got {secs}"),
            });
        }
        Ok(Duration::from_secs(secs))
    }

    /// Reads a duration expressed in milliseconds with a default.
    fn millis_or(&self, key: &str, default_millis: u64) -> Result<Duration, ConfigError> {
        let millis = self.u64_or(key, default_millis)?;
        if millis == 0 || millis > 3_600_000 {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                reason: format!("expected 1..=3600000 milliseconds, got {millis}"),
            });
        }
        Ok(Duration::from_millis(millis))
    }

    /// Reads a boolean flag with a default.
    fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                other => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("expected a boolean, got `{other}`"),
                }),
            },
        }
    }

    /// Reads a base URL with a default.
    fn url_or(&self, key: &str, default: &str) -> Result<Url, ConfigError> {
        let raw = self.string_or(key, default);
        Url::parse(&raw).map_err(|err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected a url: {err}"),
        })
    }
}

// ============================================================================
// SECTION: Control Plane Settings
// ============================================================================

/// Settings for the control-plane service.
///
/// # Invariants
/// - `publish_timeout` bounds the full validate-compile-store-publish round
///   trip.
#[derive(Debug, Clone)]
pub struct ControlSettings {
    /// Listen port (`FF_CONTROL_PORT`, default 8080).
    pub port: u16,
    /// SQLite database path (`FF_CONTROL_DB_PATH`, default `flagdeck.db`).
    pub db_path: String,
    /// Shared-cache document TTL (`FF_CONTROL_CACHE_TTL_SECS`, default 300).
    pub cache_ttl: Duration,
    /// Publish round-trip deadline (`FF_CONTROL_PUBLISH_TIMEOUT_SECS`, default 60).
    pub publish_timeout: Duration,
    /// SSE heartbeat interval (`FF_CONTROL_HEARTBEAT_SECS`, default 15).
    pub heartbeat_interval: Duration,
    /// HTTP read/write timeout (`FF_HTTP_TIMEOUT_SECS`, default 15).
    pub http_timeout: Duration,
    /// Comma-separated accepted API keys (`FF_CONTROL_API_KEYS`).
    pub api_keys: Vec<String>,
    /// HMAC config-signing key (`FF_CONTROL_SIGNING_KEY`).
    pub signing_key: Option<String>,
}

impl ControlSettings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource::from_process())
    }

    /// Loads settings from an explicit source.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any variable is malformed.
    pub fn from_source(source: &EnvSource) -> Result<Self, ConfigError> {
        Ok(Self {
            port: source.port_or("FF_CONTROL_PORT", 8080)?,
            db_path: source.string_or("FF_CONTROL_DB_PATH", "flagdeck.db"),
            cache_ttl: source.secs_or("FF_CONTROL_CACHE_TTL_SECS", 300)?,
            publish_timeout: source.secs_or("FF_CONTROL_PUBLISH_TIMEOUT_SECS", 60)?,
            heartbeat_interval: source.secs_or("FF_CONTROL_HEARTBEAT_SECS", 15)?,
            http_timeout: source.secs_or("FF_HTTP_TIMEOUT_SECS", 15)?,
            api_keys: source
                .optional_string("FF_CONTROL_API_KEYS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|key| !key.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            signing_key: source.optional_string("FF_CONTROL_SIGNING_KEY"),
        })
    }
}

// ============================================================================
// SECTION: Edge Settings
// ============================================================================

/// Settings for the edge evaluation service.
///
/// # Invariants
/// - `eval_timeout` applies only to the miss-then-fetch path; in-memory
///   evaluation has no suspension points.
#[derive(Debug, Clone)]
pub struct EdgeSettings {
    /// Listen port (`FF_EDGE_PORT`, default 8081).
    pub port: u16,
    /// Control-plane base URL (`FF_EDGE_CONTROL_URL`).
    pub control_url: Url,
    /// Ingest base URL for exposure forwarding (`FF_EDGE_INGEST_URL`).
    pub ingest_url: Url,
    /// Poll interval for conditional GETs (`FF_EDGE_POLL_SECS`, default 30).
    pub poll_interval: Duration,
    /// Evaluation soft deadline (`FF_EDGE_EVAL_TIMEOUT_MS`, default 100).
    pub eval_timeout: Duration,
    /// HTTP read/write timeout (`FF_HTTP_TIMEOUT_SECS`, default 15).
    pub http_timeout: Duration,
    /// Exposure queue capacity (`FF_EDGE_EXPOSURE_QUEUE`, default 2048).
    pub exposure_queue: usize,
    /// Bootstrap config file path (`FF_EDGE_BOOTSTRAP_PATH`).
    pub bootstrap_path: Option<String>,
    /// Force bootstrap use even when live config exists (`FF_EDGE_OFFLINE`).
    pub offline: bool,
    /// API key presented to the control plane (`FF_EDGE_API_KEY`).
    pub api_key: Option<String>,
    /// Comma-separated keys accepted from evaluation callers (`FF_EDGE_ACCEPT_KEYS`).
    pub accept_keys: Vec<String>,
}

impl EdgeSettings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource::from_process())
    }

    /// Loads settings from an explicit source.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any variable is malformed.
    pub fn from_source(source: &EnvSource) -> Result<Self, ConfigError> {
        let exposure_queue = source.u64_or("FF_EDGE_EXPOSURE_QUEUE", 2048)?;
        if exposure_queue == 0 || exposure_queue > 1_000_000 {
            return Err(ConfigError::OutOfRange {
                key: "FF_EDGE_EXPOSURE_QUEUE".to_string(),
                reason: format!("expected 1..=1000000, got {exposure_queue}"),
            });
        }
        Ok(Self {
            port: source.port_or("FF_EDGE_PORT", 8081)?,
            control_url: source.url_or("FF_EDGE_CONTROL_URL", "http://127.0.0.1:8080")?,
            ingest_url: source.url_or("FF_EDGE_INGEST_URL", "http://127.0.0.1:8082")?,
            poll_interval: source.secs_or("FF_EDGE_POLL_SECS", 30)?,
            eval_timeout: source.millis_or("FF_EDGE_EVAL_TIMEOUT_MS", 100)?,
            http_timeout: source.secs_or("FF_HTTP_TIMEOUT_SECS", 15)?,
            exposure_queue: usize::try_from(exposure_queue).map_err(|_| {
                ConfigError::OutOfRange {
                    key: "FF_EDGE_EXPOSURE_QUEUE".to_string(),
                    reason: "queue capacity does not fit this platform".to_string(),
                }
            })?,
            bootstrap_path: source.optional_string("FF_EDGE_BOOTSTRAP_PATH"),
            offline: source.bool_or("FF_EDGE_OFFLINE", false)?,
            api_key: source.optional_string("FF_EDGE_API_KEY"),
            accept_keys: source
                .optional_string("FF_EDGE_ACCEPT_KEYS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|key| !key.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

// ============================================================================
// SECTION: Ingest Settings
// ============================================================================

/// Settings for the event ingest service.
///
/// # Invariants
/// - `flush_threshold` never exceeds `buffer_capacity`.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Listen port (`FF_INGEST_PORT`, default 8082).
    pub port: u16,
    /// Periodic flush interval (`FF_INGEST_FLUSH_SECS`, default 5).
    pub flush_interval: Duration,
    /// Buffer size that triggers an early flush (`FF_INGEST_FLUSH_THRESHOLD`, default 500).
    pub flush_threshold: usize,
    /// In-memory buffer capacity (`FF_INGEST_BUFFER_CAPACITY`, default 1000).
    pub buffer_capacity: usize,
    /// Per-batch store write deadline (`FF_INGEST_STORE_TIMEOUT_SECS`, default 30).
    pub store_timeout: Duration,
    /// Shutdown drain bound (`FF_INGEST_DRAIN_SECS`, default 10).
    pub drain_timeout: Duration,
    /// HTTP read/write timeout (`FF_HTTP_TIMEOUT_SECS`, default 15).
    pub http_timeout: Duration,
    /// Enables the bounded retry queue (`FF_INGEST_RETRY_ENABLED`, default false).
    pub retry_enabled: bool,
    /// Retry queue capacity in batches (`FF_INGEST_RETRY_CAPACITY`, default 64).
    pub retry_capacity: usize,
    /// Comma-separated accepted API keys (`FF_INGEST_API_KEYS`).
    pub api_keys: Vec<String>,
}

impl IngestSettings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource::from_process())
    }

    /// Loads settings from an explicit source.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when any variable is malformed or the flush
    /// threshold exceeds the buffer capacity.
    pub fn from_source(source: &EnvSource) -> Result<Self, ConfigError> {
        let flush_threshold = bounded_usize(source, "FF_INGEST_FLUSH_THRESHOLD", 500, 100_000)?;
        let buffer_capacity = bounded_usize(source, "FF_INGEST_BUFFER_CAPACITY", 1000, 100_000)?;
        if flush_threshold > buffer_capacity {
            return Err(ConfigError::OutOfRange {
                key: "FF_INGEST_FLUSH_THRESHOLD".to_string(),
                reason: format!(
                    "flush threshold {flush_threshold} exceeds buffer capacity {buffer_capacity}"
                ),
            });
        }
        Ok(Self {
            port: source.port_or("FF_INGEST_PORT", 8082)?,
            flush_interval: source.secs_or("FF_INGEST_FLUSH_SECS", 5)?,
            flush_threshold,
            buffer_capacity,
            store_timeout: source.secs_or("FF_INGEST_STORE_TIMEOUT_SECS", 30)?,
            drain_timeout: source.secs_or("FF_INGEST_DRAIN_SECS", 10)?,
            http_timeout: source.secs_or("FF_HTTP_TIMEOUT_SECS", 15)?,
            retry_enabled: source.bool_or("FF_INGEST_RETRY_ENABLED", false)?,
            retry_capacity: bounded_usize(source, "FF_INGEST_RETRY_CAPACITY", 64, 10_000)?,
            api_keys: source
                .optional_string("FF_INGEST_API_KEYS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|key| !key.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

/// Reads a bounded positive usize with a default.
fn bounded_usize(
    source: &EnvSource,
    key: &str,
    default: u64,
    max: u64,
) -> Result<usize, ConfigError> {
    let value = source.u64_or(key, default)?;
    if value == 0 || value > max {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            reason: format!("expected 1..={max}, got {value}"),
        });
    }
    usize::try_from(value).map_err(|_| ConfigError::OutOfRange {
        key: key.to_string(),
        reason: "value does not fit this platform".to_string(),
    })
}
