// crates/flagdeck-distributor/src/bootstrap.rs
// ============================================================================
// Module: Bootstrap Config Loading
// Description: Offline fallback documents loaded from a local file.
// Purpose: Keep evaluation answering when the control plane is gone.
// Dependencies: flagdeck-core, serde_json
// ============================================================================

//! ## Overview
//! A bootstrap file pins one or more `EnvironmentConfig` documents to
//! disk. The distributor falls back to them when no live config exists,
//! and an explicit offline toggle forces their use for tests and
//! incidents. The file holds either a single document or an array of
//! documents; loading is strict and fail-closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum bootstrap file size accepted.
const MAX_BOOTSTRAP_BYTES: u64 = 8 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while loading a bootstrap file.
///
/// # Invariants
/// - Loading is all-or-nothing; a malformed file yields no documents.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The file could not be read.
    #[error("bootstrap file unreadable: {0}")]
    Io(String),
    /// The file exceeded the size limit.
    #[error("bootstrap file exceeds size limit ({actual} > {limit} bytes)")]
    TooLarge {
        /// Configured limit in bytes.
        limit: u64,
        /// Observed size in bytes.
        actual: u64,
    },
    /// The file was not valid config JSON.
    #[error("bootstrap file malformed: {0}")]
    Malformed(String),
    /// Two documents claimed the same environment.
    #[error("bootstrap file has duplicate env `{0}`")]
    DuplicateEnv(EnvKey),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads bootstrap documents keyed by environment.
///
/// # Errors
/// Returns [`BootstrapError`] when the file is unreadable, oversized,
/// malformed, or holds duplicate environments.
pub fn load_bootstrap(
    path: &Path,
) -> Result<HashMap<EnvKey, Arc<EnvironmentConfig>>, BootstrapError> {
    let metadata = std::fs::metadata(path).map_err(|err| BootstrapError::Io(err.to_string()))?;
    if metadata.len() > MAX_BOOTSTRAP_BYTES {
        return Err(BootstrapError::TooLarge {
            limit: MAX_BOOTSTRAP_BYTES,
            actual: metadata.len(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|err| BootstrapError::Io(err.to_string()))?;

    let documents: Vec<EnvironmentConfig> = if raw.trim_start().starts_with('[') {
        serde_json::from_str(&raw).map_err(|err| BootstrapError::Malformed(err.to_string()))?
    } else {
        let single: EnvironmentConfig = serde_json::from_str(&raw)
            .map_err(|err| BootstrapError::Malformed(err.to_string()))?;
        vec![single]
    };

    let mut map = HashMap::with_capacity(documents.len());
    for document in documents {
        let env_key = document.env_key.clone();
        if map.insert(env_key.clone(), Arc::new(document)).is_some() {
            return Err(BootstrapError::DuplicateEnv(env_key));
        }
    }
    Ok(map)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
