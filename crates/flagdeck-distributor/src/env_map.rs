// crates/flagdeck-distributor/src/env_map.rs
// ============================================================================
// Module: Edge Env Config Map
// Description: RW-locked env_key → config map with monotonic installs.
// Purpose: Give evaluations a lock-cheap, torn-read-free config view.
// Dependencies: flagdeck-core
// ============================================================================

//! ## Overview
//! The env map is the edge's single piece of process-wide mutable state.
//! Configs are immutable once installed; an update swaps the `Arc` under a
//! write lock, and readers hold the lock only long enough to clone the
//! `Arc`. Installs are monotonic per environment: once version V is
//! visible, no reader ever observes an older version, which is the
//! edge-local consistency guarantee the platform promises.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;

// ============================================================================
// SECTION: Env Map
// ============================================================================

/// Process-wide map of installed environment configs.
///
/// # Invariants
/// - Installed configs are immutable; updates replace the `Arc`.
/// - Per-env versions never decrease while the entry is live.
#[derive(Debug, Default)]
pub struct EnvConfigMap {
    /// Installed configs keyed by environment.
    entries: RwLock<HashMap<EnvKey, Arc<EnvironmentConfig>>>,
}

impl EnvConfigMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the installed config for an environment.
    #[must_use]
    pub fn get(&self, env_key: &EnvKey) -> Option<Arc<EnvironmentConfig>> {
        let entries = self.entries.read().ok()?;
        entries.get(env_key).cloned()
    }

    /// Returns the installed version for an environment.
    #[must_use]
    pub fn version(&self, env_key: &EnvKey) -> Option<u64> {
        self.get(env_key).map(|config| config.version)
    }

    /// Installs a config, refusing to go backwards in version.
    ///
    /// Returns true when the config was installed, false when a newer or
    /// equal version was already live.
    pub fn install(&self, config: EnvironmentConfig) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        match entries.get(&config.env_key) {
            Some(existing) if existing.version >= config.version => false,
            _ => {
                entries.insert(config.env_key.clone(), Arc::new(config));
                true
            }
        }
    }

    /// Removes an environment's config.
    ///
    /// Returns true when an entry was removed.
    pub fn invalidate(&self, env_key: &EnvKey) -> bool {
        self.entries.write().map(|mut entries| entries.remove(env_key).is_some()).unwrap_or(false)
    }

    /// Lists environments currently held by this edge.
    #[must_use]
    pub fn envs(&self) -> Vec<EnvKey> {
        self.entries.read().map(|entries| entries.keys().cloned().collect()).unwrap_or_default()
    }

    /// Returns the installed etag for an environment.
    #[must_use]
    pub fn etag(&self, env_key: &EnvKey) -> Option<String> {
        self.get(env_key).map(|config| config.etag.clone())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
