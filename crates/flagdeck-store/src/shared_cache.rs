// crates/flagdeck-store/src/shared_cache.rs
// ============================================================================
// Module: Shared Warm Cache
// Description: TTL-bounded warm tier between control plane and edges.
// Purpose: Absorb read load on local misses without becoming authoritative.
// Dependencies: flagdeck-core
// ============================================================================

//! ## Overview
//! The shared cache is strictly an optimization: edges consult it on a
//! local miss before falling through to the control plane, and the control
//! plane refreshes it on every publish with a bounded TTL. Nothing in the
//! system ever treats a cache hit as authoritative; a stale or missing
//! entry only costs one extra hop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Warm-tier cache for compiled config documents.
pub trait SharedCache: Send + Sync {
    /// Returns a cached document if present and unexpired.
    fn get(&self, env_key: &EnvKey) -> Option<EnvironmentConfig>;

    /// Stores a document with a TTL.
    fn put(&self, config: EnvironmentConfig, ttl: Duration);

    /// Drops a cached document.
    fn invalidate(&self, env_key: &EnvKey);
}

// ============================================================================
// SECTION: Memory Cache
// ============================================================================

/// In-process TTL cache used by tests and single-host deployments.
///
/// # Invariants
/// - Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemorySharedCache {
    /// Entries with their expiry instants.
    entries: Mutex<HashMap<EnvKey, (EnvironmentConfig, Instant)>>,
}

impl MemorySharedCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live (possibly expired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns true when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SharedCache for MemorySharedCache {
    fn get(&self, env_key: &EnvKey) -> Option<EnvironmentConfig> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(env_key) {
            Some((config, expires_at)) if *expires_at > Instant::now() => Some(config.clone()),
            Some(_) => {
                entries.remove(env_key);
                None
            }
            None => None,
        }
    }

    fn put(&self, config: EnvironmentConfig, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            let expires_at = Instant::now() + ttl;
            entries.insert(config.env_key.clone(), (config, expires_at));
        }
    }

    fn invalidate(&self, env_key: &EnvKey) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(env_key);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
