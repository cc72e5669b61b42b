// crates/flagdeck-store/src/config_store.rs
// ============================================================================
// Module: Authoritative Config Store
// Description: Versioned environment records with optimistic concurrency.
// Purpose: Serialize concurrent publishes through a version column.
// Dependencies: flagdeck-core, serde, thiserror
// ============================================================================

//! ## Overview
//! The control plane owns all writes to environment records. Each record
//! carries the authoring sources (flags and segments) next to the compiled
//! config so a mutation can be recompiled from its sources. Updates are
//! optimistic: the caller states the version it read, and a concurrent
//! writer surfaces as [`StoreError::VersionConflict`], after which the
//! publisher retries from a fresh read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::RwLock;

use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;
use flagdeck_core::Flag;
use flagdeck_core::FlagKey;
use flagdeck_core::Segment;
use flagdeck_core::SegmentKey;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by config store implementations.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record already exists for this environment.
    #[error("environment `{0}` already exists")]
    AlreadyExists(EnvKey),
    /// Record is missing for this environment.
    #[error("environment `{0}` not found")]
    NotFound(EnvKey),
    /// Another writer advanced the version since the caller's read.
    #[error("version conflict on `{env_key}`: expected {expected}, found {actual}")]
    VersionConflict {
        /// Environment the conflict occurred on.
        env_key: EnvKey,
        /// Version the caller read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },
    /// Record failed to serialize or deserialize.
    #[error("record serialization failure: {0}")]
    Serialization(String),
    /// Underlying database failure.
    #[error("database failure: {0}")]
    Database(String),
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Authoritative record for one environment.
///
/// # Invariants
/// - `config.version == version` and `config` was compiled from `flags`
///   and `segments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvRecord {
    /// Environment key.
    pub env_key: EnvKey,
    /// Immutable bucketing salt assigned at creation.
    pub salt: String,
    /// Monotonic config version.
    pub version: u64,
    /// Authoring flag sources.
    pub flags: BTreeMap<FlagKey, Flag>,
    /// Authoring segment sources.
    pub segments: BTreeMap<SegmentKey, Segment>,
    /// Compiled config distributed to edges.
    pub config: EnvironmentConfig,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Authoritative store for environment records.
pub trait ConfigStore: Send + Sync {
    /// Loads the full record for an environment.
    ///
    /// # Errors
    /// Returns [`StoreError`] on storage failures.
    fn load(&self, env_key: &EnvKey) -> Result<Option<EnvRecord>, StoreError>;

    /// Loads only the compiled config for an environment.
    ///
    /// # Errors
    /// Returns [`StoreError`] on storage failures.
    fn load_config(&self, env_key: &EnvKey) -> Result<Option<EnvironmentConfig>, StoreError>;

    /// Inserts a brand-new environment record.
    ///
    /// # Errors
    /// Returns [`StoreError::AlreadyExists`] when the environment is
    /// already present.
    fn insert(&self, record: &EnvRecord) -> Result<(), StoreError>;

    /// Replaces a record, guarded by the version the caller read.
    ///
    /// # Errors
    /// Returns [`StoreError::VersionConflict`] when another writer
    /// advanced the version, or [`StoreError::NotFound`] when the
    /// environment vanished.
    fn update(&self, record: &EnvRecord, expected_version: u64) -> Result<(), StoreError>;

    /// Removes an environment record.
    ///
    /// # Errors
    /// Returns [`StoreError`] on storage failures.
    fn remove(&self, env_key: &EnvKey) -> Result<bool, StoreError>;

    /// Lists all environment keys.
    ///
    /// # Errors
    /// Returns [`StoreError`] on storage failures.
    fn list_envs(&self) -> Result<Vec<EnvKey>, StoreError>;
}

// ============================================================================
// SECTION: Memory Store
// ============================================================================

/// In-memory config store for tests and single-process demos.
///
/// # Invariants
/// - The same optimistic-concurrency contract as the durable store.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    /// Records keyed by environment.
    records: RwLock<HashMap<EnvKey, EnvRecord>>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self, env_key: &EnvKey) -> Result<Option<EnvRecord>, StoreError> {
        let records =
            self.records.read().map_err(|_| StoreError::Database("lock poisoned".into()))?;
        Ok(records.get(env_key).cloned())
    }

    fn load_config(&self, env_key: &EnvKey) -> Result<Option<EnvironmentConfig>, StoreError> {
        Ok(self.load(env_key)?.map(|record| record.config))
    }

    fn insert(&self, record: &EnvRecord) -> Result<(), StoreError> {
        let mut records =
            self.records.write().map_err(|_| StoreError::Database("lock poisoned".into()))?;
        if records.contains_key(&record.env_key) {
            return Err(StoreError::AlreadyExists(record.env_key.clone()));
        }
        records.insert(record.env_key.clone(), record.clone());
        Ok(())
    }

    fn update(&self, record: &EnvRecord, expected_version: u64) -> Result<(), StoreError> {
        let mut records =
            self.records.write().map_err(|_| StoreError::Database("lock poisoned".into()))?;
        let Some(existing) = records.get(&record.env_key) else {
            return Err(StoreError::NotFound(record.env_key.clone()));
        };
        if existing.version != expected_version {
            return Err(StoreError::VersionConflict {
                env_key: record.env_key.clone(),
                expected: expected_version,
                actual: existing.version,
            });
        }
        records.insert(record.env_key.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, env_key: &EnvKey) -> Result<bool, StoreError> {
        let mut records =
            self.records.write().map_err(|_| StoreError::Database("lock poisoned".into()))?;
        Ok(records.remove(env_key).is_some())
    }

    fn list_envs(&self) -> Result<Vec<EnvKey>, StoreError> {
        let records =
            self.records.read().map_err(|_| StoreError::Database("lock poisoned".into()))?;
        let mut keys: Vec<EnvKey> = records.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
