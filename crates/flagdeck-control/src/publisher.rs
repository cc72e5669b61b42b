// crates/flagdeck-control/src/publisher.rs
// ============================================================================
// Module: Config Publisher
// Description: Validate → compile → store → cache → notify pipeline.
// Purpose: Make every admin mutation an atomic, versioned publish.
// Dependencies: flagdeck-core, flagdeck-store, flagdeck-bus, rand
// ============================================================================

//! ## Overview
//! Every flag or segment mutation flows through one pipeline: validate the
//! keys, apply the mutation to the authoring sources, compile the whole
//! environment, write the record under optimistic concurrency, refresh the
//! shared cache, and publish a `config.updates` notification. Compilation
//! failure aborts before any write, so the live config is untouched by a
//! bad rule. Version conflicts retry from a fresh read; the store's
//! version column serializes concurrent publishers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use flagdeck_bus::BusError;
use flagdeck_bus::ConfigBus;
use flagdeck_bus::UpdateMessage;
use flagdeck_core::CompileError;
use flagdeck_core::ConfigSigner;
use flagdeck_core::EnvKey;
use flagdeck_core::Flag;
use flagdeck_core::FlagKey;
use flagdeck_core::KeyError;
use flagdeck_core::Segment;
use flagdeck_core::SegmentKey;
use flagdeck_core::Timestamp;
use flagdeck_core::compile_environment;
use flagdeck_core::validate_key;
use flagdeck_store::ConfigStore;
use flagdeck_store::EnvRecord;
use flagdeck_store::SharedCache;
use flagdeck_store::StoreError;
use rand::Rng;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attempts before a contended publish gives up.
const MAX_PUBLISH_ATTEMPTS: u32 = 3;

/// Salt length in bytes (128 bits rendered as hex).
const SALT_BYTES: usize = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by the publish pipeline.
///
/// # Invariants
/// - `Compile` failures abort before any write.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A key failed the shared grammar.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),
    /// Rule compilation rejected the mutation.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The authoritative store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The notification bus rejected the publish.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// Optimistic retries were exhausted under contention.
    #[error("publish contention on `{0}` exhausted retries")]
    Contention(EnvKey),
}

// ============================================================================
// SECTION: Receipt
// ============================================================================

/// Result of a successful publish.
///
/// # Invariants
/// - `etag` matches the stored config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Environment that was published.
    pub env_key: EnvKey,
    /// Version the publish produced.
    pub version: u64,
    /// Etag of the published document.
    pub etag: String,
}

// ============================================================================
// SECTION: Publisher
// ============================================================================

/// Publish pipeline shared by the control-plane handlers.
///
/// # Invariants
/// - The salt of an environment is generated once at creation and never
///   rotated by this pipeline.
pub struct Publisher {
    /// Authoritative record store.
    store: Arc<dyn ConfigStore>,
    /// Warm cache refreshed on publish.
    cache: Arc<dyn SharedCache>,
    /// Notification bus.
    bus: Arc<dyn ConfigBus>,
    /// Optional config signer.
    signer: Option<ConfigSigner>,
    /// TTL for warm-cache documents.
    cache_ttl: Duration,
}

impl Publisher {
    /// Creates a publisher over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConfigStore>,
        cache: Arc<dyn SharedCache>,
        bus: Arc<dyn ConfigBus>,
        signer: Option<ConfigSigner>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            signer,
            cache_ttl,
        }
    }

    /// Creates or replaces a flag and publishes the new config version.
    ///
    /// The flag's version is managed by the pipeline: an existing flag's
    /// version is incremented, a new flag starts at 1.
    ///
    /// # Errors
    /// Returns [`PublishError`] when validation, compilation, storage, or
    /// notification fails.
    pub fn upsert_flag(
        &self,
        env_key: &EnvKey,
        flag_key: &FlagKey,
        mut flag: Flag,
    ) -> Result<PublishReceipt, PublishError> {
        validate_key(env_key.as_str())?;
        validate_key(flag_key.as_str())?;
        flag.key = flag_key.clone();
        self.publish_mutation(env_key, move |flags, _segments| {
            let mut updated = flag.clone();
            updated.version = flags.get(&updated.key).map_or(1, |existing| existing.version + 1);
            flags.insert(updated.key.clone(), updated);
        })
    }

    /// Creates or replaces a segment and publishes the new config version.
    ///
    /// # Errors
    /// Returns [`PublishError`] when validation, compilation, storage, or
    /// notification fails.
    pub fn upsert_segment(
        &self,
        env_key: &EnvKey,
        segment_key: &SegmentKey,
        mut segment: Segment,
    ) -> Result<PublishReceipt, PublishError> {
        validate_key(env_key.as_str())?;
        validate_key(segment_key.as_str())?;
        segment.key = segment_key.clone();
        self.publish_mutation(env_key, move |_flags, segments| {
            let mut updated = segment.clone();
            updated.version =
                segments.get(&updated.key).map_or(1, |existing| existing.version + 1);
            segments.insert(updated.key.clone(), updated);
        })
    }

    /// Removes an environment and notifies edges to invalidate.
    ///
    /// Returns false when the environment did not exist.
    ///
    /// # Errors
    /// Returns [`PublishError`] when storage or notification fails.
    pub fn remove_env(&self, env_key: &EnvKey) -> Result<bool, PublishError> {
        let last_version = self.store.load(env_key)?.map(|record| record.version);
        if !self.store.remove(env_key)? {
            return Ok(false);
        }
        self.cache.invalidate(env_key);
        self.bus.publish(UpdateMessage::invalidate(
            env_key.clone(),
            last_version.unwrap_or_default(),
            Timestamp::now(),
        ))?;
        tracing::info!(env_key = %env_key, "environment invalidated");
        Ok(true)
    }

    /// Applies a mutation to the authoring sources and publishes it.
    ///
    /// Retries from a fresh read when a concurrent writer advanced the
    /// version.
    fn publish_mutation(
        &self,
        env_key: &EnvKey,
        mutate: impl Fn(&mut BTreeMap<FlagKey, Flag>, &mut BTreeMap<SegmentKey, Segment>),
    ) -> Result<PublishReceipt, PublishError> {
        for _attempt in 0 .. MAX_PUBLISH_ATTEMPTS {
            let existing = self.store.load(env_key)?;
            let (salt, read_version, mut flags, mut segments) = match &existing {
                Some(record) => (
                    record.salt.clone(),
                    Some(record.version),
                    record.flags.clone(),
                    record.segments.clone(),
                ),
                None => (generate_salt(), None, BTreeMap::new(), BTreeMap::new()),
            };
            mutate(&mut flags, &mut segments);

            let next_version = read_version.map_or(1, |version| version + 1);
            let config = compile_environment(
                env_key,
                next_version,
                &salt,
                &flags,
                &segments,
                Timestamp::now(),
                self.signer.as_ref(),
            )?;
            let record = EnvRecord {
                env_key: env_key.clone(),
                salt,
                version: next_version,
                flags,
                segments,
                config: config.clone(),
            };

            let write = match read_version {
                Some(version) => self.store.update(&record, version),
                None => self.store.insert(&record),
            };
            match write {
                Ok(()) => {
                    self.cache.put(config.clone(), self.cache_ttl);
                    self.bus
                        .publish(UpdateMessage::full_refresh(config.clone(), Timestamp::now()))?;
                    tracing::info!(
                        env_key = %env_key,
                        version = next_version,
                        etag = %config.etag,
                        "config published"
                    );
                    return Ok(PublishReceipt {
                        env_key: env_key.clone(),
                        version: next_version,
                        etag: config.etag,
                    });
                }
                Err(StoreError::VersionConflict {
                    ..
                } | StoreError::AlreadyExists(_)) => {
                    tracing::debug!(env_key = %env_key, "publish conflict, retrying from read");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(PublishError::Contention(env_key.clone()))
    }
}

/// Generates a fresh 128-bit salt rendered as lowercase hex.
fn generate_salt() -> String {
    let bytes: [u8; SALT_BYTES] = rand::thread_rng().r#gen();
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
