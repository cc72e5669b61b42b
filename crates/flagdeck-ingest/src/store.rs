// crates/flagdeck-ingest/src/store.rs
// ============================================================================
// Module: Columnar Store Sink
// Description: Batch-write contract toward the analytics store.
// Purpose: Keep the ingest core independent of the analytics backend.
// Dependencies: async-trait, flagdeck-core
// ============================================================================

//! ## Overview
//! The ingest service owns all writes to the columnar analytics store,
//! but only through this sink contract: one batch per call, deduplication
//! on `event_id` is the store's concern, and ordering is the store's sort
//! key (`env_key`, flag or metric key, timestamp), not the arrival order.
//! The in-memory implementation backs tests and demos and mirrors the
//! dedupe contract so assertions match production behavior.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use flagdeck_core::ExposureEvent;
use flagdeck_core::MetricEvent;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by columnar store writes.
///
/// # Invariants
/// - A failed write loses the batch unless the retry queue is enabled.
#[derive(Debug, Error)]
pub enum ColumnarError {
    /// The store was unreachable or rejected the batch.
    #[error("columnar store write failed: {0}")]
    Write(String),
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Batch sink toward the analytics store.
#[async_trait]
pub trait ColumnarStore: Send + Sync {
    /// Writes one exposure batch.
    ///
    /// # Errors
    /// Returns [`ColumnarError`] when the write failed as a whole.
    async fn write_exposures(&self, events: Vec<ExposureEvent>) -> Result<(), ColumnarError>;

    /// Writes one metric batch.
    ///
    /// # Errors
    /// Returns [`ColumnarError`] when the write failed as a whole.
    async fn write_metrics(&self, events: Vec<MetricEvent>) -> Result<(), ColumnarError>;
}

// ============================================================================
// SECTION: Memory Store
// ============================================================================

/// In-memory columnar store for tests and demos.
///
/// # Invariants
/// - Duplicate `event_id`s are silently dropped, mirroring the real
///   store's dedupe contract.
#[derive(Debug, Default)]
pub struct MemoryColumnarStore {
    /// Stored exposure events.
    exposures: Mutex<Vec<ExposureEvent>>,
    /// Stored metric events.
    metrics: Mutex<Vec<MetricEvent>>,
    /// Seen event identifiers for dedupe.
    seen: Mutex<HashSet<Uuid>>,
}

impl MemoryColumnarStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of stored exposures.
    #[must_use]
    pub fn exposures(&self) -> Vec<ExposureEvent> {
        self.exposures.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns a snapshot of stored metrics.
    #[must_use]
    pub fn metrics(&self) -> Vec<MetricEvent> {
        self.metrics.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Records an id, returning false for duplicates.
    fn admit(&self, event_id: Option<Uuid>) -> bool {
        let Some(event_id) = event_id else {
            return true;
        };
        self.seen.lock().map(|mut seen| seen.insert(event_id)).unwrap_or(true)
    }
}

#[async_trait]
impl ColumnarStore for MemoryColumnarStore {
    async fn write_exposures(&self, events: Vec<ExposureEvent>) -> Result<(), ColumnarError> {
        let mut stored = self
            .exposures
            .lock()
            .map_err(|_| ColumnarError::Write("lock poisoned".to_string()))?;
        for event in events {
            if self.admit(event.event_id) {
                stored.push(event);
            }
        }
        Ok(())
    }

    async fn write_metrics(&self, events: Vec<MetricEvent>) -> Result<(), ColumnarError> {
        let mut stored = self
            .metrics
            .lock()
            .map_err(|_| ColumnarError::Write("lock poisoned".to_string()))?;
        for event in events {
            if self.admit(event.event_id) {
                stored.push(event);
            }
        }
        Ok(())
    }
}
