// crates/flagdeck-ingest/src/buffer.rs
// ============================================================================
// Module: Event Buffers
// Description: Mutex-guarded exposure and metric buffers with flush moves.
// Purpose: Batch accepted events between admission and store writes.
// Dependencies: flagdeck-core
// ============================================================================

//! ## Overview
//! Two independent buffers batch accepted events between the admission
//! path and the columnar store. Locks are held only around appends and
//! the take-for-flush move, never across I/O. Appending reports when the
//! flush threshold was crossed so the caller can trigger an asynchronous
//! flush; a periodic flusher drains both buffers regardless.
//!
//! Data-loss semantics: buffered events live in memory only. Without the
//! optional retry queue, events in flight at a process crash, and batches
//! whose store write fails, are lost.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use flagdeck_core::ExposureEvent;
use flagdeck_core::MetricEvent;

// ============================================================================
// SECTION: Buffers
// ============================================================================

/// Paired in-memory buffers for the two event kinds.
///
/// # Invariants
/// - Locks are held only for appends and moves, never across I/O.
#[derive(Debug)]
pub struct EventBuffers {
    /// Buffered exposure events.
    exposures: Mutex<Vec<ExposureEvent>>,
    /// Buffered metric events.
    metrics: Mutex<Vec<MetricEvent>>,
    /// Buffer size that triggers an early flush.
    flush_threshold: usize,
    /// Initial capacity for each buffer.
    capacity: usize,
}

impl EventBuffers {
    /// Creates buffers with a capacity and early-flush threshold.
    #[must_use]
    pub fn new(capacity: usize, flush_threshold: usize) -> Self {
        Self {
            exposures: Mutex::new(Vec::with_capacity(capacity)),
            metrics: Mutex::new(Vec::with_capacity(capacity)),
            flush_threshold,
            capacity,
        }
    }

    /// Appends accepted exposures; returns true when a flush is due.
    pub fn append_exposures(&self, events: Vec<ExposureEvent>) -> bool {
        let Ok(mut buffer) = self.exposures.lock() else {
            return false;
        };
        buffer.extend(events);
        buffer.len() >= self.flush_threshold
    }

    /// Appends accepted metrics; returns true when a flush is due.
    pub fn append_metrics(&self, events: Vec<MetricEvent>) -> bool {
        let Ok(mut buffer) = self.metrics.lock() else {
            return false;
        };
        buffer.extend(events);
        buffer.len() >= self.flush_threshold
    }

    /// Moves the exposure buffer out for a flush, resetting it.
    #[must_use]
    pub fn take_exposures(&self) -> Vec<ExposureEvent> {
        self.exposures
            .lock()
            .map(|mut buffer| std::mem::replace(&mut *buffer, Vec::with_capacity(self.capacity)))
            .unwrap_or_default()
    }

    /// Moves the metric buffer out for a flush, resetting it.
    #[must_use]
    pub fn take_metrics(&self) -> Vec<MetricEvent> {
        self.metrics
            .lock()
            .map(|mut buffer| std::mem::replace(&mut *buffer, Vec::with_capacity(self.capacity)))
            .unwrap_or_default()
    }

    /// Returns the current exposure buffer depth.
    #[must_use]
    pub fn exposure_depth(&self) -> usize {
        self.exposures.lock().map(|buffer| buffer.len()).unwrap_or(0)
    }

    /// Returns the current metric buffer depth.
    #[must_use]
    pub fn metric_depth(&self) -> usize {
        self.metrics.lock().map(|buffer| buffer.len()).unwrap_or(0)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
