// crates/flagdeck-ingest/src/lib.rs
// ============================================================================
// Module: Flagdeck Ingest Library
// Description: High-throughput event ingestion with buffered flushes.
// Purpose: Validate, batch, and persist exposure and metric events.
// Dependencies: axum, flagdeck-core, tokio, uuid
// ============================================================================

//! ## Overview
//! `flagdeck-ingest` is the write path of the platform: bounded batch
//! admission, per-event validation with index-scoped errors, dual
//! in-memory buffers flushed by size and by time, a sink contract toward
//! the columnar analytics store, and an optional bounded retry queue for
//! failed batches. Shutdown closes admission before draining so nothing
//! is silently accepted into a dying process.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod buffer;
pub mod retry;
pub mod service;
pub mod store;
pub mod validate;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::buffer::EventBuffers;
pub use crate::retry::PendingBatch;
pub use crate::retry::RetryQueue;
pub use crate::retry::spawn_retry_worker;
pub use crate::service::AppError;
pub use crate::service::IngestResponse;
pub use crate::service::IngestState;
pub use crate::service::MAX_BATCH_EVENTS;
pub use crate::service::drain;
pub use crate::service::flush_exposures;
pub use crate::service::flush_metrics;
pub use crate::service::router;
pub use crate::service::serve;
pub use crate::service::spawn_flusher;
pub use crate::store::ColumnarError;
pub use crate::store::ColumnarStore;
pub use crate::store::MemoryColumnarStore;
pub use crate::validate::ValidatedBatch;
pub use crate::validate::validate_exposures;
pub use crate::validate::validate_metrics;
