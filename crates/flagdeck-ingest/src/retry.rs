// crates/flagdeck-ingest/src/retry.rs
// ============================================================================
// Module: Retry Queue
// Description: Optional bounded queue for failed store batches.
// Purpose: Trade memory for durability when the columnar store flaps.
// Dependencies: crate::store, flagdeck-core, tokio
// ============================================================================

//! ## Overview
//! The core contract drops a batch when its store write fails. This
//! optional queue keeps failed batches in bounded memory and drains them
//! from a dedicated worker: a recovered store catches up without client
//! retries. The bound is strict; when the queue is full the oldest batch
//! is discarded and counted, so a long outage degrades to the core's
//! drop semantics instead of exhausting memory. The queue is in-memory
//! only and does not survive a process crash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use flagdeck_core::ExposureEvent;
use flagdeck_core::MetricEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::store::ColumnarStore;

// ============================================================================
// SECTION: Pending Batches
// ============================================================================

/// A store batch awaiting redelivery.
#[derive(Debug, Clone)]
pub enum PendingBatch {
    /// Failed exposure batch.
    Exposures(Vec<ExposureEvent>),
    /// Failed metric batch.
    Metrics(Vec<MetricEvent>),
}

impl PendingBatch {
    /// Returns the number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Exposures(events) => events.len(),
            Self::Metrics(events) => events.len(),
        }
    }

    /// Returns true when the batch holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Bounded FIFO of failed batches.
///
/// # Invariants
/// - At most `capacity` batches are held; overflow discards the oldest.
#[derive(Debug)]
pub struct RetryQueue {
    /// Pending batches, oldest first.
    queue: Mutex<VecDeque<PendingBatch>>,
    /// Maximum batches held.
    capacity: usize,
    /// Batches discarded because the queue was full.
    discarded: AtomicU64,
}

impl RetryQueue {
    /// Creates a queue with the given batch capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            discarded: AtomicU64::new(0),
        }
    }

    /// Enqueues a failed batch, discarding the oldest on overflow.
    pub fn push(&self, batch: PendingBatch) {
        if let Ok(mut queue) = self.queue.lock() {
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("retry queue full; discarding oldest batch");
            }
            queue.push_back(batch);
        }
    }

    /// Puts a batch back at the head after a failed redelivery.
    pub fn requeue(&self, batch: PendingBatch) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_front(batch);
        }
    }

    /// Pops the oldest pending batch.
    #[must_use]
    pub fn pop(&self) -> Option<PendingBatch> {
        self.queue.lock().ok().and_then(|mut queue| queue.pop_front())
    }

    /// Returns the number of pending batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Returns true when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of discarded batches.
    #[must_use]
    pub fn discarded_total(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Spacing between redelivery attempts.
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Spawns the worker that drains the retry queue.
pub fn spawn_retry_worker(
    queue: Arc<RetryQueue>,
    store: Arc<dyn ColumnarStore>,
    store_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RETRY_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => break,
                _ = ticker.tick() => {
                    while let Some(batch) = queue.pop() {
                        if !redeliver(&*store, &queue, batch, store_timeout).await {
                            // Store still down; wait for the next tick.
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Attempts one redelivery; requeues and reports false on failure.
async fn redeliver(
    store: &dyn ColumnarStore,
    queue: &RetryQueue,
    batch: PendingBatch,
    store_timeout: Duration,
) -> bool {
    let attempt = batch.clone();
    let result = match attempt {
        PendingBatch::Exposures(events) => {
            tokio::time::timeout(store_timeout, store.write_exposures(events)).await
        }
        PendingBatch::Metrics(events) => {
            tokio::time::timeout(store_timeout, store.write_metrics(events)).await
        }
    };
    match result {
        Ok(Ok(())) => {
            tracing::info!(batch_size = batch.len(), "retried batch delivered");
            true
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "retry delivery failed; requeueing");
            queue.requeue(batch);
            false
        }
        Err(_) => {
            tracing::warn!("retry delivery timed out; requeueing");
            queue.requeue(batch);
            false
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
