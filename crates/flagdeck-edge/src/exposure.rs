// crates/flagdeck-edge/src/exposure.rs
// ============================================================================
// Module: Exposure Emission
// Description: Fire-and-forget exposure queue with a background forwarder.
// Purpose: Record every evaluation without ever blocking the request path.
// Dependencies: async-trait, flagdeck-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! Every successful evaluation enqueues exactly one exposure event. The
//! queue is bounded with a drop-on-full policy: under overload the
//! evaluation path sheds exposures instead of blocking, and the dropped
//! count is an operational metric. A background forwarder drains the
//! queue in batches and delivers them to the ingest service with its own
//! deadline; it runs on the process-wide context, so a client disconnect
//! never cancels an in-flight delivery.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use flagdeck_core::ExposureEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum events delivered in one forwarder batch.
const FORWARD_BATCH_SIZE: usize = 100;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Errors produced by exposure delivery.
///
/// # Invariants
/// - Delivery failures never propagate to the evaluation path.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The ingest service rejected or never received the batch.
    #[error("exposure delivery failed: {0}")]
    Delivery(String),
}

/// Delivery target for exposure batches.
#[async_trait]
pub trait ExposureSink: Send + Sync {
    /// Delivers one batch of exposure events.
    ///
    /// # Errors
    /// Returns [`SinkError`] when the batch could not be delivered.
    async fn deliver(&self, events: Vec<ExposureEvent>) -> Result<(), SinkError>;
}

/// HTTP sink posting batches to the ingest service.
///
/// # Invariants
/// - Requests carry a bounded timeout so a hung ingest cannot pin the
///   forwarder.
#[derive(Debug, Clone)]
pub struct HttpExposureSink {
    /// Shared HTTP client.
    client: reqwest::Client,
    /// Full URL of the exposure batch endpoint.
    endpoint: Url,
    /// Bearer credential presented on delivery.
    api_key: Option<String>,
}

impl HttpExposureSink {
    /// Creates a sink against an ingest base URL.
    ///
    /// # Errors
    /// Returns [`SinkError::Delivery`] when the endpoint URL or client
    /// cannot be constructed.
    pub fn new(
        ingest_base: &Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let endpoint = ingest_base
            .join("v1/events/exposure")
            .map_err(|err| SinkError::Delivery(err.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SinkError::Delivery(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

/// Wire body for the exposure batch endpoint.
#[derive(serde::Serialize)]
struct ExposureBatchBody {
    /// Events in this batch.
    events: Vec<ExposureEvent>,
}

#[async_trait]
impl ExposureSink for HttpExposureSink {
    async fn deliver(&self, events: Vec<ExposureEvent>) -> Result<(), SinkError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&ExposureBatchBody {
            events,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response =
            request.send().await.map_err(|err| SinkError::Delivery(err.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SinkError::Delivery(format!("ingest answered {}", response.status())))
        }
    }
}

// ============================================================================
// SECTION: Emitter
// ============================================================================

/// Request-path handle onto the bounded exposure queue.
///
/// # Invariants
/// - `emit` never blocks; a full queue drops the event and counts it.
#[derive(Debug, Clone)]
pub struct ExposureEmitter {
    /// Bounded queue toward the forwarder.
    sender: mpsc::Sender<ExposureEvent>,
    /// Exposures dropped because the queue was full.
    dropped: Arc<AtomicU64>,
}

impl ExposureEmitter {
    /// Creates an emitter and the receiver its forwarder drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ExposureEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Enqueues one exposure, dropping on a full queue.
    pub fn emit(&self, event: ExposureEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.sender.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                env_key = %event.env_key,
                flag_key = %event.flag_key,
                "exposure queue full; dropping event"
            );
        }
    }

    /// Returns the dropped-exposures counter.
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ============================================================================
// SECTION: Forwarder
// ============================================================================

/// Spawns the background forwarder draining the exposure queue.
///
/// The forwarder batches up to [`FORWARD_BATCH_SIZE`] queued events per
/// delivery and applies `deadline` to each delivery independently. On
/// shutdown it drains whatever is already queued before exiting.
pub fn spawn_forwarder(
    mut receiver: mpsc::Receiver<ExposureEvent>,
    sink: Arc<dyn ExposureSink>,
    mut shutdown: watch::Receiver<bool>,
    deadline: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let first = tokio::select! {
                _ = shutdown.wait_for(|stopped| *stopped) => break,
                event = receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let mut batch = vec![first];
            while batch.len() < FORWARD_BATCH_SIZE {
                match receiver.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(_) => break,
                }
            }
            deliver_batch(&*sink, batch, deadline).await;
        }
        // Drain anything still queued so a clean shutdown loses nothing.
        loop {
            let mut batch = Vec::new();
            while batch.len() < FORWARD_BATCH_SIZE {
                match receiver.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(_) => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            deliver_batch(&*sink, batch, deadline).await;
        }
    })
}

/// Delivers one batch under its deadline, logging failures.
async fn deliver_batch(sink: &dyn ExposureSink, batch: Vec<ExposureEvent>, deadline: Duration) {
    let size = batch.len();
    match tokio::time::timeout(deadline, sink.deliver(batch)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(batch_size = size, error = %err, "exposure delivery failed");
        }
        Err(_) => {
            tracing::warn!(batch_size = size, "exposure delivery timed out");
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
