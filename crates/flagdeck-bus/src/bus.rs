// crates/flagdeck-bus/src/bus.rs
// ============================================================================
// Module: Config Bus
// Description: Publish/subscribe seam for config update notifications.
// Purpose: Let the control plane fan updates out to edges without binding
//          the core to one transport.
// Dependencies: crate::message, tokio, tracing
// ============================================================================

//! ## Overview
//! [`ConfigBus`] is the transport seam between the control plane and edge
//! distributors. The in-process [`BroadcastBus`] fans messages out over
//! bounded per-subscriber channels with a drop-on-full policy: a slow
//! subscriber loses notifications rather than stalling the publisher, and
//! the edge poll loop compensates for anything missed. Deployments with a
//! real message broker implement the same trait against it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::UpdateMessage;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by bus operations.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus has been shut down and no longer accepts publishes.
    #[error("bus is closed")]
    Closed,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Publish/subscribe transport for config update messages.
pub trait ConfigBus: Send + Sync {
    /// Publishes a message to every current subscriber.
    ///
    /// # Errors
    /// Returns [`BusError::Closed`] when the bus no longer accepts
    /// publishes.
    fn publish(&self, message: UpdateMessage) -> Result<(), BusError>;

    /// Registers a new subscription.
    fn subscribe(&self) -> BusSubscription;
}

/// Receiving end of one bus subscription.
///
/// # Invariants
/// - Messages may be dropped under back-pressure; subscribers must not
///   rely on the bus for completeness.
#[derive(Debug)]
pub struct BusSubscription {
    /// Bounded channel carrying messages for this subscriber.
    receiver: mpsc::Receiver<UpdateMessage>,
}

impl BusSubscription {
    /// Receives the next message, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<UpdateMessage> {
        self.receiver.recv().await
    }

    /// Unwraps the underlying channel for stream adapters.
    #[must_use]
    pub fn into_receiver(self) -> mpsc::Receiver<UpdateMessage> {
        self.receiver
    }
}

// ============================================================================
// SECTION: Broadcast Bus
// ============================================================================

/// Per-subscriber channel capacity before drop-on-full engages.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// In-process fan-out bus over bounded channels.
///
/// # Invariants
/// - Publishing never blocks; full subscriber channels drop the message
///   and increment the dropped counter.
#[derive(Debug, Default)]
pub struct BroadcastBus {
    /// Live subscriber senders; closed senders are pruned on publish.
    subscribers: Mutex<Vec<mpsc::Sender<UpdateMessage>>>,
    /// Messages dropped because a subscriber channel was full.
    dropped: AtomicU64,
}

impl BroadcastBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of messages dropped under back-pressure.
    #[must_use]
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the current subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }
}

impl ConfigBus for BroadcastBus {
    fn publish(&self, message: UpdateMessage) -> Result<(), BusError> {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return Err(BusError::Closed);
        };
        subscribers.retain(|sender| !sender.is_closed());
        for sender in subscribers.iter() {
            match sender.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        env_key = %message.env_key,
                        version = message.version,
                        "dropping config update for slow subscriber"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> BusSubscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(sender);
        }
        BusSubscription {
            receiver,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
