// crates/flagdeck-bus/src/lib.rs
// ============================================================================
// Module: Flagdeck Bus Library
// Description: Config update messages and the publish/subscribe seam.
// Purpose: Decouple the control plane from edge transports.
// Dependencies: flagdeck-core, serde, tokio, tracing
// ============================================================================

//! ## Overview
//! `flagdeck-bus` defines the `config.updates` message shape and the
//! [`ConfigBus`] trait the control plane publishes through. The bundled
//! [`BroadcastBus`] is the in-process implementation used by tests and
//! single-process deployments; broker-backed deployments implement the
//! same trait against their transport.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bus;
pub mod message;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::bus::BroadcastBus;
pub use crate::bus::BusError;
pub use crate::bus::BusSubscription;
pub use crate::bus::ConfigBus;
pub use crate::message::CONFIG_UPDATES_SUBJECT;
pub use crate::message::UpdateKind;
pub use crate::message::UpdateMessage;
