// crates/flagdeck-sdk/src/lib.rs
// ============================================================================
// Module: Flagdeck SDK Runtime
// Description: Client-side flag evaluation with bootstrap and refresh.
// Purpose: Evaluate flags locally, symmetric to the edge distributor.
// Dependencies: flagdeck-core, flagdeck-distributor, tokio, url
// ============================================================================

//! ## Overview
//! The SDK runtime embeds the same distribution machinery the edge runs:
//! a background conditional-GET refresh loop, a bootstrap file for
//! offline starts, and an explicit offline toggle. Evaluation happens in
//! process against the resolved config, and every evaluation hands one
//! exposure event to the application-supplied callback, which owns
//! delivery (typically batching toward the event API).

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::client::ClientError;
pub use crate::client::FlagClient;
pub use crate::client::FlagClientBuilder;
pub use crate::client::FlagDetail;
