// crates/flagdeck-control/src/lib.rs
// ============================================================================
// Module: Flagdeck Control Library
// Description: Control-plane service: publish pipeline and config API.
// Purpose: Own all writes to flags, segments, and environment configs.
// Dependencies: axum, flagdeck-bus, flagdeck-core, flagdeck-store, tokio
// ============================================================================

//! ## Overview
//! `flagdeck-control` is the authoritative side of the platform. Admin
//! mutations run through the [`Publisher`] pipeline (validate → compile →
//! store → cache → notify); edges pull through the conditional-GET config
//! API or subscribe to the SSE stream. Credentials are consumed through
//! the [`TokenVerifier`] seam and never interpreted here.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api;
pub mod publisher;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use flagdeck_core::AllowAll;
pub use flagdeck_core::StaticVerifier;
pub use flagdeck_core::TokenKind;
pub use flagdeck_core::TokenVerifier;
pub use flagdeck_core::Verification;

pub use crate::api::AppError;
pub use crate::api::ControlState;
pub use crate::api::ReceiptBody;
pub use crate::api::StreamEvent;
pub use crate::api::router;
pub use crate::api::serve;
pub use crate::publisher::PublishError;
pub use crate::publisher::PublishReceipt;
pub use crate::publisher::Publisher;
