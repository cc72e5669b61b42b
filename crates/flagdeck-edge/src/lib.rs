// crates/flagdeck-edge/src/lib.rs
// ============================================================================
// Module: Flagdeck Edge Library
// Description: Edge evaluation service with exposure emission.
// Purpose: Serve evaluation requests from in-memory config within
//          milliseconds.
// Dependencies: axum, flagdeck-core, flagdeck-distributor, tokio
// ============================================================================

//! ## Overview
//! `flagdeck-edge` is the read path of the platform: evaluation requests
//! run against the config the [`flagdeck_distributor::Distributor`]
//! resolved, per-flag faults degrade to defaults, and every evaluation
//! enqueues one exposure event through the bounded fire-and-forget
//! [`ExposureEmitter`]. Offline fallback and the explicit offline toggle
//! are the distributor's concern; this crate only marks the reason.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api;
pub mod exposure;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::api::AppError;
pub use crate::api::EdgeState;
pub use crate::api::EvaluateRequest;
pub use crate::api::EvaluateResponse;
pub use crate::api::FlagResult;
pub use crate::api::SingleEvaluateRequest;
pub use crate::api::router;
pub use crate::api::serve;
pub use crate::exposure::ExposureEmitter;
pub use crate::exposure::ExposureSink;
pub use crate::exposure::HttpExposureSink;
pub use crate::exposure::SinkError;
pub use crate::exposure::spawn_forwarder;
