// crates/flagdeck-core/src/error.rs
// ============================================================================
// Module: Flagdeck API Error Kinds
// Description: Closed error set shared by every service surface.
// Purpose: Keep error codes and status mapping identical across services.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The platform exposes one closed set of error kinds. Each service maps
//! [`ApiError`] to its transport; the code strings and status pairing here
//! are the contract clients program against. Evaluation-path rules apply:
//! per-flag faults degrade to defaults and never surface as
//! `internal_error`; only whole-request failures reach this type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Per-Event Errors
// ============================================================================

/// Validation failure scoped to one event in a batch.
///
/// # Invariants
/// - `field` uses the `events[i].name` path form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path of the offending field.
    pub field: String,
    /// Human-readable failure description.
    pub message: String,
}

// ============================================================================
// SECTION: API Errors
// ============================================================================

/// Closed error set for the platform's service surfaces.
///
/// # Invariants
/// - Codes and status pairings are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request shape or content was invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Environment is unknown at this service.
    #[error("environment not found")]
    EnvNotFound,
    /// Flag is unknown within the environment.
    #[error("flag not found")]
    FlagNotFound,
    /// Credential was missing or unverifiable.
    #[error("unauthenticated")]
    Unauthenticated,
    /// Credential was valid but out of scope.
    #[error("forbidden")]
    Forbidden,
    /// Batch exceeded the admission cap.
    #[error("batch exceeds {limit} events")]
    BatchTooLarge {
        /// Maximum admissible batch size.
        limit: usize,
    },
    /// Per-event validation rejected every event.
    #[error("validation failed for all events")]
    ValidationFailed(Vec<FieldError>),
    /// Rule compilation rejected the publish.
    #[error("invalid rule {rule_id}: {reason}")]
    InvalidRule {
        /// Failure description from the compiler.
        reason: String,
        /// Rule identifier the failure is scoped to.
        rule_id: String,
    },
    /// A required upstream dependency was unreachable.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// The operation exceeded its deadline.
    #[error("timeout")]
    Timeout,
    /// The service is shutting down and rejecting new work.
    #[error("service stopping")]
    ServiceStopping,
    /// Unclassified internal fault; details stay in the logs.
    #[error("internal error")]
    InternalError,
}

impl ApiError {
    /// Returns the stable error code string.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::EnvNotFound => "env_not_found",
            Self::FlagNotFound => "flag_not_found",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::BatchTooLarge {
                ..
            } => "batch_too_large",
            Self::ValidationFailed(_) => "validation_failed",
            Self::InvalidRule {
                ..
            } => "invalid_rule",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Timeout => "timeout",
            Self::ServiceStopping => "service_stopping",
            Self::InternalError => "internal_error",
        }
    }

    /// Returns the HTTP status code this error maps to.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_)
            | Self::ValidationFailed(_)
            | Self::InvalidRule {
                ..
            } => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::EnvNotFound | Self::FlagNotFound => 404,
            Self::BatchTooLarge {
                ..
            } => 413,
            Self::UpstreamUnavailable(_) => 502,
            Self::Timeout => 504,
            Self::ServiceStopping => 503,
            Self::InternalError => 500,
        }
    }
}

// ============================================================================
// SECTION: Wire Form
// ============================================================================

/// Error body serialized on the wire.
///
/// # Invariants
/// - `code` matches [`ApiError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Per-event errors for validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl From<&ApiError> for ErrorBody {
    fn from(error: &ApiError) -> Self {
        let errors = match error {
            ApiError::ValidationFailed(errors) => Some(errors.clone()),
            _ => None,
        };
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            errors,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
