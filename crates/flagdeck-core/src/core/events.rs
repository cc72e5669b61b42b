// crates/flagdeck-core/src/core/events.rs
// ============================================================================
// Module: Flagdeck Event Model
// Description: Exposure and metric events emitted toward the ingest path.
// Purpose: Give analytics a stable, privacy-preserving event wire form.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json, uuid
// ============================================================================

//! ## Overview
//! Exposures record which user received which variation and why; metrics
//! record numeric observations. Both carry `user_key_hash` only; raw user
//! keys never appear on the event path. `event_id` and `timestamp` may be
//! absent on ingest and are stamped by the service; the columnar store
//! dedupes on `event_id`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::core::identifiers::EnvKey;
use crate::core::identifiers::FlagKey;
use crate::core::identifiers::MetricKey;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::VariationKey;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Evaluation Reasons
// ============================================================================

/// Closed reason taxonomy attached to evaluations and exposures.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalReason {
    /// A rule with a direct-variation action matched.
    TargetMatch,
    /// A rule matched through a substituted segment condition.
    SegmentMatch,
    /// A rollout action assigned the variation by bucket.
    Rollout,
    /// No rule matched; the default variation was served.
    Default,
    /// The flag is archived; the default variation was served.
    FlagInactive,
    /// Rule evaluation faulted; the default variation was served.
    EvaluationError,
    /// A bootstrap config answered because no live config was available.
    OfflineFallback,
}

impl EvalReason {
    /// Returns the stable reason label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TargetMatch => "target_match",
            Self::SegmentMatch => "segment_match",
            Self::Rollout => "rollout",
            Self::Default => "default",
            Self::FlagInactive => "flag_inactive",
            Self::EvaluationError => "evaluation_error",
            Self::OfflineFallback => "offline_fallback",
        }
    }

    /// Returns true when the reason means the default variation was served
    /// without a rule match.
    #[must_use]
    pub const fn is_default_path(self) -> bool {
        matches!(self, Self::Default | Self::FlagInactive | Self::EvaluationError)
    }
}

// ============================================================================
// SECTION: Exposure Events
// ============================================================================

/// Record of a user receiving a variation.
///
/// # Invariants
/// - `user_key_hash` is always a hash; raw user keys are never persisted.
/// - `default_used` is true iff `reason` is a default-path reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureEvent {
    /// Event identifier; generated at ingest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    /// Environment key.
    pub env_key: EnvKey,
    /// Flag key.
    pub flag_key: FlagKey,
    /// Variation served.
    pub variation_key: VariationKey,
    /// Hash of the raw user key.
    pub user_key_hash: String,
    /// Bucketing identifier (hex digest entering the bucket computation).
    pub bucketing_id: String,
    /// Optional experiment attribution key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_key: Option<String>,
    /// Optional session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Event timestamp; stamped at ingest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Evaluation reason.
    pub reason: EvalReason,
    /// Rule that produced the assignment, when one matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    /// True when the default variation was served without a rule match.
    #[serde(default)]
    pub default_used: bool,
    /// Evaluation context snapshot.
    #[serde(default)]
    pub context: Value,
    /// Producer metadata.
    #[serde(default)]
    pub meta: Value,
}

// ============================================================================
// SECTION: Metric Events
// ============================================================================

/// Numeric observation attributed to a user.
///
/// # Invariants
/// - `value` must be finite and within `[-1e15, 1e15]`; enforced at ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Event identifier; generated at ingest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    /// Environment key.
    pub env_key: EnvKey,
    /// Metric key.
    pub metric_key: MetricKey,
    /// Hash of the raw user key.
    pub user_key_hash: String,
    /// Observed value.
    pub value: f64,
    /// Optional unit label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Event timestamp; stamped at ingest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Observation context snapshot.
    #[serde(default)]
    pub context: Value,
    /// Producer metadata.
    #[serde(default)]
    pub meta: Value,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
