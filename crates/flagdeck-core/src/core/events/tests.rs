// crates/flagdeck-core/src/core/events/tests.rs
// ============================================================================
// Module: Event Model Tests
// Description: Unit tests for exposure and metric event wire forms.
// Purpose: Validate optional-field defaults and reason labels.
// Dependencies: flagdeck-core
// ============================================================================

//! ## Overview
//! Validates that sparse client events deserialize with sane defaults and
//! that the reason taxonomy labels stay stable.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;

use super::EvalReason;
use super::ExposureEvent;
use super::MetricEvent;

// ============================================================================
// SECTION: Reason Tests
// ============================================================================

#[test]
fn reason_labels_are_stable() {
    let cases = [
        (EvalReason::TargetMatch, "target_match"),
        (EvalReason::SegmentMatch, "segment_match"),
        (EvalReason::Rollout, "rollout"),
        (EvalReason::Default, "default"),
        (EvalReason::FlagInactive, "flag_inactive"),
        (EvalReason::EvaluationError, "evaluation_error"),
        (EvalReason::OfflineFallback, "offline_fallback"),
    ];
    for (reason, label) in cases {
        assert_eq!(reason.as_str(), label);
        assert_eq!(serde_json::to_value(reason).unwrap(), json!(label));
    }
}

#[test]
fn default_path_covers_exactly_three_reasons() {
    assert!(EvalReason::Default.is_default_path());
    assert!(EvalReason::FlagInactive.is_default_path());
    assert!(EvalReason::EvaluationError.is_default_path());
    assert!(!EvalReason::TargetMatch.is_default_path());
    assert!(!EvalReason::SegmentMatch.is_default_path());
    assert!(!EvalReason::Rollout.is_default_path());
    assert!(!EvalReason::OfflineFallback.is_default_path());
}

// ============================================================================
// SECTION: Wire Form Tests
// ============================================================================

#[test]
fn sparse_exposure_event_deserializes() {
    let event: ExposureEvent = serde_json::from_value(json!({
        "env_key": "prod",
        "flag_key": "ff.home.banner",
        "variation_key": "treatment",
        "user_key_hash": "ab".repeat(32),
        "bucketing_id": "cd".repeat(32),
        "reason": "rollout"
    }))
    .unwrap();
    assert!(event.event_id.is_none());
    assert!(event.timestamp.is_none());
    assert!(!event.default_used);
    assert!(event.context.is_null());
}

#[test]
fn exposure_event_round_trips() {
    let event: ExposureEvent = serde_json::from_value(json!({
        "event_id": "550e8400-e29b-41d4-a716-446655440000",
        "env_key": "prod",
        "flag_key": "ff.x",
        "variation_key": "on",
        "user_key_hash": "00".repeat(32),
        "bucketing_id": "11".repeat(32),
        "timestamp": "2026-01-01T00:00:00Z",
        "reason": "default",
        "default_used": true,
        "context": {"country": "US"},
        "meta": {"sdk": "rust/0.1"}
    }))
    .unwrap();
    let back: ExposureEvent =
        serde_json::from_value(serde_json::to_value(&event).unwrap()).unwrap();
    assert_eq!(back, event);
}

#[test]
fn sparse_metric_event_deserializes() {
    let event: MetricEvent = serde_json::from_value(json!({
        "env_key": "prod",
        "metric_key": "checkout.latency",
        "user_key_hash": "ef".repeat(32),
        "value": 12.5
    }))
    .unwrap();
    assert!(event.event_id.is_none());
    assert!(event.unit.is_none());
    assert_eq!(event.value, 12.5);
}
