// crates/flagdeck-ingest/src/buffer/tests.rs
// ============================================================================
// Module: Event Buffer Tests
// Description: Unit tests for append/take buffer mechanics.
// Purpose: Validate threshold signaling and move-out flush semantics.
// Dependencies: flagdeck-ingest
// ============================================================================

//! ## Overview
//! Validates that appends signal the flush threshold, takes move the
//! whole buffer out and reset it, and the two buffers stay independent.

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

use flagdeck_core::EvalReason;
use flagdeck_core::ExposureEvent;
use flagdeck_core::MetricEvent;
use serde_json::Value;

use super::EventBuffers;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn exposure() -> ExposureEvent {
    ExposureEvent {
        event_id: None,
        env_key: "prod".into(),
        flag_key: "ff.banner".into(),
        variation_key: "on".into(),
        user_key_hash: "ab".repeat(32),
        bucketing_id: "cd".repeat(32),
        experiment_key: None,
        session_id: None,
        timestamp: None,
        reason: EvalReason::Rollout,
        rule_id: None,
        default_used: false,
        context: Value::Null,
        meta: Value::Null,
    }
}

fn metric() -> MetricEvent {
    MetricEvent {
        event_id: None,
        env_key: "prod".into(),
        metric_key: "checkout.latency".into(),
        user_key_hash: "ab".repeat(32),
        value: 1.0,
        unit: None,
        timestamp: None,
        context: Value::Null,
        meta: Value::Null,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn append_signals_the_flush_threshold() {
    let buffers = EventBuffers::new(1000, 3);
    assert!(!buffers.append_exposures(vec![exposure(), exposure()]));
    assert!(buffers.append_exposures(vec![exposure()]));
    assert_eq!(buffers.exposure_depth(), 3);
}

#[test]
fn take_moves_everything_and_resets() {
    let buffers = EventBuffers::new(1000, 500);
    buffers.append_exposures(vec![exposure(), exposure()]);
    let taken = buffers.take_exposures();
    assert_eq!(taken.len(), 2);
    assert_eq!(buffers.exposure_depth(), 0);
    assert!(buffers.take_exposures().is_empty());
}

#[test]
fn buffers_are_independent() {
    let buffers = EventBuffers::new(1000, 2);
    assert!(!buffers.append_exposures(vec![exposure()]));
    assert!(buffers.append_metrics(vec![metric(), metric()]));
    assert_eq!(buffers.exposure_depth(), 1);
    assert_eq!(buffers.metric_depth(), 2);

    let _ = buffers.take_metrics();
    assert_eq!(buffers.exposure_depth(), 1, "metric flush must not touch exposures");
}

#[test]
fn threshold_counts_cumulative_depth() {
    let buffers = EventBuffers::new(1000, 4);
    assert!(!buffers.append_metrics(vec![metric(), metric()]));
    assert!(buffers.append_metrics(vec![metric(), metric()]));
}
