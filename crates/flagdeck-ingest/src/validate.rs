// crates/flagdeck-ingest/src/validate.rs
// ============================================================================
// Module: Event Validation
// Description: Per-event validation for exposure and metric batches.
// Purpose: Reject malformed events individually without failing batches.
// Dependencies: flagdeck-core, time, uuid
// ============================================================================

//! ## Overview
//! Validation is per event and index-scoped: valid events proceed while
//! invalid ones are reported as `{field, message}` pairs keyed by their
//! batch position. Absent timestamps are stamped with ingest time; clock
//! skew up to five minutes into the future is tolerated silently, beyond
//! that (or more than a day in the past) the event is rejected. Absent
//! `event_id`s are generated here so the columnar store can dedupe.

// ============================================================================
// SECTION: Imports
// ============================================================================

use flagdeck_core::ExposureEvent;
use flagdeck_core::FieldError;
use flagdeck_core::MetricEvent;
use flagdeck_core::Timestamp;
use flagdeck_core::validate_key;
use time::Duration;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tolerated clock skew into the future.
const MAX_FUTURE_SKEW: Duration = Duration::minutes(5);

/// Oldest accepted event age.
const MAX_PAST_AGE: Duration = Duration::hours(24);

/// Metric value magnitude bound.
const MAX_METRIC_MAGNITUDE: f64 = 1e15;

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of validating one batch.
///
/// # Invariants
/// - `errors` index into the original batch, not the accepted subset.
#[derive(Debug)]
pub struct ValidatedBatch<T> {
    /// Events that passed validation, stamped and id-assigned.
    pub accepted: Vec<T>,
    /// Index-scoped rejection reasons.
    pub errors: Vec<FieldError>,
}

impl<T> ValidatedBatch<T> {
    /// Returns the accepted count.
    #[must_use]
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    /// Returns the rejected count.
    #[must_use]
    pub fn rejected_count(&self) -> usize {
        self.errors.len()
    }
}

// ============================================================================
// SECTION: Exposure Validation
// ============================================================================

/// Validates an exposure batch against ingest time `now`.
#[must_use]
pub fn validate_exposures(
    events: Vec<ExposureEvent>,
    now: Timestamp,
) -> ValidatedBatch<ExposureEvent> {
    let mut accepted = Vec::with_capacity(events.len());
    let mut errors = Vec::new();
    for (index, mut event) in events.into_iter().enumerate() {
        let reject = |field: &str, message: String, errors: &mut Vec<FieldError>| {
            errors.push(FieldError {
                field: format!("events[{index}].{field}"),
                message,
            });
        };

        if let Err(err) = validate_key(event.env_key.as_str()) {
            reject("env_key", err.to_string(), &mut errors);
            continue;
        }
        if let Err(err) = validate_key(event.flag_key.as_str()) {
            reject("flag_key", err.to_string(), &mut errors);
            continue;
        }
        if let Err(err) = validate_key(event.variation_key.as_str()) {
            reject("variation_key", err.to_string(), &mut errors);
            continue;
        }
        if event.user_key_hash.is_empty() {
            reject("user_key_hash", "user_key_hash is required".to_string(), &mut errors);
            continue;
        }
        match check_timestamp(event.timestamp, now) {
            Ok(stamped) => event.timestamp = Some(stamped),
            Err(message) => {
                reject("timestamp", message, &mut errors);
                continue;
            }
        }
        if event.event_id.is_none() {
            event.event_id = Some(Uuid::new_v4());
        }
        accepted.push(event);
    }
    ValidatedBatch {
        accepted,
        errors,
    }
}

// ============================================================================
// SECTION: Metric Validation
// ============================================================================

/// Validates a metric batch against ingest time `now`.
#[must_use]
pub fn validate_metrics(events: Vec<MetricEvent>, now: Timestamp) -> ValidatedBatch<MetricEvent> {
    let mut accepted = Vec::with_capacity(events.len());
    let mut errors = Vec::new();
    for (index, mut event) in events.into_iter().enumerate() {
        let reject = |field: &str, message: String, errors: &mut Vec<FieldError>| {
            errors.push(FieldError {
                field: format!("events[{index}].{field}"),
                message,
            });
        };

        if let Err(err) = validate_key(event.env_key.as_str()) {
            reject("env_key", err.to_string(), &mut errors);
            continue;
        }
        if let Err(err) = validate_key(event.metric_key.as_str()) {
            reject("metric_key", err.to_string(), &mut errors);
            continue;
        }
        if event.user_key_hash.is_empty() {
            reject("user_key_hash", "user_key_hash is required".to_string(), &mut errors);
            continue;
        }
        if !event.value.is_finite() || event.value.abs() > MAX_METRIC_MAGNITUDE {
            reject(
                "value",
                format!("value must be finite and within ±{MAX_METRIC_MAGNITUDE:e}"),
                &mut errors,
            );
            continue;
        }
        match check_timestamp(event.timestamp, now) {
            Ok(stamped) => event.timestamp = Some(stamped),
            Err(message) => {
                reject("timestamp", message, &mut errors);
                continue;
            }
        }
        if event.event_id.is_none() {
            event.event_id = Some(Uuid::new_v4());
        }
        accepted.push(event);
    }
    ValidatedBatch {
        accepted,
        errors,
    }
}

// ============================================================================
// SECTION: Timestamp Window
// ============================================================================

/// Stamps absent timestamps and enforces the acceptance window.
fn check_timestamp(timestamp: Option<Timestamp>, now: Timestamp) -> Result<Timestamp, String> {
    let Some(timestamp) = timestamp else {
        return Ok(now);
    };
    let delta = timestamp.since(now);
    if delta > MAX_FUTURE_SKEW {
        return Err(format!("timestamp is {delta} in the future (max {MAX_FUTURE_SKEW})"));
    }
    if -delta > MAX_PAST_AGE {
        return Err(format!("timestamp is {delta} in the past (max {MAX_PAST_AGE})"));
    }
    Ok(timestamp)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
