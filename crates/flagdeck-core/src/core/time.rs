// crates/flagdeck-core/src/core/time.rs
// ============================================================================
// Module: Flagdeck Time Model
// Description: Canonical timestamp representation for configs and events.
// Purpose: Provide a single RFC 3339 wire form for every timestamp field.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Every timestamp in Flagdeck (config `updated_at`, event `timestamp`)
//! serializes as an RFC 3339 string. [`Timestamp`] wraps
//! [`time::OffsetDateTime`] so arithmetic and window checks stay in one
//! place; services stamp events at the ingest boundary rather than trusting
//! client clocks beyond the tolerated skew.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp with an RFC 3339 wire form.
///
/// # Invariants
/// - Always carries an explicit UTC offset on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Wraps an explicit [`OffsetDateTime`].
    #[must_use]
    pub const fn new(inner: OffsetDateTime) -> Self {
        Self(inner)
    }

    /// Builds a timestamp from unix milliseconds.
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .ok()
            .map(Self)
    }

    /// Returns the timestamp as unix milliseconds, saturating at the i64 range.
    #[must_use]
    pub fn unix_millis(self) -> i64 {
        let millis = self.0.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis).unwrap_or(i64::MAX)
    }

    /// Returns the signed duration `self - other`.
    #[must_use]
    pub fn since(self, other: Self) -> Duration {
        self.0 - other.0
    }

    /// Returns the timestamp shifted by `delta`.
    #[must_use]
    pub fn offset_by(self, delta: Duration) -> Self {
        Self(self.0 + delta)
    }

    /// Returns the inner [`OffsetDateTime`].
    #[must_use]
    pub const fn inner(self) -> OffsetDateTime {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => write!(f, "{}", self.0.unix_timestamp()),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
