// crates/flagdeck-core/src/bucketer.rs
// ============================================================================
// Module: Flagdeck Bucketer
// Description: Deterministic user-to-bucket assignment for rollouts.
// Purpose: Map (salt, flag, user) to a stable bucket and variation range.
// Dependencies: crate::core::{identifiers, plan}, sha2, hex
// ============================================================================

//! ## Overview
//! Bucketing hashes `salt ‖ flag_key ‖ user_key` with SHA-256 and reduces
//! the first four digest bytes (big-endian) modulo 10000. The result is a
//! total function: the same triple yields the same bucket in every process
//! and every implementation, which is what makes assignments sticky while
//! rollout ranges are unchanged. The per-environment salt keeps buckets
//! unrelatable across environments; the flag key keeps them independent
//! across flags.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

use crate::core::identifiers::FlagKey;
use crate::core::identifiers::VariationKey;
use crate::core::plan::RolloutRange;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Size of the bucket space; buckets fall in `[0, TOTAL_BUCKETS)`.
pub const TOTAL_BUCKETS: u32 = 10_000;

// ============================================================================
// SECTION: Bucketing
// ============================================================================

/// Result of bucketing one user for one flag.
///
/// # Invariants
/// - `bucket` is always in `[0, TOTAL_BUCKETS)`.
/// - `bucketing_id` is the lowercase hex of the full digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucketing {
    /// Lowercase hex SHA-256 digest of `salt ‖ flag_key ‖ user_key`.
    pub bucketing_id: String,
    /// Assigned bucket in `[0, TOTAL_BUCKETS)`.
    pub bucket: u32,
}

/// Buckets a user for a flag within an environment.
#[must_use]
pub fn bucket_user(salt: &str, flag_key: &FlagKey, user_key: &str) -> Bucketing {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(flag_key.as_str().as_bytes());
    hasher.update(user_key.as_bytes());
    let digest = hasher.finalize();

    let prefix = [digest[0], digest[1], digest[2], digest[3]];
    let bucket = u32::from_be_bytes(prefix) % TOTAL_BUCKETS;

    Bucketing {
        bucketing_id: hex::encode(digest),
        bucket,
    }
}

/// Picks the variation whose range covers the bucket.
///
/// Returns `None` only for malformed range lists; compiled rollouts always
/// cover the full bucket space.
#[must_use]
pub fn assign_from_ranges(ranges: &[RolloutRange], bucket: u32) -> Option<&VariationKey> {
    ranges.iter().find(|range| range.covers(bucket)).map(|range| &range.variation_key)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
