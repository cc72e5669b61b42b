// crates/flagdeck-core/src/bucketer/tests.rs
// ============================================================================
// Module: Bucketer Tests
// Description: Unit tests for deterministic bucketing and range assignment.
// Purpose: Pin the hash recipe and the sticky-assignment guarantees.
// Dependencies: flagdeck-core
// ============================================================================

//! ## Overview
//! Pins the bucketing recipe against a hand-computed golden value, checks
//! totality and cross-flag independence, and exercises range assignment at
//! the partition boundaries.

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

use sha2::Digest;
use sha2::Sha256;

use super::TOTAL_BUCKETS;
use super::assign_from_ranges;
use super::bucket_user;
use crate::core::identifiers::FlagKey;
use crate::core::identifiers::VariationKey;
use crate::core::plan::RolloutRange;

// ============================================================================
// SECTION: Recipe Tests
// ============================================================================

#[test]
fn bucket_matches_the_published_recipe() {
    // Recompute SHA-256("7f3a" + "ff.home.banner" + "u-42") by hand and
    // reduce the first four bytes big-endian modulo 10000.
    let digest = Sha256::digest(b"7f3aff.home.banneru-42");
    let expected_bucket =
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % TOTAL_BUCKETS;

    let bucketing = bucket_user("7f3a", &FlagKey::new("ff.home.banner"), "u-42");
    assert_eq!(bucketing.bucket, expected_bucket);
    assert_eq!(bucketing.bucketing_id, hex::encode(digest));
}

#[test]
fn bucketing_is_deterministic() {
    let flag = FlagKey::new("ff.home.banner");
    let first = bucket_user("7f3a", &flag, "u-42");
    for _ in 0 .. 10 {
        assert_eq!(bucket_user("7f3a", &flag, "u-42"), first);
    }
}

#[test]
fn bucket_is_always_in_range() {
    let flag = FlagKey::new("ff.range");
    for i in 0 .. 5_000 {
        let bucketing = bucket_user("salt", &flag, &format!("user-{i}"));
        assert!(bucketing.bucket < TOTAL_BUCKETS);
    }
}

#[test]
fn salt_flag_and_user_all_enter_the_hash() {
    let flag_a = FlagKey::new("flag-a");
    let flag_b = FlagKey::new("flag-b");
    let base = bucket_user("salt-1", &flag_a, "u-1");
    assert_ne!(bucket_user("salt-2", &flag_a, "u-1").bucketing_id, base.bucketing_id);
    assert_ne!(bucket_user("salt-1", &flag_b, "u-1").bucketing_id, base.bucketing_id);
    assert_ne!(bucket_user("salt-1", &flag_a, "u-2").bucketing_id, base.bucketing_id);
}

#[test]
fn buckets_are_independent_across_flags() {
    // The same user population bucketed under two flags should not land in
    // identical buckets; correlation here would break experiment isolation.
    let flag_a = FlagKey::new("flag-a");
    let flag_b = FlagKey::new("flag-b");
    let mut identical = 0_u32;
    let total = 2_000_u32;
    for i in 0 .. total {
        let user = format!("user-{i}");
        if bucket_user("salt", &flag_a, &user).bucket == bucket_user("salt", &flag_b, &user).bucket
        {
            identical += 1;
        }
    }
    // Expected collision rate is 1/10000; allow generous slack.
    assert!(identical < 10, "excessive cross-flag correlation: {identical}/{total}");
}

// ============================================================================
// SECTION: Uniformity
// ============================================================================

#[test]
#[ignore = "statistical check over one million keys; run explicitly"]
fn buckets_are_uniform_within_four_sigma() {
    let flag = FlagKey::new("ff.uniform");
    let samples = 1_000_000_u64;
    let mut counts = vec![0_u64; usize::try_from(TOTAL_BUCKETS).unwrap()];
    for i in 0 .. samples {
        let bucketing = bucket_user("uniform-salt", &flag, &format!("user-{i}"));
        counts[usize::try_from(bucketing.bucket).unwrap()] += 1;
    }

    let expected = samples as f64 / f64::from(TOTAL_BUCKETS);
    let sigma = (expected * (1.0 - 1.0 / f64::from(TOTAL_BUCKETS))).sqrt();
    let limit = 4.0 * sigma;
    for (bucket, &count) in counts.iter().enumerate() {
        let deviation = (count as f64 - expected).abs();
        assert!(
            deviation <= limit,
            "bucket {bucket} count {count} deviates more than 4 sigma from {expected}"
        );
    }
}

// ============================================================================
// SECTION: Assignment Tests
// ============================================================================

fn ranges() -> Vec<RolloutRange> {
    vec![
        RolloutRange {
            variation_key: VariationKey::new("control"),
            start_bucket: 0,
            end_bucket: 5_000,
        },
        RolloutRange {
            variation_key: VariationKey::new("treatment"),
            start_bucket: 5_000,
            end_bucket: 10_000,
        },
    ]
}

#[test]
fn assignment_respects_range_boundaries() {
    let ranges = ranges();
    assert_eq!(assign_from_ranges(&ranges, 0).unwrap().as_str(), "control");
    assert_eq!(assign_from_ranges(&ranges, 4_999).unwrap().as_str(), "control");
    assert_eq!(assign_from_ranges(&ranges, 5_000).unwrap().as_str(), "treatment");
    assert_eq!(assign_from_ranges(&ranges, 9_999).unwrap().as_str(), "treatment");
}

#[test]
fn assignment_fails_closed_on_malformed_ranges() {
    assert!(assign_from_ranges(&[], 42).is_none());
}
