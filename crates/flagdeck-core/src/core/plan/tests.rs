// crates/flagdeck-core/src/core/plan/tests.rs
// ============================================================================
// Module: Compiled Plan Tests
// Description: Unit tests for compiled artifacts and the config document.
// Purpose: Validate etag determinism, signature scope, and round trips.
// Dependencies: flagdeck-core
// ============================================================================

//! ## Overview
//! Validates the environment-config invariants: identical payloads produce
//! identical etags, content changes move the etag, and compiled plans
//! survive a serialize/deserialize round trip by equality (including
//! pre-compiled regex patterns).

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

use std::collections::BTreeMap;

use serde_json::json;

use super::CompiledAction;
use super::CompiledCondition;
use super::CompiledPattern;
use super::CompiledPlan;
use super::CompiledPredicate;
use super::CompiledRule;
use super::EnvironmentConfig;
use super::Operator;
use super::RolloutRange;
use crate::core::flag::FlagStatus;
use crate::core::flag::FlagType;
use crate::core::identifiers::FlagKey;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::VariationKey;
use crate::core::time::Timestamp;
use crate::hashing::ConfigSigner;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn sample_plan() -> CompiledPlan {
    let mut variations = BTreeMap::new();
    variations.insert(VariationKey::new("control"), json!(false));
    variations.insert(VariationKey::new("treatment"), json!(true));
    CompiledPlan {
        flag_key: FlagKey::new("ff.home.banner"),
        flag_type: FlagType::Boolean,
        variations,
        rules: vec![CompiledRule {
            id: RuleId::new("rule-0"),
            condition: CompiledCondition::All {
                children: vec![CompiledCondition::Pred(CompiledPredicate {
                    attribute: "email".to_string(),
                    operator: Operator::Regex,
                    value: json!("@example\\.com$"),
                    pattern: Some(CompiledPattern::compile("@example\\.com$").unwrap()),
                })],
            },
            action: CompiledAction::Rollout {
                ranges: vec![
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
                ],
            },
            uses_segment: false,
        }],
        default_variation: VariationKey::new("control"),
        status: FlagStatus::Active,
        version: 4,
    }
}

fn sample_config(version: u64, signer: Option<&ConfigSigner>) -> EnvironmentConfig {
    let mut flags = BTreeMap::new();
    flags.insert(FlagKey::new("ff.home.banner"), sample_plan());
    EnvironmentConfig::build(
        "prod".into(),
        version,
        "7f3a".to_string(),
        flags,
        BTreeMap::new(),
        Timestamp::from_unix_millis(1_700_000_000_000).unwrap(),
        signer,
    )
    .unwrap()
}

// ============================================================================
// SECTION: Etag Tests
// ============================================================================

#[test]
fn identical_payloads_produce_identical_etags() {
    let a = sample_config(7, None);
    let b = sample_config(7, None);
    assert_eq!(a.etag, b.etag);
}

#[test]
fn updated_at_does_not_enter_the_etag() {
    let base = sample_config(7, None);
    let mut flags = BTreeMap::new();
    flags.insert(FlagKey::new("ff.home.banner"), sample_plan());
    let later = EnvironmentConfig::build(
        "prod".into(),
        7,
        "7f3a".to_string(),
        flags,
        BTreeMap::new(),
        Timestamp::from_unix_millis(1_800_000_000_000).unwrap(),
        None,
    )
    .unwrap();
    assert_eq!(base.etag, later.etag);
}

#[test]
fn version_change_moves_the_etag() {
    let a = sample_config(7, None);
    let b = sample_config(8, None);
    assert_ne!(a.etag, b.etag);
}

#[test]
fn etag_is_lowercase_hex_sha256() {
    let config = sample_config(1, None);
    assert_eq!(config.etag.len(), 64);
    assert!(config.etag.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
}

// ============================================================================
// SECTION: Signature Tests
// ============================================================================

#[test]
fn signature_verifies_with_the_issuing_key() {
    let signer = ConfigSigner::new(b"deploy-secret".to_vec());
    let config = sample_config(3, Some(&signer));
    assert!(config.signature.is_some());
    assert!(config.verify_signature(&signer).unwrap());
}

#[test]
fn signature_fails_with_a_different_key() {
    let signer = ConfigSigner::new(b"deploy-secret".to_vec());
    let other = ConfigSigner::new(b"other-secret".to_vec());
    let config = sample_config(3, Some(&signer));
    assert!(!config.verify_signature(&other).unwrap());
}

#[test]
fn unsigned_config_never_verifies() {
    let signer = ConfigSigner::new(b"deploy-secret".to_vec());
    let config = sample_config(3, None);
    assert!(!config.verify_signature(&signer).unwrap());
}

// ============================================================================
// SECTION: Round-Trip Tests
// ============================================================================

#[test]
fn plan_round_trips_by_equality() {
    let plan = sample_plan();
    let json = serde_json::to_string(&plan).unwrap();
    let back: CompiledPlan = serde_json::from_str(&json).unwrap();
    assert_eq!(back, plan);
}

#[test]
fn config_round_trips_by_equality() {
    let config = sample_config(9, Some(&ConfigSigner::new(b"k".to_vec())));
    let json = serde_json::to_string(&config).unwrap();
    let back: EnvironmentConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn invalid_pattern_fails_deserialization() {
    let result = serde_json::from_value::<CompiledPattern>(json!("(unclosed"));
    assert!(result.is_err());
}

// ============================================================================
// SECTION: Range Tests
// ============================================================================

#[test]
fn rollout_range_is_half_open() {
    let range = RolloutRange {
        variation_key: VariationKey::new("control"),
        start_bucket: 0,
        end_bucket: 5_000,
    };
    assert!(range.covers(0));
    assert!(range.covers(4_999));
    assert!(!range.covers(5_000));
}

#[test]
fn operator_names_round_trip() {
    for name in [
        "eq", "neq", "in", "nin", "lt", "lte", "gt", "gte", "contains", "regex", "semver_lt",
        "semver_gt",
    ] {
        let op = Operator::from_name(name).unwrap();
        assert_eq!(op.as_str(), name);
    }
    assert!(Operator::from_name("between").is_none());
}
