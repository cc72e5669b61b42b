// crates/flagdeck-core/src/core/flag/tests.rs
// ============================================================================
// Module: Authoring Model Tests
// Description: Unit tests for the author-facing rule JSON shapes.
// Purpose: Validate wire forms of conditions, actions, and flags.
// Dependencies: flagdeck-core
// ============================================================================

//! ## Overview
//! Validates that the untagged condition and action enums deserialize the
//! documented authoring JSON unambiguously.

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

use super::Condition;
use super::Flag;
use super::FlagStatus;
use super::FlagType;
use super::RuleAction;

// ============================================================================
// SECTION: Condition Wire Tests
// ============================================================================

#[test]
fn predicate_condition_deserializes() {
    let cond: Condition = serde_json::from_value(json!({
        "attribute": "country",
        "operator": "eq",
        "value": "US"
    }))
    .unwrap();
    let Condition::Pred(pred) = cond else {
        panic!("expected predicate condition");
    };
    assert_eq!(pred.attribute, "country");
    assert_eq!(pred.operator, "eq");
}

#[test]
fn composite_conditions_deserialize() {
    let cond: Condition = serde_json::from_value(json!({
        "and": [
            {"attribute": "country", "operator": "eq", "value": "US"},
            {"or": []}
        ]
    }))
    .unwrap();
    let Condition::All {
        and,
    } = cond
    else {
        panic!("expected conjunction");
    };
    assert_eq!(and.len(), 2);
    assert!(matches!(&and[1], Condition::Any { or } if or.is_empty()));
}

#[test]
fn segment_reference_deserializes() {
    let cond: Condition = serde_json::from_value(json!({"segment": "beta-users"})).unwrap();
    assert!(matches!(cond, Condition::Segment { segment } if segment.as_str() == "beta-users"));
}

// ============================================================================
// SECTION: Action Wire Tests
// ============================================================================

#[test]
fn direct_variation_action_deserializes() {
    let action: RuleAction = serde_json::from_value(json!({"variation": "treatment"})).unwrap();
    assert!(matches!(action, RuleAction::Variation { variation } if variation.as_str() == "treatment"));
}

#[test]
fn rollout_action_deserializes() {
    let action: RuleAction = serde_json::from_value(json!({
        "rollout": [
            {"variation_key": "control", "weight": 50.0},
            {"variation_key": "treatment", "weight": 50.0}
        ]
    }))
    .unwrap();
    let RuleAction::Rollout {
        rollout,
    } = action
    else {
        panic!("expected rollout action");
    };
    assert_eq!(rollout.len(), 2);
    assert_eq!(rollout[0].variation_key.as_str(), "control");
}

// ============================================================================
// SECTION: Flag Wire Tests
// ============================================================================

#[test]
fn flag_round_trips_through_json() {
    let flag: Flag = serde_json::from_value(json!({
        "key": "ff.home.banner",
        "flag_type": "boolean",
        "variations": [
            {"key": "on", "value": true},
            {"key": "off", "value": false}
        ],
        "default_variation": "off",
        "rules": [
            {
                "condition": {"attribute": "plan", "operator": "eq", "value": "premium"},
                "action": {"variation": "on"}
            }
        ],
        "status": "active",
        "version": 3
    }))
    .unwrap();
    assert_eq!(flag.flag_type, FlagType::Boolean);
    assert_eq!(flag.status, FlagStatus::Active);
    assert_eq!(flag.rules.len(), 1);

    let json = serde_json::to_value(&flag).unwrap();
    let back: Flag = serde_json::from_value(json).unwrap();
    assert_eq!(back, flag);
}

#[test]
fn rules_default_to_empty() {
    let flag: Flag = serde_json::from_value(json!({
        "key": "ff.x",
        "flag_type": "string",
        "variations": [{"key": "a", "value": "A"}],
        "default_variation": "a",
        "status": "archived",
        "version": 1
    }))
    .unwrap();
    assert!(flag.rules.is_empty());
}
