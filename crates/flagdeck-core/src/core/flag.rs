// crates/flagdeck-core/src/core/flag.rs
// ============================================================================
// Module: Flagdeck Authoring Model
// Description: Author-facing flags, rules, conditions, and segments.
// Purpose: Model the rule JSON accepted by the control plane before compilation.
// Dependencies: crate::core::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! The authoring model is the untrusted JSON shape administrators publish.
//! Operators arrive as plain strings and are resolved to the closed operator
//! set during compilation, so an unknown operator is a structured compile
//! error rather than a deserialization failure. Conditions compose with
//! `and`/`or` and may reference named segments, which the compiler
//! substitutes by key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::FlagKey;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::SegmentKey;
use crate::core::identifiers::VariationKey;

// ============================================================================
// SECTION: Flag Attributes
// ============================================================================

/// Value type of a flag.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    /// Boolean on/off flag.
    Boolean,
    /// String-valued flag.
    String,
    /// Numeric flag.
    Number,
    /// Arbitrary JSON payload flag.
    Json,
    /// Multivariate experiment flag.
    Multivariate,
}

/// Lifecycle status of a flag.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    /// Flag is served by evaluators.
    Active,
    /// Flag is retired; evaluators serve the default variation.
    Archived,
}

/// Named outcome of a flag with its typed value.
///
/// # Invariants
/// - `key` is unique within the owning flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    /// Variation key, unique within the flag.
    pub key: VariationKey,
    /// Typed value served to callers.
    pub value: Value,
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Atomic predicate against one attribute.
///
/// # Invariants
/// - `operator` is resolved against the closed operator set at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Attribute name looked up in the evaluation context.
    pub attribute: String,
    /// Operator name; unknown names fail compilation.
    pub operator: String,
    /// Right-hand constant for the predicate.
    pub value: Value,
}

/// Condition tree node: a predicate, a composite, or a segment reference.
///
/// # Invariants
/// - Empty `and` is vacuously true; empty `or` is vacuously false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Conjunction; true iff all children are true.
    All {
        /// Child conditions.
        and: Vec<Condition>,
    },
    /// Disjunction; true iff any child is true.
    Any {
        /// Child conditions.
        or: Vec<Condition>,
    },
    /// Reference to a named segment, substituted at compile time.
    Segment {
        /// Segment key within the environment.
        segment: SegmentKey,
    },
    /// Atomic predicate.
    Pred(Predicate),
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Weighted entry of a rollout action.
///
/// # Invariants
/// - `weight` must be finite and >= 0; enforced at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutWeight {
    /// Variation receiving this share of the bucket space.
    pub variation_key: VariationKey,
    /// Non-negative weight; normalized to the 0..10000 bucket partition.
    pub weight: f64,
}

/// Action taken when a rule's condition matches.
///
/// # Invariants
/// - Referenced variation keys must exist on the flag; enforced at compile
///   time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleAction {
    /// Serve one fixed variation.
    Variation {
        /// Variation key to serve.
        variation: VariationKey,
    },
    /// Partition the bucket space across variations by weight.
    Rollout {
        /// Ordered weighted entries.
        rollout: Vec<RolloutWeight>,
    },
}

/// Targeting rule: a condition paired with an action.
///
/// # Invariants
/// - Rules are ordered; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Optional stable identifier; the compiler assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RuleId>,
    /// Condition gating the action.
    pub condition: Condition,
    /// Action applied when the condition is true.
    pub action: RuleAction,
}

// ============================================================================
// SECTION: Flags and Segments
// ============================================================================

/// Author-facing flag definition.
///
/// # Invariants
/// - `default_variation` must name an entry of `variations`; enforced at
///   compile time.
/// - `version` increases monotonically on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    /// Flag key, unique within the environment.
    pub key: FlagKey,
    /// Value type of the flag.
    pub flag_type: FlagType,
    /// Ordered variation list.
    pub variations: Vec<Variation>,
    /// Variation served when no rule matches.
    pub default_variation: VariationKey,
    /// Ordered rule list; first match wins.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Lifecycle status.
    pub status: FlagStatus,
    /// Monotonic version, incremented on mutation.
    pub version: u64,
}

/// Named, environment-scoped condition tree referenced by rules.
///
/// # Invariants
/// - Segment references must not form a cycle; enforced at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment key, unique within the environment.
    pub key: SegmentKey,
    /// Condition tree substituted into referencing rules.
    pub condition: Condition,
    /// Monotonic version, incremented on mutation.
    pub version: u64,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
