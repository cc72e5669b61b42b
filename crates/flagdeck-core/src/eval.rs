// crates/flagdeck-core/src/eval.rs
// ============================================================================
// Module: Flagdeck Evaluation Engine
// Description: Pure evaluation of compiled plans against contexts.
// Purpose: Answer "which variation does this user get" with no I/O.
// Dependencies: crate::bucketer, crate::core::{attributes, events, plan}
// ============================================================================

//! ## Overview
//! Evaluation is pure CPU work over an installed plan: rules are tested
//! top-to-bottom and the first true condition picks the action. Predicate
//! semantics are fail-closed: absent attributes, type mismatches, and
//! failed coercions make a predicate false (with the two documented
//! exceptions: `nin` is vacuously true and `neq` against a non-null
//! constant is true when the attribute is absent). Any internal
//! inconsistency degrades to the default variation with an
//! `evaluation_error` reason; evaluation itself never fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::bucketer::Bucketing;
use crate::bucketer::assign_from_ranges;
use crate::bucketer::bucket_user;
use crate::core::attributes::AttributeValue;
use crate::core::attributes::EvalContext;
use crate::core::events::EvalReason;
use crate::core::flag::FlagStatus;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::VariationKey;
use crate::core::plan::CompiledAction;
use crate::core::plan::CompiledCondition;
use crate::core::plan::CompiledPlan;
use crate::core::plan::CompiledPredicate;
use crate::core::plan::Operator;

// ============================================================================
// SECTION: Evaluation Result
// ============================================================================

/// Outcome of evaluating one flag for one context.
///
/// # Invariants
/// - `value` corresponds to `variation_key` except on the
///   `evaluation_error` path, where it may be null.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Variation assigned to the user.
    pub variation_key: VariationKey,
    /// Value of the assigned variation.
    pub value: Value,
    /// Why this variation was assigned.
    pub reason: EvalReason,
    /// Rule that matched, when one did.
    pub rule_id: Option<RuleId>,
    /// Bucketing material for exposure attribution.
    pub bucketing: Bucketing,
}

// ============================================================================
// SECTION: Flag Evaluation
// ============================================================================

/// Evaluates a compiled plan for one context.
///
/// Rules run in plan order; the first true condition determines the
/// action. Archived flags and unmatched contexts fall through to the
/// default variation.
#[must_use]
pub fn evaluate_flag(plan: &CompiledPlan, salt: &str, context: &EvalContext) -> Evaluation {
    let bucketing = bucket_user(salt, &plan.flag_key, &context.user_key);

    if plan.status != FlagStatus::Active {
        return default_outcome(plan, bucketing, EvalReason::FlagInactive, None);
    }

    for rule in &plan.rules {
        if !condition_is_true(&rule.condition, context) {
            continue;
        }
        match &rule.action {
            CompiledAction::Variation {
                variation,
            } => {
                let Some(value) = plan.variation_value(variation) else {
                    return default_outcome(
                        plan,
                        bucketing,
                        EvalReason::EvaluationError,
                        Some(rule.id.clone()),
                    );
                };
                let reason = if rule.uses_segment {
                    EvalReason::SegmentMatch
                } else {
                    EvalReason::TargetMatch
                };
                return Evaluation {
                    variation_key: variation.clone(),
                    value: value.clone(),
                    reason,
                    rule_id: Some(rule.id.clone()),
                    bucketing,
                };
            }
            CompiledAction::Rollout {
                ranges,
            } => {
                let Some(variation) = assign_from_ranges(ranges, bucketing.bucket) else {
                    return default_outcome(
                        plan,
                        bucketing,
                        EvalReason::EvaluationError,
                        Some(rule.id.clone()),
                    );
                };
                let Some(value) = plan.variation_value(variation) else {
                    return default_outcome(
                        plan,
                        bucketing,
                        EvalReason::EvaluationError,
                        Some(rule.id.clone()),
                    );
                };
                return Evaluation {
                    variation_key: variation.clone(),
                    value: value.clone(),
                    reason: EvalReason::Rollout,
                    rule_id: Some(rule.id.clone()),
                    bucketing,
                };
            }
        }
    }

    default_outcome(plan, bucketing, EvalReason::Default, None)
}

/// Builds the default-variation outcome, degrading to null when the plan
/// is internally inconsistent.
fn default_outcome(
    plan: &CompiledPlan,
    bucketing: Bucketing,
    reason: EvalReason,
    rule_id: Option<RuleId>,
) -> Evaluation {
    let (reason, value) = match plan.variation_value(&plan.default_variation) {
        Some(value) => (reason, value.clone()),
        None => (EvalReason::EvaluationError, Value::Null),
    };
    Evaluation {
        variation_key: plan.default_variation.clone(),
        value,
        reason,
        rule_id,
        bucketing,
    }
}

// ============================================================================
// SECTION: Condition Evaluation
// ============================================================================

/// Evaluates a compiled condition tree against a context.
///
/// Empty conjunctions are true; empty disjunctions are false.
#[must_use]
pub fn condition_is_true(condition: &CompiledCondition, context: &EvalContext) -> bool {
    match condition {
        CompiledCondition::All {
            children,
        } => children.iter().all(|child| condition_is_true(child, context)),
        CompiledCondition::Any {
            children,
        } => children.iter().any(|child| condition_is_true(child, context)),
        CompiledCondition::Pred(pred) => predicate_is_true(pred, context),
    }
}

/// Evaluates one predicate with fail-closed coercion.
fn predicate_is_true(pred: &CompiledPredicate, context: &EvalContext) -> bool {
    let Some(attribute) = context.attribute(&pred.attribute) else {
        // Absent attributes fail every operator except the two vacuous
        // cases required for cross-implementation uniformity.
        return match pred.operator {
            Operator::Nin => true,
            Operator::Neq => !pred.value.is_null(),
            _ => false,
        };
    };

    match pred.operator {
        Operator::Eq => match (attribute.canonical_string(), constant_string(&pred.value)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        },
        Operator::Neq => match (attribute.canonical_string(), constant_string(&pred.value)) {
            (Some(left), Some(right)) => left != right,
            _ => false,
        },
        Operator::In => membership(attribute, &pred.value).unwrap_or(false),
        Operator::Nin => membership(attribute, &pred.value).map(|found| !found).unwrap_or(false),
        Operator::Lt => numeric_cmp(attribute, &pred.value).is_some_and(|ord| ord.is_lt()),
        Operator::Lte => numeric_cmp(attribute, &pred.value).is_some_and(|ord| ord.is_le()),
        Operator::Gt => numeric_cmp(attribute, &pred.value).is_some_and(|ord| ord.is_gt()),
        Operator::Gte => numeric_cmp(attribute, &pred.value).is_some_and(|ord| ord.is_ge()),
        Operator::Contains => {
            match (attribute.canonical_string(), constant_string(&pred.value)) {
                (Some(haystack), Some(needle)) => haystack.contains(&needle),
                _ => false,
            }
        }
        Operator::Regex => match (&pred.pattern, attribute.canonical_string()) {
            (Some(pattern), Some(subject)) => pattern.is_match(&subject),
            _ => false,
        },
        Operator::SemverLt => semver_cmp(attribute, &pred.value).is_some_and(|ord| ord.is_lt()),
        Operator::SemverGt => semver_cmp(attribute, &pred.value).is_some_and(|ord| ord.is_gt()),
    }
}

// ============================================================================
// SECTION: Coercion Helpers
// ============================================================================

/// Canonical string form of a predicate constant; sequences and objects
/// have none.
fn constant_string(value: &Value) -> Option<String> {
    AttributeValue::from_json(value).and_then(|attr| attr.canonical_string())
}

/// Best-effort numeric form of a predicate constant.
fn constant_number(value: &Value) -> Option<f64> {
    AttributeValue::from_json(value).and_then(|attr| attr.as_number())
}

/// Membership of the attribute's canonical form in a constant sequence.
///
/// Returns `None` when the constant is not a sequence or the attribute has
/// no canonical scalar form; callers fail closed on `None`.
fn membership(attribute: &AttributeValue, constant: &Value) -> Option<bool> {
    let Value::Array(members) = constant else {
        return None;
    };
    let needle = attribute.canonical_string()?;
    let mut found = false;
    for member in members {
        if let Some(rendered) = constant_string(member)
            && rendered == needle
        {
            found = true;
            break;
        }
    }
    Some(found)
}

/// Numeric ordering of attribute against constant, when both coerce.
fn numeric_cmp(attribute: &AttributeValue, constant: &Value) -> Option<std::cmp::Ordering> {
    let left = attribute.as_number()?;
    let right = constant_number(constant)?;
    left.partial_cmp(&right)
}

/// Semver ordering of attribute against constant, when both parse.
fn semver_cmp(attribute: &AttributeValue, constant: &Value) -> Option<std::cmp::Ordering> {
    let left = semver::Version::parse(&attribute.canonical_string()?).ok()?;
    let right = semver::Version::parse(&constant_string(constant)?).ok()?;
    Some(left.cmp(&right))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
