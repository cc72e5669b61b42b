// crates/flagdeck-core/src/compiler.rs
// ============================================================================
// Module: Flagdeck Rule Compiler
// Description: Compile authored flags and segments into evaluation plans.
// Purpose: Resolve operators, substitute segments, and normalize rollouts
//          before anything reaches an evaluator.
// Dependencies: crate::core::{flag, identifiers, plan, time}, crate::hashing
// ============================================================================

//! ## Overview
//! Compilation is the only place authored JSON is interpreted. It resolves
//! operator names against the closed set, compiles regex patterns once,
//! substitutes segment references (with cycle detection), checks every
//! referenced variation, and normalizes rollout weights into a contiguous
//! `[0, 10000)` partition. Every failure is a structured [`CompileError`]
//! that aborts the publish; evaluators never see a partially compiled plan.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

use crate::bucketer::TOTAL_BUCKETS;
use crate::core::flag::Condition;
use crate::core::flag::Flag;
use crate::core::flag::RolloutWeight;
use crate::core::flag::Rule;
use crate::core::flag::RuleAction;
use crate::core::flag::Segment;
use crate::core::identifiers::EnvKey;
use crate::core::identifiers::FlagKey;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::SegmentKey;
use crate::core::identifiers::VariationKey;
use crate::core::identifiers::validate_key;
use crate::core::plan::CompiledAction;
use crate::core::plan::CompiledCondition;
use crate::core::plan::CompiledPattern;
use crate::core::plan::CompiledPlan;
use crate::core::plan::CompiledPredicate;
use crate::core::plan::CompiledRule;
use crate::core::plan::EnvironmentConfig;
use crate::core::plan::Operator;
use crate::core::plan::RolloutRange;
use crate::core::time::Timestamp;
use crate::hashing::ConfigSigner;
use crate::hashing::HashError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while compiling flags into plans.
///
/// # Invariants
/// - All variants are fatal to publish and never surface at evaluation.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Rule failed structural validation.
    #[error("invalid rule {rule_id}: {reason}")]
    InvalidRule {
        /// Human-readable failure reason.
        reason: String,
        /// Rule the failure is scoped to.
        rule_id: RuleId,
    },
    /// Operator name is outside the closed set.
    #[error("unknown operator `{operator}` in rule {rule_id}")]
    UnknownOperator {
        /// The unresolved operator name.
        operator: String,
        /// Rule the failure is scoped to.
        rule_id: RuleId,
    },
    /// Rule referenced a segment that does not exist.
    #[error("unknown segment `{segment}` referenced by rule {rule_id}")]
    UnknownSegmentRef {
        /// The missing segment key.
        segment: SegmentKey,
        /// Rule the failure is scoped to.
        rule_id: RuleId,
    },
    /// Rollout had no entries or no usable weight.
    #[error("empty rollout in rule {rule_id}")]
    EmptyRollout {
        /// Rule the failure is scoped to.
        rule_id: RuleId,
    },
    /// Rollout weight was negative.
    #[error("negative weight for variation `{variation}` in rule {rule_id}")]
    NegativeWeight {
        /// Variation carrying the negative weight.
        variation: VariationKey,
        /// Rule the failure is scoped to.
        rule_id: RuleId,
    },
    /// Flag failed validation outside any single rule.
    #[error("invalid flag `{flag_key}`: {reason}")]
    InvalidFlag {
        /// Human-readable failure reason.
        reason: String,
        /// Flag the failure is scoped to.
        flag_key: FlagKey,
    },
    /// Canonicalization or signing of the config document failed.
    #[error("config document hashing failed: {0}")]
    Hashing(#[from] HashError),
}

// ============================================================================
// SECTION: Environment Compilation
// ============================================================================

/// Compiles a full environment into a distributable config document.
///
/// # Errors
/// Returns [`CompileError`] when any flag, rule, or segment fails
/// compilation, or when the resulting document cannot be canonicalized.
pub fn compile_environment(
    env_key: &EnvKey,
    version: u64,
    salt: &str,
    flags: &BTreeMap<FlagKey, Flag>,
    segments: &BTreeMap<SegmentKey, Segment>,
    updated_at: Timestamp,
    signer: Option<&ConfigSigner>,
) -> Result<EnvironmentConfig, CompileError> {
    let mut compiled_flags = BTreeMap::new();
    for (flag_key, flag) in flags {
        let plan = compile_flag(flag, segments)?;
        compiled_flags.insert(flag_key.clone(), plan);
    }

    let mut compiled_segments = BTreeMap::new();
    for (segment_key, segment) in segments {
        let scope = RuleId::new(format!("segment:{segment_key}"));
        let mut active = BTreeSet::new();
        active.insert(segment_key.clone());
        let (condition, _) =
            compile_condition(&segment.condition, segments, &scope, &mut active)?;
        compiled_segments.insert(segment_key.clone(), condition);
    }

    Ok(EnvironmentConfig::build(
        env_key.clone(),
        version,
        salt.to_string(),
        compiled_flags,
        compiled_segments,
        updated_at,
        signer,
    )?)
}

// ============================================================================
// SECTION: Flag Compilation
// ============================================================================

/// Compiles one flag into an evaluation plan.
///
/// # Errors
/// Returns [`CompileError`] for unknown operators, bad regex patterns,
/// missing segments or variations, and malformed rollouts.
pub fn compile_flag(
    flag: &Flag,
    segments: &BTreeMap<SegmentKey, Segment>,
) -> Result<CompiledPlan, CompileError> {
    validate_key(flag.key.as_str()).map_err(|err| CompileError::InvalidFlag {
        reason: format!("flag key: {err}"),
        flag_key: flag.key.clone(),
    })?;
    if flag.variations.is_empty() {
        return Err(CompileError::InvalidFlag {
            reason: "flag has no variations".to_string(),
            flag_key: flag.key.clone(),
        });
    }

    let mut variations = BTreeMap::new();
    for variation in &flag.variations {
        validate_key(variation.key.as_str()).map_err(|err| CompileError::InvalidFlag {
            reason: format!("variation key `{}`: {err}", variation.key),
            flag_key: flag.key.clone(),
        })?;
        if variations.insert(variation.key.clone(), variation.value.clone()).is_some() {
            return Err(CompileError::InvalidFlag {
                reason: format!("duplicate variation key `{}`", variation.key),
                flag_key: flag.key.clone(),
            });
        }
    }
    if !variations.contains_key(&flag.default_variation) {
        return Err(CompileError::InvalidFlag {
            reason: format!("default variation `{}` does not exist", flag.default_variation),
            flag_key: flag.key.clone(),
        });
    }

    let mut rules = Vec::with_capacity(flag.rules.len());
    for (index, rule) in flag.rules.iter().enumerate() {
        rules.push(compile_rule(rule, index, &variations, segments)?);
    }

    Ok(CompiledPlan {
        flag_key: flag.key.clone(),
        flag_type: flag.flag_type,
        variations,
        rules,
        default_variation: flag.default_variation.clone(),
        status: flag.status,
        version: flag.version,
    })
}

/// Compiles one rule, assigning a stable identifier when none was authored.
fn compile_rule(
    rule: &Rule,
    index: usize,
    variations: &BTreeMap<VariationKey, Value>,
    segments: &BTreeMap<SegmentKey, Segment>,
) -> Result<CompiledRule, CompileError> {
    let rule_id =
        rule.id.clone().unwrap_or_else(|| RuleId::new(format!("rule-{index}")));
    let mut active = BTreeSet::new();
    let (condition, uses_segment) =
        compile_condition(&rule.condition, segments, &rule_id, &mut active)?;
    let action = compile_action(&rule.action, variations, &rule_id)?;
    Ok(CompiledRule {
        id: rule_id,
        condition,
        action,
        uses_segment,
    })
}

// ============================================================================
// SECTION: Condition Compilation
// ============================================================================

/// Compiles a condition tree, substituting segment references.
///
/// Returns the compiled tree and whether any segment was substituted.
/// `active` carries the segment keys currently being expanded so reference
/// cycles are rejected instead of recursing forever.
fn compile_condition(
    condition: &Condition,
    segments: &BTreeMap<SegmentKey, Segment>,
    rule_id: &RuleId,
    active: &mut BTreeSet<SegmentKey>,
) -> Result<(CompiledCondition, bool), CompileError> {
    match condition {
        Condition::All {
            and,
        } => {
            let mut children = Vec::with_capacity(and.len());
            let mut uses_segment = false;
            for child in and {
                let (compiled, used) = compile_condition(child, segments, rule_id, active)?;
                uses_segment |= used;
                children.push(compiled);
            }
            Ok((
                CompiledCondition::All {
                    children,
                },
                uses_segment,
            ))
        }
        Condition::Any {
            or,
        } => {
            let mut children = Vec::with_capacity(or.len());
            let mut uses_segment = false;
            for child in or {
                let (compiled, used) = compile_condition(child, segments, rule_id, active)?;
                uses_segment |= used;
                children.push(compiled);
            }
            Ok((
                CompiledCondition::Any {
                    children,
                },
                uses_segment,
            ))
        }
        Condition::Segment {
            segment,
        } => {
            let Some(definition) = segments.get(segment) else {
                return Err(CompileError::UnknownSegmentRef {
                    segment: segment.clone(),
                    rule_id: rule_id.clone(),
                });
            };
            if !active.insert(segment.clone()) {
                return Err(CompileError::InvalidRule {
                    reason: format!("segment reference cycle through `{segment}`"),
                    rule_id: rule_id.clone(),
                });
            }
            let (compiled, _) =
                compile_condition(&definition.condition, segments, rule_id, active)?;
            active.remove(segment);
            Ok((compiled, true))
        }
        Condition::Pred(pred) => {
            let Some(operator) = Operator::from_name(&pred.operator) else {
                return Err(CompileError::UnknownOperator {
                    operator: pred.operator.clone(),
                    rule_id: rule_id.clone(),
                });
            };
            let pattern = if operator == Operator::Regex {
                let Value::String(raw) = &pred.value else {
                    return Err(CompileError::InvalidRule {
                        reason: "regex operator requires a string pattern".to_string(),
                        rule_id: rule_id.clone(),
                    });
                };
                let compiled =
                    CompiledPattern::compile(raw).map_err(|err| CompileError::InvalidRule {
                        reason: format!("regex pattern failed to compile: {err}"),
                        rule_id: rule_id.clone(),
                    })?;
                Some(compiled)
            } else {
                None
            };
            Ok((
                CompiledCondition::Pred(CompiledPredicate {
                    attribute: pred.attribute.clone(),
                    operator,
                    value: pred.value.clone(),
                    pattern,
                }),
                false,
            ))
        }
    }
}

// ============================================================================
// SECTION: Action Compilation
// ============================================================================

/// Compiles a rule action, checking variation references.
fn compile_action(
    action: &RuleAction,
    variations: &BTreeMap<VariationKey, Value>,
    rule_id: &RuleId,
) -> Result<CompiledAction, CompileError> {
    match action {
        RuleAction::Variation {
            variation,
        } => {
            if !variations.contains_key(variation) {
                return Err(CompileError::InvalidRule {
                    reason: format!("action references unknown variation `{variation}`"),
                    rule_id: rule_id.clone(),
                });
            }
            Ok(CompiledAction::Variation {
                variation: variation.clone(),
            })
        }
        RuleAction::Rollout {
            rollout,
        } => {
            if rollout.is_empty() {
                return Err(CompileError::EmptyRollout {
                    rule_id: rule_id.clone(),
                });
            }
            for entry in rollout {
                if !variations.contains_key(&entry.variation_key) {
                    return Err(CompileError::InvalidRule {
                        reason: format!(
                            "rollout references unknown variation `{}`",
                            entry.variation_key
                        ),
                        rule_id: rule_id.clone(),
                    });
                }
                if !entry.weight.is_finite() {
                    return Err(CompileError::InvalidRule {
                        reason: format!(
                            "weight for variation `{}` is not finite",
                            entry.variation_key
                        ),
                        rule_id: rule_id.clone(),
                    });
                }
                if entry.weight < 0.0 {
                    return Err(CompileError::NegativeWeight {
                        variation: entry.variation_key.clone(),
                        rule_id: rule_id.clone(),
                    });
                }
            }
            let ranges = normalize_rollout(rollout, rule_id)?;
            Ok(CompiledAction::Rollout {
                ranges,
            })
        }
    }
}

/// Normalizes rollout weights into a contiguous `[0, 10000)` partition.
///
/// All entries but the last take `floor(w / S * 10000)` buckets; the last
/// entry absorbs rounding so the final range always ends at exactly 10000.
/// A single zero-weight entry still owns the whole bucket space.
fn normalize_rollout(
    rollout: &[RolloutWeight],
    rule_id: &RuleId,
) -> Result<Vec<RolloutRange>, CompileError> {
    let sum: f64 = rollout.iter().map(|entry| entry.weight).sum();
    if sum <= 0.0 && rollout.len() > 1 {
        return Err(CompileError::EmptyRollout {
            rule_id: rule_id.clone(),
        });
    }

    let mut ranges = Vec::with_capacity(rollout.len());
    let mut cursor = 0_u32;
    for (index, entry) in rollout.iter().enumerate() {
        let end = if index == rollout.len() - 1 {
            TOTAL_BUCKETS
        } else {
            cursor + floor_to_bucket(entry.weight / sum * f64::from(TOTAL_BUCKETS))
        };
        ranges.push(RolloutRange {
            variation_key: entry.variation_key.clone(),
            start_bucket: cursor,
            end_bucket: end,
        });
        cursor = end;
    }
    Ok(ranges)
}

/// Converts a floor value bounded by the bucket space to a bucket count.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is clamped to the bucket space before casting"
)]
fn floor_to_bucket(value: f64) -> u32 {
    value.clamp(0.0, f64::from(TOTAL_BUCKETS)).floor() as u32
}

// ============================================================================
// SECTION: Tests
// ============================================================================
