// crates/flagdeck-core/src/core/plan.rs
// ============================================================================
// Module: Flagdeck Compiled Plans
// Description: Evaluation-ready plans, conditions, and environment configs.
// Purpose: Execute rules without re-interpreting the authored JSON.
// Dependencies: crate::core::{flag, identifiers, time}, crate::hashing, regex, serde
// ============================================================================

//! ## Overview
//! Compilation turns the authoring model into artifacts that evaluate with
//! no further interpretation: operators are resolved to a closed enum,
//! segment references are substituted away, regex patterns are compiled
//! once, and rollout weights become a contiguous partition of the bucket
//! space. The [`EnvironmentConfig`] document is the distributed artifact;
//! its etag is a content-addressed hash over canonical bytes and its
//! signature is an HMAC over those same bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde::de::Error as _;
use serde_json::Value;

use crate::core::flag::FlagStatus;
use crate::core::flag::FlagType;
use crate::core::identifiers::EnvKey;
use crate::core::identifiers::FlagKey;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::SegmentKey;
use crate::core::identifiers::VariationKey;
use crate::core::time::Timestamp;
use crate::hashing::ConfigSigner;
use crate::hashing::HashAlgorithm;
use crate::hashing::HashError;
use crate::hashing::canonical_json_bytes;
use crate::hashing::hash_bytes;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Closed operator set executed by compiled predicates.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equality on canonical string forms.
    Eq,
    /// Inequality on canonical string forms.
    Neq,
    /// Membership in a sequence of scalars.
    In,
    /// Non-membership in a sequence of scalars.
    Nin,
    /// Numeric less-than with best-effort coercion.
    Lt,
    /// Numeric less-than-or-equal with best-effort coercion.
    Lte,
    /// Numeric greater-than with best-effort coercion.
    Gt,
    /// Numeric greater-than-or-equal with best-effort coercion.
    Gte,
    /// Substring containment on string forms.
    Contains,
    /// Regular-expression match; pattern compiled at plan build.
    Regex,
    /// Semantic-version less-than; parse failure is false.
    SemverLt,
    /// Semantic-version greater-than; parse failure is false.
    SemverGt,
}

impl Operator {
    /// Resolves an authored operator name, or `None` when unknown.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            "in" => Some(Self::In),
            "nin" => Some(Self::Nin),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "contains" => Some(Self::Contains),
            "regex" => Some(Self::Regex),
            "semver_lt" => Some(Self::SemverLt),
            "semver_gt" => Some(Self::SemverGt),
            _ => None,
        }
    }

    /// Returns the stable operator name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Contains => "contains",
            Self::Regex => "regex",
            Self::SemverLt => "semver_lt",
            Self::SemverGt => "semver_gt",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Compiled Patterns
// ============================================================================

/// Regex compiled once at plan build, serialized as its pattern string.
///
/// # Invariants
/// - Deserialization recompiles the pattern and fails on invalid input, so
///   an installed plan always holds a usable matcher.
#[derive(Debug, Clone)]
pub struct CompiledPattern(Regex);

impl CompiledPattern {
    /// Compiles a pattern string.
    ///
    /// # Errors
    /// Returns the underlying [`regex::Error`] when the pattern is invalid.
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Returns the original pattern string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Tests the pattern against a haystack.
    #[must_use]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

impl Serialize for CompiledPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for CompiledPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Self::compile(&pattern).map_err(D::Error::custom)
    }
}

// ============================================================================
// SECTION: Compiled Conditions
// ============================================================================

/// Compiled atomic predicate.
///
/// # Invariants
/// - `pattern` is `Some` iff `operator` is [`Operator::Regex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPredicate {
    /// Attribute name looked up in the evaluation context.
    pub attribute: String,
    /// Resolved operator.
    pub operator: Operator,
    /// Right-hand constant.
    pub value: Value,
    /// Pre-compiled regex for [`Operator::Regex`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<CompiledPattern>,
}

/// Compiled condition tree with segments substituted away.
///
/// # Invariants
/// - Contains only predicates and AND/OR composition; no segment
///   references survive compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompiledCondition {
    /// Conjunction; true iff all children are true. Empty is true.
    All {
        /// Child conditions.
        children: Vec<CompiledCondition>,
    },
    /// Disjunction; true iff any child is true. Empty is false.
    Any {
        /// Child conditions.
        children: Vec<CompiledCondition>,
    },
    /// Atomic predicate leaf.
    Pred(CompiledPredicate),
}

// ============================================================================
// SECTION: Compiled Actions and Rules
// ============================================================================

/// Half-open bucket range `[start_bucket, end_bucket)` owned by a variation.
///
/// # Invariants
/// - Ranges within a rollout are contiguous from 0 and the final
///   `end_bucket` is exactly 10000.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutRange {
    /// Variation owning the range.
    pub variation_key: VariationKey,
    /// Inclusive range start.
    pub start_bucket: u32,
    /// Exclusive range end.
    pub end_bucket: u32,
}

impl RolloutRange {
    /// Returns true when the bucket falls inside this range.
    #[must_use]
    pub const fn covers(&self, bucket: u32) -> bool {
        self.start_bucket <= bucket && bucket < self.end_bucket
    }
}

/// Compiled action of a rule.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompiledAction {
    /// Serve one fixed variation.
    Variation {
        /// Variation key to serve.
        variation: VariationKey,
    },
    /// Pick the variation whose range covers the user's bucket.
    Rollout {
        /// Contiguous bucket partition.
        ranges: Vec<RolloutRange>,
    },
}

/// Compiled rule with a stable identifier.
///
/// # Invariants
/// - `id` is unique within the owning plan.
/// - `uses_segment` is true iff a segment reference was substituted into
///   the condition; evaluation uses it for reason attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledRule {
    /// Stable rule identifier for exposure attribution.
    pub id: RuleId,
    /// Compiled condition.
    pub condition: CompiledCondition,
    /// Compiled action.
    pub action: CompiledAction,
    /// True when the condition came partly from a substituted segment.
    #[serde(default)]
    pub uses_segment: bool,
}

// ============================================================================
// SECTION: Compiled Plans
// ============================================================================

/// Evaluation-ready plan for one flag.
///
/// # Invariants
/// - `default_variation` names an entry of `variations`.
/// - Rules are ordered; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPlan {
    /// Flag key the plan was compiled from.
    pub flag_key: FlagKey,
    /// Value type of the flag.
    pub flag_type: FlagType,
    /// Variation values keyed by variation key.
    pub variations: BTreeMap<VariationKey, Value>,
    /// Ordered compiled rules.
    pub rules: Vec<CompiledRule>,
    /// Variation served when no rule matches.
    pub default_variation: VariationKey,
    /// Lifecycle status carried from the flag.
    pub status: FlagStatus,
    /// Flag version the plan was compiled at.
    pub version: u64,
}

impl CompiledPlan {
    /// Looks up a variation value by key.
    #[must_use]
    pub fn variation_value(&self, key: &VariationKey) -> Option<&Value> {
        self.variations.get(key)
    }
}

// ============================================================================
// SECTION: Environment Config
// ============================================================================

/// Signed, versioned environment document distributed to edges.
///
/// # Invariants
/// - `etag` is a deterministic function of the canonical payload; identical
///   payloads always produce identical etags.
/// - `signature`, when present, is HMAC-SHA256 over the same canonical
///   bytes that produced the etag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment key.
    pub env_key: EnvKey,
    /// Monotonic config version.
    pub version: u64,
    /// Environment bucketing salt.
    pub salt: String,
    /// Compiled plans keyed by flag key.
    pub flags: BTreeMap<FlagKey, CompiledPlan>,
    /// Compiled segment conditions retained for introspection.
    pub segments: BTreeMap<SegmentKey, CompiledCondition>,
    /// Content-addressed etag over the canonical payload.
    pub etag: String,
    /// HMAC signature over the canonical payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Publish timestamp; excluded from the etag payload.
    pub updated_at: Timestamp,
}

/// Borrowed view of the fields entering the etag and signature.
#[derive(Serialize)]
struct ConfigPayload<'a> {
    /// Environment key.
    env_key: &'a EnvKey,
    /// Monotonic config version.
    version: u64,
    /// Environment bucketing salt.
    salt: &'a str,
    /// Compiled plans keyed by flag key.
    flags: &'a BTreeMap<FlagKey, CompiledPlan>,
    /// Compiled segment conditions.
    segments: &'a BTreeMap<SegmentKey, CompiledCondition>,
}

impl EnvironmentConfig {
    /// Builds a config document, computing the etag and optional signature.
    ///
    /// # Errors
    /// Returns [`HashError`] when canonicalization or signing fails.
    pub fn build(
        env_key: EnvKey,
        version: u64,
        salt: String,
        flags: BTreeMap<FlagKey, CompiledPlan>,
        segments: BTreeMap<SegmentKey, CompiledCondition>,
        updated_at: Timestamp,
        signer: Option<&ConfigSigner>,
    ) -> Result<Self, HashError> {
        let payload = ConfigPayload {
            env_key: &env_key,
            version,
            salt: &salt,
            flags: &flags,
            segments: &segments,
        };
        let bytes = canonical_json_bytes(&payload)?;
        let etag = hash_bytes(HashAlgorithm::Sha256, &bytes).value;
        let signature = match signer {
            Some(signer) => Some(signer.sign(&bytes)?),
            None => None,
        };
        Ok(Self {
            env_key,
            version,
            salt,
            flags,
            segments,
            etag,
            signature,
            updated_at,
        })
    }

    /// Returns the canonical payload bytes entering the etag and signature.
    ///
    /// # Errors
    /// Returns [`HashError::Canonicalization`] when canonicalization fails.
    pub fn canonical_payload_bytes(&self) -> Result<Vec<u8>, HashError> {
        let payload = ConfigPayload {
            env_key: &self.env_key,
            version: self.version,
            salt: &self.salt,
            flags: &self.flags,
            segments: &self.segments,
        };
        canonical_json_bytes(&payload)
    }

    /// Verifies the document signature against a signer.
    ///
    /// Returns false when the document carries no signature.
    ///
    /// # Errors
    /// Returns [`HashError`] when canonicalization or MAC setup fails.
    pub fn verify_signature(&self, signer: &ConfigSigner) -> Result<bool, HashError> {
        let Some(signature) = &self.signature else {
            return Ok(false);
        };
        let bytes = self.canonical_payload_bytes()?;
        signer.verify(&bytes, signature)
    }

    /// Looks up the compiled plan for a flag.
    #[must_use]
    pub fn plan(&self, flag_key: &FlagKey) -> Option<&CompiledPlan> {
        self.flags.get(flag_key)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
