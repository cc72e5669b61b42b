// crates/flagdeck-core/src/core/attributes.rs
// ============================================================================
// Module: Flagdeck Attribute Model
// Description: Dynamic attribute values carried by evaluation contexts.
// Purpose: Model scalar-or-sequence attributes with fail-closed coercion.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Rule conditions evaluate against a dynamic attribute map. Attribute
//! values are a tagged union of scalars and sequences of scalars; predicate
//! coercion is best-effort and fail-closed: a type mismatch or failed parse
//! makes the predicate false, never a runtime error. The helpers here are
//! the single source of truth for canonical string forms and numeric
//! coercion so every predicate sees identical semantics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Attribute Values
// ============================================================================

/// Dynamic attribute value: a scalar or a sequence of scalars.
///
/// # Invariants
/// - `Seq` holds scalar variants only; nested sequences are rejected on
///   deserialization by [`AttributeValue::validate`] callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Sequence of scalar values.
    Seq(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Returns true when the value is a scalar (not a sequence).
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::Seq(_))
    }

    /// Rejects nested sequences, which the attribute model does not admit.
    ///
    /// # Errors
    /// Returns [`AttributeError::NestedSequence`] when a `Seq` contains a
    /// `Seq` member.
    pub fn validate(&self) -> Result<(), AttributeError> {
        if let Self::Seq(members) = self {
            for member in members {
                if !member.is_scalar() {
                    return Err(AttributeError::NestedSequence);
                }
            }
        }
        Ok(())
    }

    /// Returns the canonical string form used by `eq`, `neq`, and `contains`.
    ///
    /// Sequences have no canonical scalar form and return `None`.
    #[must_use]
    pub fn canonical_string(&self) -> Option<String> {
        match self {
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => {
                if value.is_finite() {
                    Some(value.to_string())
                } else {
                    None
                }
            }
            Self::String(value) => Some(value.clone()),
            Self::Seq(_) => None,
        }
    }

    /// Best-effort numeric coercion used by ordering operators.
    ///
    /// Booleans and sequences never coerce; strings parse as f64.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(value) => {
                // Large magnitudes lose precision here; ordering semantics
                // only require a best-effort parse.
                #[allow(clippy::cast_precision_loss, reason = "Best-effort numeric coercion.")]
                let coerced = *value as f64;
                Some(coerced)
            }
            Self::Float(value) => value.is_finite().then_some(*value),
            Self::String(value) => value.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Bool(_) | Self::Seq(_) => None,
        }
    }

    /// Converts a JSON scalar or array of scalars into an attribute value.
    ///
    /// Objects and nested arrays have no attribute representation.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            serde_json::Value::Array(items) => {
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    let member = Self::from_json(item)?;
                    if !member.is_scalar() {
                        return None;
                    }
                    members.push(member);
                }
                Some(Self::Seq(members))
            }
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_string() {
            Some(rendered) => f.write_str(&rendered),
            None => f.write_str("<seq>"),
        }
    }
}

/// Attribute model violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    /// A sequence contained a non-scalar member.
    #[error("attribute sequences must contain scalars only")]
    NestedSequence,
}

// ============================================================================
// SECTION: Evaluation Context
// ============================================================================

/// Evaluation context: the user key plus a dynamic attribute map.
///
/// # Invariants
/// - `user_key` must be non-empty at the service boundary; the engine treats
///   it as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalContext {
    /// Opaque user key entering the bucketing hash.
    pub user_key: String,
    /// Attribute map consulted by rule predicates.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl EvalContext {
    /// Creates a context with an empty attribute map.
    #[must_use]
    pub fn new(user_key: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute and returns the context for chaining.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
