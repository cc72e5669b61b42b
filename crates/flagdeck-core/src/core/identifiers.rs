// crates/flagdeck-core/src/core/identifiers.rs
// ============================================================================
// Module: Flagdeck Identifiers
// Description: Canonical opaque identifiers for environments, flags, and rules.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Flagdeck.
//! Identifiers are opaque UTF-8 strings and serialize transparently on the
//! wire. The shared key grammar (`[A-Za-z0-9._-]`, 1..=100 chars, no leading
//! or trailing separator) is enforced where keys cross a trust boundary:
//! control-plane publish and event ingestion both call [`validate_key`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Key Grammar
// ============================================================================

/// Maximum length of a key in characters.
pub const MAX_KEY_LEN: usize = 100;

/// Key grammar violations reported by [`validate_key`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Key was empty.
    #[error("key is empty")]
    Empty,
    /// Key exceeded [`MAX_KEY_LEN`] characters.
    #[error("key exceeds {MAX_KEY_LEN} characters: {0}")]
    TooLong(usize),
    /// Key contained a character outside `[A-Za-z0-9._-]`.
    #[error("key contains invalid character `{0}`")]
    InvalidChar(char),
    /// Key started or ended with `.`, `_`, or `-`.
    #[error("key starts or ends with a separator")]
    EdgeSeparator,
}

/// Validates a key against the shared grammar.
///
/// # Errors
/// Returns [`KeyError`] when the key is empty, too long, contains a
/// character outside `[A-Za-z0-9._-]`, or starts/ends with `.`, `_`, `-`.
pub fn validate_key(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    let len = key.chars().count();
    if len > MAX_KEY_LEN {
        return Err(KeyError::TooLong(len));
    }
    for ch in key.chars() {
        if !(ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || ch == '-') {
            return Err(KeyError::InvalidChar(ch));
        }
    }
    let first = key.chars().next();
    let last = key.chars().next_back();
    let is_separator = |ch: Option<char>| matches!(ch, Some('.' | '_' | '-'));
    if is_separator(first) || is_separator(last) {
        return Err(KeyError::EdgeSeparator);
    }
    Ok(())
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Declares an opaque string identifier newtype with the shared conversions.
macro_rules! string_identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; grammar is enforced at trust boundaries, not
        ///   by this type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier! {
    /// Environment key identifying a deployment target (e.g. `prod`).
    EnvKey
}

string_identifier! {
    /// Flag key, unique within an environment.
    FlagKey
}

string_identifier! {
    /// Variation key, unique within a flag.
    VariationKey
}

string_identifier! {
    /// Segment key, unique within an environment.
    SegmentKey
}

string_identifier! {
    /// Metric key for metric events.
    MetricKey
}

string_identifier! {
    /// Stable identifier of a compiled rule within a flag.
    RuleId
}

// ============================================================================
// SECTION: Tests
// ============================================================================
