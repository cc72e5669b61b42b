// crates/flagdeck-core/src/auth.rs
// ============================================================================
// Module: Token Verification Seam
// Description: Bearer-credential verification consumed by service surfaces.
// Purpose: Keep credential formats out of the core while enforcing scope.
// Dependencies: crate::core::identifiers
// ============================================================================

//! ## Overview
//! Every non-health endpoint requires a bearer credential. The platform
//! consumes verification through [`TokenVerifier`] and deliberately does
//! not prescribe a credential format; deployments plug in their own
//! verifier. [`StaticVerifier`] does exact-match lookup against configured
//! keys (dev and tests); [`AllowAll`] is for local demos only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::core::identifiers::EnvKey;

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Kind of credential a verifier recognized.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Server-side key used by edges and services.
    Server,
    /// Client-side key used by SDKs.
    Client,
}

/// Outcome of verifying one credential.
///
/// # Invariants
/// - `env_scope` of `None` grants access to every environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Whether the credential verified at all.
    pub ok: bool,
    /// Environments the credential may touch; `None` means unrestricted.
    pub env_scope: Option<BTreeSet<EnvKey>>,
    /// Credential classification.
    pub token_kind: TokenKind,
}

impl Verification {
    /// Returns a failed verification.
    #[must_use]
    pub const fn denied() -> Self {
        Self {
            ok: false,
            env_scope: None,
            token_kind: TokenKind::Server,
        }
    }

    /// Returns true when the verification covers an environment.
    #[must_use]
    pub fn allows(&self, env_key: &EnvKey) -> bool {
        self.ok && self.env_scope.as_ref().is_none_or(|scope| scope.contains(env_key))
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Credential verifier consumed by the service surfaces.
pub trait TokenVerifier: Send + Sync {
    /// Verifies a raw bearer token.
    fn verify(&self, token: &str) -> Verification;
}

// ============================================================================
// SECTION: Implementations
// ============================================================================

/// Exact-match verifier over a configured key set.
///
/// # Invariants
/// - Key format is opaque; no parsing is performed.
#[derive(Debug, Default)]
pub struct StaticVerifier {
    /// Accepted keys.
    keys: BTreeSet<String>,
}

impl StaticVerifier {
    /// Builds a verifier from configured keys.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl TokenVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Verification {
        if self.keys.contains(token) {
            Verification {
                ok: true,
                env_scope: None,
                token_kind: TokenKind::Server,
            }
        } else {
            Verification::denied()
        }
    }
}

/// Verifier that accepts any token; local demos only.
///
/// # Invariants
/// - Never deploy outside a trusted loopback environment.
#[derive(Debug, Default)]
pub struct AllowAll;

impl TokenVerifier for AllowAll {
    fn verify(&self, _token: &str) -> Verification {
        Verification {
            ok: true,
            env_scope: None,
            token_kind: TokenKind::Server,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
