// crates/flagdeck-core/src/auth/tests.rs
// ============================================================================
// Module: Token Verification Tests
// Description: Unit tests for the verifier seam.
// Purpose: Validate exact-match lookup and scope checks.
// Dependencies: flagdeck-core
// ============================================================================

//! ## Overview
//! Validates the static verifier's exact-match behavior and the scope
//! check helper.

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

use std::collections::BTreeSet;

use super::AllowAll;
use super::StaticVerifier;
use super::TokenKind;
use super::TokenVerifier;
use super::Verification;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn static_verifier_matches_exactly() {
    let verifier = StaticVerifier::new(["edge-key".to_string()]);
    assert!(verifier.verify("edge-key").ok);
    assert!(!verifier.verify("edge-key ").ok);
    assert!(!verifier.verify("other").ok);
    assert!(!verifier.verify("").ok);
}

#[test]
fn allow_all_accepts_anything() {
    assert!(AllowAll.verify("whatever").ok);
    assert!(AllowAll.verify("").ok);
}

#[test]
fn unrestricted_scope_allows_every_env() {
    let verification = Verification {
        ok: true,
        env_scope: None,
        token_kind: TokenKind::Server,
    };
    assert!(verification.allows(&"prod".into()));
    assert!(verification.allows(&"staging".into()));
}

#[test]
fn restricted_scope_limits_envs() {
    let verification = Verification {
        ok: true,
        env_scope: Some(BTreeSet::from(["prod".into()])),
        token_kind: TokenKind::Client,
    };
    assert!(verification.allows(&"prod".into()));
    assert!(!verification.allows(&"staging".into()));
}

#[test]
fn denied_verification_allows_nothing() {
    assert!(!Verification::denied().allows(&"prod".into()));
}
