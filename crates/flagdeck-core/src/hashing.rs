// crates/flagdeck-core/src/hashing.rs
// ============================================================================
// Module: Flagdeck Canonical Hashing
// Description: Canonical JSON bytes, content digests, and config signatures.
// Purpose: Make etags and signatures deterministic across implementations.
// Dependencies: serde_jcs, sha2, hmac, hex
// ============================================================================

//! ## Overview
//! Config etags are content-addressed hashes over RFC 8785 canonical JSON
//! (sorted keys, no insignificant whitespace), so two identical payloads
//! always produce identical etags regardless of producer. The same
//! canonical bytes feed the HMAC-SHA256 config signature. User keys are
//! never persisted raw; [`user_key_hash`] is the only form that leaves the
//! evaluation path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while hashing or signing canonical payloads.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HashError {
    /// Payload could not be canonicalized (e.g. non-finite float).
    #[error("canonicalization failure: {0}")]
    Canonicalization(String),
    /// Signing key was rejected by the MAC implementation.
    #[error("invalid signing key")]
    InvalidKey,
}

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Hash algorithm identifiers supported for content digests.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 digests rendered as lowercase hex.
    Sha256,
}

/// Content digest with its algorithm label.
///
/// # Invariants
/// - `value` is lowercase hex of the digest bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Algorithm that produced the digest.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest value.
    pub value: String,
}

impl HashDigest {
    /// Builds a digest record from raw digest bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex::encode(bytes),
        }
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ============================================================================
// SECTION: Canonical JSON
// ============================================================================

/// Serializes a value to RFC 8785 canonical JSON bytes.
///
/// # Errors
/// Returns [`HashError::Canonicalization`] when the value cannot be
/// canonicalized (non-finite floats, non-string map keys).
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes with the given algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => HashDigest::new(algorithm, &Sha256::digest(bytes)),
    }
}

/// Hashes the canonical JSON form of a value.
///
/// # Errors
/// Returns [`HashError::Canonicalization`] when canonicalization fails.
pub fn hash_canonical_json<T: Serialize>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

// ============================================================================
// SECTION: User Key Hashing
// ============================================================================

/// Hashes a raw user key for persistence; raw keys never leave the edge.
#[must_use]
pub fn user_key_hash(user_key: &str) -> String {
    hex::encode(Sha256::digest(user_key.as_bytes()))
}

// ============================================================================
// SECTION: Config Signing
// ============================================================================

/// HMAC-SHA256 type alias for config signatures.
type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies config documents over their canonical bytes.
///
/// # Invariants
/// - The signing scope is exactly the canonical payload bytes that enter
///   the etag; producers and verifiers must agree on that scope.
#[derive(Clone)]
pub struct ConfigSigner {
    /// Shared secret key material.
    key: Vec<u8>,
}

impl ConfigSigner {
    /// Creates a signer from shared secret key material.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
        }
    }

    /// Signs canonical payload bytes, returning lowercase hex.
    ///
    /// # Errors
    /// Returns [`HashError::InvalidKey`] when the MAC rejects the key.
    pub fn sign(&self, canonical: &[u8]) -> Result<String, HashError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| HashError::InvalidKey)?;
        mac.update(canonical);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verifies a lowercase-hex signature over canonical payload bytes.
    ///
    /// # Errors
    /// Returns [`HashError::InvalidKey`] when the MAC rejects the key.
    pub fn verify(&self, canonical: &[u8], signature: &str) -> Result<bool, HashError> {
        let Ok(expected) = hex::decode(signature) else {
            return Ok(false);
        };
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| HashError::InvalidKey)?;
        mac.update(canonical);
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

impl fmt::Debug for ConfigSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfigSigner(..)")
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
