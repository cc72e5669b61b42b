// crates/flagdeck-bus/src/message.rs
// ============================================================================
// Module: Config Update Messages
// Description: Wire payloads published on the `config.updates` subject.
// Purpose: Carry version notifications from the control plane to edges.
// Dependencies: flagdeck-core, serde
// ============================================================================

//! ## Overview
//! Every publish at the control plane produces one [`UpdateMessage`] on the
//! `config.updates` subject. `full_refresh` carries the compiled config
//! inline; `incremental` announces a version and lets edges pull;
//! `invalidate` signals that the environment was removed or access was
//! revoked. Edges must tolerate unknown kinds from newer producers by
//! logging and ignoring them, which is why [`UpdateKind`] deserializes
//! through a catch-all variant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;
use flagdeck_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Subject name carrying config update messages.
pub const CONFIG_UPDATES_SUBJECT: &str = "config.updates";

// ============================================================================
// SECTION: Message Types
// ============================================================================

/// Kind of a config update message.
///
/// # Invariants
/// - Known variants are stable on the wire; unrecognized kinds map to
///   `Unknown` so subscribers can log and ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Replace the cached config with the inline document.
    FullRefresh,
    /// A new version exists; pull it from the control plane.
    Incremental,
    /// The environment was removed or access was revoked.
    Invalidate,
    /// Unrecognized message kind from a newer producer.
    #[serde(other)]
    Unknown,
}

/// Message published on [`CONFIG_UPDATES_SUBJECT`].
///
/// # Invariants
/// - `config` is present iff `kind` is [`UpdateKind::FullRefresh`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Environment the message applies to.
    pub env_key: EnvKey,
    /// Version the control plane just wrote.
    pub version: u64,
    /// Inline config for full refreshes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EnvironmentConfig>,
    /// Publish timestamp.
    pub timestamp: Timestamp,
}

impl UpdateMessage {
    /// Builds a full-refresh message carrying the config inline.
    #[must_use]
    pub fn full_refresh(config: EnvironmentConfig, timestamp: Timestamp) -> Self {
        Self {
            kind: UpdateKind::FullRefresh,
            env_key: config.env_key.clone(),
            version: config.version,
            config: Some(config),
            timestamp,
        }
    }

    /// Builds an incremental notification.
    #[must_use]
    pub fn incremental(env_key: EnvKey, version: u64, timestamp: Timestamp) -> Self {
        Self {
            kind: UpdateKind::Incremental,
            env_key,
            version,
            config: None,
            timestamp,
        }
    }

    /// Builds an invalidation notification.
    #[must_use]
    pub fn invalidate(env_key: EnvKey, version: u64, timestamp: Timestamp) -> Self {
        Self {
            kind: UpdateKind::Invalidate,
            env_key,
            version,
            config: None,
            timestamp,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
