// crates/flagdeck-store/src/lib.rs
// ============================================================================
// Module: Flagdeck Store Library
// Description: Authoritative config store and the shared warm cache tier.
// Purpose: Persist environment records and absorb edge read load.
// Dependencies: flagdeck-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! `flagdeck-store` holds the control plane's durable state: one
//! versioned [`EnvRecord`] per environment, guarded by optimistic
//! concurrency on the version column, plus the strictly-optimizing
//! [`SharedCache`] warm tier consulted by edges on local misses. The
//! SQLite implementation is the durable store; the memory implementations
//! back tests and single-process demos.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config_store;
pub mod shared_cache;
pub mod sqlite;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::config_store::ConfigStore;
pub use crate::config_store::EnvRecord;
pub use crate::config_store::MemoryConfigStore;
pub use crate::config_store::StoreError;
pub use crate::shared_cache::MemorySharedCache;
pub use crate::shared_cache::SharedCache;
pub use crate::sqlite::SqliteConfigStore;
