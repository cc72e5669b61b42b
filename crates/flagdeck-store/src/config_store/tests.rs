// crates/flagdeck-store/src/config_store/tests.rs
// ============================================================================
// Module: Memory Config Store Tests
// Description: Unit tests for the in-memory authoritative store.
// Purpose: Validate the optimistic-concurrency contract.
// Dependencies: flagdeck-store
// ============================================================================

//! ## Overview
//! Validates insert/update/remove semantics and the version-conflict
//! behavior every [`ConfigStore`] implementation must share.

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

use std::collections::BTreeMap;

use flagdeck_core::EnvironmentConfig;
use flagdeck_core::Timestamp;

use super::ConfigStore;
use super::EnvRecord;
use super::MemoryConfigStore;
use super::StoreError;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

pub(crate) fn record(env_key: &str, version: u64) -> EnvRecord {
    let config = EnvironmentConfig::build(
        env_key.into(),
        version,
        "7f3a".to_string(),
        BTreeMap::new(),
        BTreeMap::new(),
        Timestamp::from_unix_millis(0).unwrap(),
        None,
    )
    .unwrap();
    EnvRecord {
        env_key: env_key.into(),
        salt: "7f3a".to_string(),
        version,
        flags: BTreeMap::new(),
        segments: BTreeMap::new(),
        config,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn insert_then_load_round_trips() {
    let store = MemoryConfigStore::new();
    store.insert(&record("prod", 1)).unwrap();
    let loaded = store.load(&"prod".into()).unwrap().unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(store.load_config(&"prod".into()).unwrap().unwrap().version, 1);
}

#[test]
fn double_insert_is_rejected() {
    let store = MemoryConfigStore::new();
    store.insert(&record("prod", 1)).unwrap();
    let err = store.insert(&record("prod", 1)).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

#[test]
fn update_requires_the_read_version() {
    let store = MemoryConfigStore::new();
    store.insert(&record("prod", 1)).unwrap();
    store.update(&record("prod", 2), 1).unwrap();

    let err = store.update(&record("prod", 3), 1).unwrap_err();
    let StoreError::VersionConflict {
        expected,
        actual,
        ..
    } = err
    else {
        panic!("expected version conflict");
    };
    assert_eq!(expected, 1);
    assert_eq!(actual, 2);
}

#[test]
fn update_of_missing_env_is_not_found() {
    let store = MemoryConfigStore::new();
    let err = store.update(&record("ghost", 2), 1).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn remove_reports_whether_anything_was_deleted() {
    let store = MemoryConfigStore::new();
    store.insert(&record("prod", 1)).unwrap();
    assert!(store.remove(&"prod".into()).unwrap());
    assert!(!store.remove(&"prod".into()).unwrap());
    assert!(store.load(&"prod".into()).unwrap().is_none());
}

#[test]
fn list_envs_is_sorted() {
    let store = MemoryConfigStore::new();
    store.insert(&record("staging", 1)).unwrap();
    store.insert(&record("prod", 1)).unwrap();
    let keys = store.list_envs().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].as_str(), "prod");
    assert_eq!(keys[1].as_str(), "staging");
}
