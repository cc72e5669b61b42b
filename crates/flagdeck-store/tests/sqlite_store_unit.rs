// crates/flagdeck-store/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Config Store Tests
// Description: Integration tests for the durable config store.
// Purpose: Validate persistence and version-guarded writes on disk.
// ============================================================================

//! ## Overview
//! Exercises the SQLite store against a temporary database file: round
//! trips, optimistic-concurrency conflicts, reopen-after-close
//! persistence, and removal.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use flagdeck_core::EnvironmentConfig;
use flagdeck_core::Timestamp;
use flagdeck_store::ConfigStore;
use flagdeck_store::EnvRecord;
use flagdeck_store::SqliteConfigStore;
use flagdeck_store::StoreError;
use tempfile::TempDir;

fn record(env_key: &str, version: u64) -> EnvRecord {
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

#[test]
fn insert_load_round_trips_in_memory() {
    let store = SqliteConfigStore::open_in_memory().unwrap();
    store.insert(&record("prod", 1)).unwrap();
    let loaded = store.load(&"prod".into()).unwrap().unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.salt, "7f3a");
}

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flagdeck.db");
    {
        let store = SqliteConfigStore::open(&path).unwrap();
        store.insert(&record("prod", 5)).unwrap();
    }
    let store = SqliteConfigStore::open(&path).unwrap();
    let loaded = store.load(&"prod".into()).unwrap().unwrap();
    assert_eq!(loaded.version, 5);
    assert_eq!(loaded.config.version, 5);
}

#[test]
fn duplicate_insert_reports_already_exists() {
    let store = SqliteConfigStore::open_in_memory().unwrap();
    store.insert(&record("prod", 1)).unwrap();
    let err = store.insert(&record("prod", 1)).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

#[test]
fn stale_update_reports_version_conflict() {
    let store = SqliteConfigStore::open_in_memory().unwrap();
    store.insert(&record("prod", 1)).unwrap();
    store.update(&record("prod", 2), 1).unwrap();

    let err = store.update(&record("prod", 3), 1).unwrap_err();
    let StoreError::VersionConflict {
        expected,
        actual,
        ..
    } = err
    else {
        panic!("expected version conflict, got {err}");
    };
    assert_eq!(expected, 1);
    assert_eq!(actual, 2);
}

#[test]
fn update_of_missing_env_is_not_found() {
    let store = SqliteConfigStore::open_in_memory().unwrap();
    let err = store.update(&record("ghost", 2), 1).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn remove_then_load_misses() {
    let store = SqliteConfigStore::open_in_memory().unwrap();
    store.insert(&record("prod", 1)).unwrap();
    assert!(store.remove(&"prod".into()).unwrap());
    assert!(store.load(&"prod".into()).unwrap().is_none());
    assert!(!store.remove(&"prod".into()).unwrap());
}

#[test]
fn list_envs_orders_by_key() {
    let store = SqliteConfigStore::open_in_memory().unwrap();
    store.insert(&record("staging-eu", 1)).unwrap();
    store.insert(&record("prod", 1)).unwrap();
    let keys = store.list_envs().unwrap();
    assert_eq!(keys.iter().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["prod", "staging-eu"]);
}
