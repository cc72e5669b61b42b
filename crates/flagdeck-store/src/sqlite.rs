// crates/flagdeck-store/src/sqlite.rs
// ============================================================================
// Module: SQLite Config Store
// Description: Durable ConfigStore backed by SQLite WAL.
// Purpose: Persist environment records with version-guarded writes.
// Dependencies: flagdeck-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! The durable control-plane store keeps one row per environment with the
//! record serialized as JSON and the version mirrored into its own column.
//! The version column is the optimistic-concurrency guard: updates carry
//! `WHERE version = ?` and a zero-row update surfaces as a conflict, which
//! the publisher resolves by retrying from a fresh read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Mutex;

use flagdeck_core::EnvKey;
use flagdeck_core::EnvironmentConfig;
use flagdeck_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::config_store::ConfigStore;
use crate::config_store::EnvRecord;
use crate::config_store::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Busy timeout applied to every connection.
const BUSY_TIMEOUT_MS: i64 = 5_000;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable config store over a single `SQLite` connection.
///
/// # Invariants
/// - `environments.version` always mirrors the version inside
///   `record_json`.
#[derive(Debug)]
pub struct SqliteConfigStore {
    /// Guarded connection; held only around individual statements.
    conn: Mutex<Connection>,
}

impl SqliteConfigStore {
    /// Opens (and migrates) a store at the given path.
    ///
    /// # Errors
    /// Returns [`StoreError::Database`] when the database cannot be opened
    /// or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|err| StoreError::Database(err.to_string()))?;
        Self::initialize(conn)
    }

    /// Opens an in-memory store (used by tests and demos).
    ///
    /// # Errors
    /// Returns [`StoreError::Database`] when the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|err| StoreError::Database(err.to_string()))?;
        Self::initialize(conn)
    }

    /// Applies pragmas and the schema to a fresh connection.
    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "wal")
            .map_err(|err| StoreError::Database(err.to_string()))?;
        conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
            .map_err(|err| StoreError::Database(err.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS environments (
                env_key     TEXT PRIMARY KEY,
                version     INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );",
        )
        .map_err(|err| StoreError::Database(err.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a closure with the guarded connection.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Database("lock poisoned".into()))?;
        f(&conn)
    }

    /// Decodes a stored record row.
    fn decode(raw: &str) -> Result<EnvRecord, StoreError> {
        serde_json::from_str(raw).map_err(|err| StoreError::Serialization(err.to_string()))
    }

    /// Encodes a record for storage.
    fn encode(record: &EnvRecord) -> Result<String, StoreError> {
        serde_json::to_string(record).map_err(|err| StoreError::Serialization(err.to_string()))
    }
}

impl ConfigStore for SqliteConfigStore {
    fn load(&self, env_key: &EnvKey) -> Result<Option<EnvRecord>, StoreError> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT record_json FROM environments WHERE env_key = ?1",
                    params![env_key.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| StoreError::Database(err.to_string()))?;
            raw.map(|raw| Self::decode(&raw)).transpose()
        })
    }

    fn load_config(&self, env_key: &EnvKey) -> Result<Option<EnvironmentConfig>, StoreError> {
        Ok(self.load(env_key)?.map(|record| record.config))
    }

    fn insert(&self, record: &EnvRecord) -> Result<(), StoreError> {
        let encoded = Self::encode(record)?;
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO environments (env_key, version, record_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.env_key.as_str(),
                    i64::try_from(record.version).unwrap_or(i64::MAX),
                    encoded,
                    Timestamp::now().to_string(),
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::AlreadyExists(record.env_key.clone()))
                }
                Err(err) => Err(StoreError::Database(err.to_string())),
            }
        })
    }

    fn update(&self, record: &EnvRecord, expected_version: u64) -> Result<(), StoreError> {
        let encoded = Self::encode(record)?;
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE environments
                     SET version = ?1, record_json = ?2, updated_at = ?3
                     WHERE env_key = ?4 AND version = ?5",
                    params![
                        i64::try_from(record.version).unwrap_or(i64::MAX),
                        encoded,
                        Timestamp::now().to_string(),
                        record.env_key.as_str(),
                        i64::try_from(expected_version).unwrap_or(i64::MAX),
                    ],
                )
                .map_err(|err| StoreError::Database(err.to_string()))?;
            if changed == 1 {
                return Ok(());
            }
            // Distinguish a missing row from a concurrent writer.
            let actual: Option<i64> = conn
                .query_row(
                    "SELECT version FROM environments WHERE env_key = ?1",
                    params![record.env_key.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| StoreError::Database(err.to_string()))?;
            match actual {
                None => Err(StoreError::NotFound(record.env_key.clone())),
                Some(actual) => Err(StoreError::VersionConflict {
                    env_key: record.env_key.clone(),
                    expected: expected_version,
                    actual: u64::try_from(actual).unwrap_or_default(),
                }),
            }
        })
    }

    fn remove(&self, env_key: &EnvKey) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM environments WHERE env_key = ?1",
                    params![env_key.as_str()],
                )
                .map_err(|err| StoreError::Database(err.to_string()))?;
            Ok(changed > 0)
        })
    }

    fn list_envs(&self) -> Result<Vec<EnvKey>, StoreError> {
        self.with_conn(|conn| {
            let mut statement = conn
                .prepare("SELECT env_key FROM environments ORDER BY env_key")
                .map_err(|err| StoreError::Database(err.to_string()))?;
            let rows = statement
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| StoreError::Database(err.to_string()))?;
            let mut keys = Vec::new();
            for row in rows {
                keys.push(EnvKey::new(
                    row.map_err(|err| StoreError::Database(err.to_string()))?,
                ));
            }
            Ok(keys)
        })
    }
}
