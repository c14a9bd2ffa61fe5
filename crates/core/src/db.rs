//! Relational store.
//!
//! All persistent state lives in a single SQLite database. A [`Database`] owns one
//! connection behind a mutex and is shared between request handlers as `Arc<Database>`.
//!
//! Writes go through [`Database::write`], which runs the closure inside a
//! `BEGIN IMMEDIATE` transaction. SQLite grants at most one such transaction per database
//! file at a time, so every scan-then-write allocation performed inside `write` is a
//! serialized critical section, both between threads sharing a handle and between
//! processes (CLI and server) sharing the file.

use crate::constants::DATABASE_BUSY_TIMEOUT_MS;
use crate::error::{HmsError, HmsResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../migrations/001_initial.sql"))];

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database file at `path` and applies pending migrations.
    pub fn open(path: &Path) -> HmsResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database with the full schema.
    pub fn open_in_memory() -> HmsResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> HmsResult<Self> {
        conn.busy_timeout(Duration::from_millis(DATABASE_BUSY_TIMEOUT_MS))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a read-only closure against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> HmsResult<T>) -> HmsResult<T> {
        let conn = self.conn.lock().map_err(|_| HmsError::ConnectionPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside an immediate (write-locked) transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> HmsResult<T>) -> HmsResult<T> {
        let mut conn = self.conn.lock().map_err(|_| HmsError::ConnectionPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Applies every migration newer than the recorded schema version.
pub fn run_migrations(conn: &Connection) -> HmsResult<()> {
    let current_version = current_schema_version(conn);

    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            tracing::info!("running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| HmsError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Current schema version, 0 when no schema exists yet.
fn current_schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count_tables(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .expect("table count query should succeed")
    }

    #[test]
    fn test_open_in_memory_creates_schema() {
        let db = Database::open_in_memory().expect("open should succeed");
        let tables = db.read(|conn| Ok(count_tables(conn))).expect("read should succeed");
        assert_eq!(tables, 6);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::open_in_memory().expect("open should succeed");
        db.read(run_migrations)
            .expect("re-running migrations should succeed");
        let version = db
            .read(|conn| Ok(current_schema_version(conn)))
            .expect("read should succeed");
        assert_eq!(version, 1);
    }

    #[test]
    fn test_reopen_file_database_keeps_data() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("hms.sqlite3");

        {
            let db = Database::open(&path).expect("open should succeed");
            db.write(|tx| {
                tx.execute(
                    "INSERT INTO allocation_counters (scope, key, value) VALUES ('t', 'k', 7)",
                    [],
                )?;
                Ok(())
            })
            .expect("write should succeed");
        }

        let db = Database::open(&path).expect("reopen should succeed");
        let value: u32 = db
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT value FROM allocation_counters WHERE scope = 't' AND key = 'k'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .expect("read should succeed");
        assert_eq!(value, 7);
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let db = Database::open_in_memory().expect("open should succeed");

        let result: HmsResult<()> = db.write(|tx| {
            tx.execute(
                "INSERT INTO allocation_counters (scope, key, value) VALUES ('t', 'k', 1)",
                [],
            )?;
            Err(HmsError::InvalidInput("abort".into()))
        });
        assert!(result.is_err());

        let rows: i64 = db
            .read(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM allocation_counters", [], |row| {
                    row.get(0)
                })?)
            })
            .expect("read should succeed");
        assert_eq!(rows, 0, "failed write must leave no rows behind");
    }
}
