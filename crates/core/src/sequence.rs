//! Per-key allocation counters.
//!
//! Each contended key (facility and year for admission numbers, date and class for tokens)
//! owns one row in `allocation_counters`. Callers read the current value, decide the next
//! one and store it, all inside the same [`Database::write`](crate::db::Database::write)
//! transaction, so two allocations for the same key can never observe the same value.
//!
//! A missing row is seeded by a caller-supplied scan over the existing records. That keeps
//! allocation correct for data written before the counter existed.

use crate::error::HmsResult;
use rusqlite::{params, OptionalExtension, Transaction};

/// Identifies one allocation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SequenceKey<'a> {
    pub scope: &'static str,
    pub key: &'a str,
}

impl<'a> SequenceKey<'a> {
    pub fn new(scope: &'static str, key: &'a str) -> Self {
        Self { scope, key }
    }
}

/// Returns the last value claimed for `key`, running `seed` when no counter exists yet.
pub(crate) fn current(
    tx: &Transaction<'_>,
    key: SequenceKey<'_>,
    seed: impl FnOnce(&Transaction<'_>) -> HmsResult<u32>,
) -> HmsResult<u32> {
    let stored: Option<u32> = tx
        .query_row(
            "SELECT value FROM allocation_counters WHERE scope = ?1 AND key = ?2",
            params![key.scope, key.key],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(value) => Ok(value),
        None => seed(tx),
    }
}

/// Records `value` as the last value claimed for `key`.
pub(crate) fn advance(tx: &Transaction<'_>, key: SequenceKey<'_>, value: u32) -> HmsResult<()> {
    tx.execute(
        "INSERT INTO allocation_counters (scope, key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT (scope, key) DO UPDATE SET value = excluded.value",
        params![key.scope, key.key, value],
    )?;
    Ok(())
}

/// Deletes every counter in `scope` whose key sorts before `before`.
///
/// Token counters are keyed by ISO date, so lexical order is chronological order.
pub(crate) fn prune_before(tx: &Transaction<'_>, scope: &'static str, before: &str) -> HmsResult<usize> {
    let removed = tx.execute(
        "DELETE FROM allocation_counters WHERE scope = ?1 AND key < ?2",
        params![scope, before],
    )?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    const SCOPE: &str = "test";

    #[test]
    fn test_current_uses_seed_when_missing() {
        let db = Database::open_in_memory().expect("open should succeed");
        let value = db
            .write(|tx| current(tx, SequenceKey::new(SCOPE, "a"), |_| Ok(41)))
            .expect("write should succeed");
        assert_eq!(value, 41);
    }

    #[test]
    fn test_current_prefers_stored_value_over_seed() {
        let db = Database::open_in_memory().expect("open should succeed");
        let key = SequenceKey::new(SCOPE, "a");
        db.write(|tx| advance(tx, key, 3)).expect("advance should succeed");

        let value = db
            .write(|tx| current(tx, key, |_| panic!("seed must not run")))
            .expect("write should succeed");
        assert_eq!(value, 3);
    }

    #[test]
    fn test_advance_overwrites() {
        let db = Database::open_in_memory().expect("open should succeed");
        let key = SequenceKey::new(SCOPE, "a");
        db.write(|tx| {
            advance(tx, key, 1)?;
            advance(tx, key, 2)
        })
        .expect("advance should succeed");

        let value = db
            .write(|tx| current(tx, key, |_| Ok(0)))
            .expect("write should succeed");
        assert_eq!(value, 2);
    }

    #[test]
    fn test_prune_before_keeps_current_and_other_scopes() {
        let db = Database::open_in_memory().expect("open should succeed");
        db.write(|tx| {
            advance(tx, SequenceKey::new(SCOPE, "2026-10-14"), 5)?;
            advance(tx, SequenceKey::new(SCOPE, "2026-10-15"), 5)?;
            advance(tx, SequenceKey::new(SCOPE, "2026-10-16"), 5)?;
            advance(tx, SequenceKey::new("other", "2026-10-01"), 5)
        })
        .expect("advance should succeed");

        let removed = db
            .write(|tx| prune_before(tx, SCOPE, "2026-10-16"))
            .expect("prune should succeed");
        assert_eq!(removed, 2);

        let remaining: i64 = db
            .read(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM allocation_counters", [], |row| {
                    row.get(0)
                })?)
            })
            .expect("read should succeed");
        assert_eq!(remaining, 2);
    }
}
