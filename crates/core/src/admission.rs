//! Admission number allocation.
//!
//! An admission number is `{facility}{year}{serial}`, where `serial` is a zero-padded
//! six digit counter that restarts for every facility and registration year:
//!
//! ```text
//! HOSP01 2026 000042
//! ^^^^^^ ^^^^ ^^^^^^
//! code   year serial
//! ```
//!
//! Numbers are claimed through the `admission` allocation counter keyed by the prefix.
//! The first allocation for a prefix seeds that counter by scanning the stored numbers,
//! skipping any whose trailing six characters are not digits.

use crate::constants::{ADMISSION_SERIAL_DIGITS, ADMISSION_SERIAL_MAX};
use crate::db::Database;
use crate::error::{HmsError, HmsResult};
use crate::sequence::{self, SequenceKey};
use hms_types::FacilityCode;
use rusqlite::{params, Transaction};
use serde::{Deserialize, Serialize};

const ADMISSION_SCOPE: &str = "admission";

/// A structured patient identifier, immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdmissionNumber(String);

impl AdmissionNumber {
    /// Builds the admission number for `serial` under `facility` and `year`.
    ///
    /// # Errors
    ///
    /// Returns [`HmsError::AdmissionCapacityExhausted`] when `serial` needs more than six
    /// digits, and [`HmsError::InvalidInput`] for a serial of zero or a year outside
    /// `0..=9999`.
    pub fn compose(facility: &FacilityCode, year: i32, serial: u32) -> HmsResult<Self> {
        let prefix = admission_prefix(facility, year)?;
        if serial == 0 {
            return Err(HmsError::InvalidInput(
                "admission serial must be at least 1".into(),
            ));
        }
        if serial > ADMISSION_SERIAL_MAX {
            return Err(HmsError::AdmissionCapacityExhausted { prefix });
        }
        Ok(Self(format!(
            "{prefix}{serial:0width$}",
            width = ADMISSION_SERIAL_DIGITS
        )))
    }

    /// Wraps a stored admission number without validating its layout.
    ///
    /// Historical numbers may not follow the current layout; they are still valid
    /// references to a patient.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The serial encoded in the trailing six characters, if they are all digits.
    pub fn serial(&self) -> Option<u32> {
        parse_serial(&self.0)
    }
}

impl std::fmt::Display for AdmissionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AdmissionNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The `{facility}{year}` prefix shared by every admission number of that year.
pub fn admission_prefix(facility: &FacilityCode, year: i32) -> HmsResult<String> {
    if !(0..=9999).contains(&year) {
        return Err(HmsError::InvalidInput(format!(
            "registration year {year} is out of range"
        )));
    }
    Ok(format!("{facility}{year:04}"))
}

/// Parses the trailing six characters of `admission_number` as a serial.
///
/// Returns `None` for anything shorter than six characters or whose tail contains a
/// non-digit.
pub fn parse_serial(admission_number: &str) -> Option<u32> {
    let start = admission_number.len().checked_sub(ADMISSION_SERIAL_DIGITS)?;
    let tail = admission_number.get(start..)?;
    if !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}

/// Highest serial among `existing`, or 0 when none parse.
///
/// Malformed entries are logged and skipped.
pub fn max_serial<'a>(existing: impl IntoIterator<Item = &'a str>) -> u32 {
    existing
        .into_iter()
        .filter_map(|number| {
            let serial = parse_serial(number);
            if serial.is_none() {
                tracing::warn!(admission_number = number, "skipping malformed admission number");
            }
            serial
        })
        .max()
        .unwrap_or(0)
}

/// Issues admission numbers for one facility.
#[derive(Debug, Clone)]
pub struct AdmissionNumberAllocator {
    facility: FacilityCode,
}

impl AdmissionNumberAllocator {
    pub fn new(facility: FacilityCode) -> Self {
        Self { facility }
    }

    /// Claims the next admission number for `year` in its own transaction.
    ///
    /// Registration uses [`allocate_in`](Self::allocate_in) instead so the number and the
    /// patient row commit together.
    pub fn allocate(&self, db: &Database, year: i32) -> HmsResult<AdmissionNumber> {
        db.write(|tx| self.allocate_in(tx, year))
    }

    /// Claims the next admission number for `year` inside an open write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`HmsError::AdmissionCapacityExhausted`] when serial 999999 has already been
    /// issued for this facility and year; the counter is left unchanged.
    pub fn allocate_in(&self, tx: &Transaction<'_>, year: i32) -> HmsResult<AdmissionNumber> {
        let prefix = admission_prefix(&self.facility, year)?;
        let key = SequenceKey::new(ADMISSION_SCOPE, &prefix);

        let last = sequence::current(tx, key, |tx| scan_max_serial(tx, &prefix))?;
        let next = last
            .checked_add(1)
            .filter(|serial| *serial <= ADMISSION_SERIAL_MAX)
            .ok_or_else(|| HmsError::AdmissionCapacityExhausted {
                prefix: prefix.clone(),
            })?;

        let number = AdmissionNumber::compose(&self.facility, year, next)?;
        sequence::advance(tx, key, next)?;

        tracing::info!(facility = %self.facility, year, admission_number = %number, "allocated admission number");
        Ok(number)
    }
}

fn scan_max_serial(tx: &Transaction<'_>, prefix: &str) -> HmsResult<u32> {
    let mut stmt = tx.prepare(
        "SELECT admission_number FROM patients
         WHERE substr(admission_number, 1, ?1) = ?2",
    )?;
    let numbers = stmt
        .query_map(params![prefix.chars().count() as i64, prefix], |row| {
            row.get::<_, String>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(max_serial(numbers.iter().map(String::as_str)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn facility() -> FacilityCode {
        FacilityCode::new("HOSP01").unwrap()
    }

    fn insert_existing(db: &Database, admission_number: &str) {
        db.write(|tx| {
            tx.execute(
                "INSERT INTO patients (name, date_of_birth, gender, contact, national_id,
                 address, admission_number, registered_at)
                 VALUES ('Existing', '1980-01-01', 'F', '000', ?1, '-', ?1, '2026-01-01T00:00:00Z')",
                params![admission_number],
            )?;
            Ok(())
        })
        .expect("insert should succeed");
    }

    #[test]
    fn test_compose_zero_pads_serial() {
        let number = AdmissionNumber::compose(&facility(), 2026, 42).expect("compose should succeed");
        assert_eq!(number.as_str(), "HOSP012026000042");
        assert_eq!(number.serial(), Some(42));
    }

    #[test]
    fn test_compose_rejects_overflowing_serial() {
        let err = AdmissionNumber::compose(&facility(), 2026, 1_000_000)
            .expect_err("seven digit serial should fail");
        assert!(matches!(err, HmsError::AdmissionCapacityExhausted { .. }));
    }

    #[test]
    fn test_parse_serial_rejects_non_digits() {
        assert_eq!(parse_serial("HOSP012026000123"), Some(123));
        assert_eq!(parse_serial("HOSP0120260001x3"), None);
        assert_eq!(parse_serial("12345"), None);
        assert_eq!(parse_serial("HOSP012026ABCDEF"), None);
    }

    #[test]
    fn test_max_serial_skips_malformed_entries() {
        let existing = ["HOSP012026000004", "HOSP012026garbage", "HOSP012026000002"];
        assert_eq!(max_serial(existing), 4);
        assert_eq!(max_serial(std::iter::empty()), 0);
    }

    #[test]
    fn test_first_allocation_starts_at_one() {
        let db = Database::open_in_memory().expect("open should succeed");
        let allocator = AdmissionNumberAllocator::new(facility());

        let number = allocator.allocate(&db, 2026).expect("allocate should succeed");
        assert_eq!(number.as_str(), "HOSP012026000001");

        let second = allocator.allocate(&db, 2026).expect("allocate should succeed");
        assert_eq!(second.as_str(), "HOSP012026000002");
    }

    #[test]
    fn test_allocation_continues_after_existing_and_skips_malformed() {
        let db = Database::open_in_memory().expect("open should succeed");
        insert_existing(&db, "HOSP012026000007");
        insert_existing(&db, "HOSP012026000003");
        insert_existing(&db, "HOSP012026ABC123");
        insert_existing(&db, "HOSP012026000x99");

        let allocator = AdmissionNumberAllocator::new(facility());
        let number = allocator.allocate(&db, 2026).expect("allocate should succeed");
        assert_eq!(number.as_str(), "HOSP012026000008");
    }

    #[test]
    fn test_allocation_is_scoped_by_facility_and_year() {
        let db = Database::open_in_memory().expect("open should succeed");
        insert_existing(&db, "HOSP012025000500");
        insert_existing(&db, "HOSP022026000900");

        let allocator = AdmissionNumberAllocator::new(facility());
        let number = allocator.allocate(&db, 2026).expect("allocate should succeed");
        assert_eq!(number.as_str(), "HOSP012026000001");

        let last_year = allocator.allocate(&db, 2025).expect("allocate should succeed");
        assert_eq!(last_year.as_str(), "HOSP012025000501");
    }

    #[test]
    fn test_capacity_exhaustion_is_an_error_and_not_a_wrap() {
        let db = Database::open_in_memory().expect("open should succeed");
        insert_existing(&db, "HOSP012026999999");

        let allocator = AdmissionNumberAllocator::new(facility());
        let err = allocator
            .allocate(&db, 2026)
            .expect_err("allocation past 999999 should fail");
        assert!(
            matches!(err, HmsError::AdmissionCapacityExhausted { ref prefix } if prefix == "HOSP012026"),
            "unexpected error: {err:?}"
        );

        let err_again = allocator
            .allocate(&db, 2026)
            .expect_err("allocation should keep failing");
        assert!(matches!(err_again, HmsError::AdmissionCapacityExhausted { .. }));
    }

    #[test]
    fn test_concurrent_allocations_are_distinct_and_contiguous() {
        const WORKERS: usize = 8;
        const PER_WORKER: usize = 25;

        let db = Arc::new(Database::open_in_memory().expect("open should succeed"));
        insert_existing(&db, "HOSP012026000010");
        let allocator = AdmissionNumberAllocator::new(facility());

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let db = Arc::clone(&db);
                let allocator = allocator.clone();
                thread::spawn(move || {
                    (0..PER_WORKER)
                        .map(|_| allocator.allocate(&db, 2026).expect("allocate should succeed"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut serials: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("worker should not panic"))
            .map(|n| n.serial().expect("allocated numbers always parse"))
            .collect();

        let distinct: HashSet<u32> = serials.iter().copied().collect();
        assert_eq!(distinct.len(), WORKERS * PER_WORKER);

        serials.sort_unstable();
        let expected: Vec<u32> = (11..11 + (WORKERS * PER_WORKER) as u32).collect();
        assert_eq!(serials, expected);
    }
}
