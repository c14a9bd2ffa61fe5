//! Patient registration.
//!
//! Registration inserts the patient row and claims its admission number in a single
//! write transaction, so a failed insert never burns a serial and two concurrent
//! registrations never share one.

use crate::admission::{AdmissionNumber, AdmissionNumberAllocator};
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{HmsError, HmsResult};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::Arc;

const PATIENT_COLUMNS: &str = "id, name, date_of_birth, gender, contact, is_differently_abled,
     national_id, address, admission_number, registered_at";

/// Demographic fields captured at registration.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: NonEmptyText,
    pub date_of_birth: NaiveDate,
    pub gender: NonEmptyText,
    pub contact: NonEmptyText,
    pub is_differently_abled: bool,
    pub national_id: NonEmptyText,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub contact: String,
    pub is_differently_abled: bool,
    pub national_id: String,
    pub address: String,
    pub admission_number: AdmissionNumber,
    pub registered_at: DateTime<Utc>,
}

impl Patient {
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        age_on(self.date_of_birth, date)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            date_of_birth: row.get(2)?,
            gender: row.get(3)?,
            contact: row.get(4)?,
            is_differently_abled: row.get(5)?,
            national_id: row.get(6)?,
            address: row.get(7)?,
            admission_number: AdmissionNumber::from_stored(row.get::<_, String>(8)?),
            registered_at: row.get(9)?,
        })
    }
}

/// Completed years between `date_of_birth` and `on`, counting the birthday itself.
pub fn age_on(date_of_birth: NaiveDate, on: NaiveDate) -> u32 {
    let mut years = on.year() - date_of_birth.year();
    if (on.month(), on.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

#[derive(Clone, Debug)]
pub struct RegistrationService {
    db: Arc<Database>,
    allocator: AdmissionNumberAllocator,
}

impl RegistrationService {
    pub fn new(db: Arc<Database>, cfg: Arc<CoreConfig>) -> Self {
        Self {
            db,
            allocator: AdmissionNumberAllocator::new(cfg.facility_code().clone()),
        }
    }

    /// Registers a patient and issues their admission number for `today`'s year.
    ///
    /// # Errors
    ///
    /// Returns `HmsError` if:
    /// - the date of birth is after `today` ([`HmsError::InvalidInput`])
    /// - the national id is already registered ([`HmsError::AlreadyRegistered`])
    /// - the admission serials for this year are exhausted
    ///   ([`HmsError::AdmissionCapacityExhausted`])
    /// - the store fails
    pub fn register(&self, patient: NewPatient, today: NaiveDate) -> HmsResult<Patient> {
        if patient.date_of_birth > today {
            return Err(HmsError::InvalidInput(
                "date of birth cannot be in the future".into(),
            ));
        }

        let registered = self.db.write(|tx| {
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM patients WHERE national_id = ?1)",
                params![patient.national_id.as_str()],
                |row| row.get(0),
            )?;
            if taken {
                return Err(HmsError::AlreadyRegistered(
                    patient.national_id.to_string(),
                ));
            }

            let admission_number = self.allocator.allocate_in(tx, today.year())?;
            tx.execute(
                "INSERT INTO patients (name, date_of_birth, gender, contact, is_differently_abled,
                 national_id, address, admission_number, registered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    patient.name.as_str(),
                    patient.date_of_birth,
                    patient.gender.as_str(),
                    patient.contact.as_str(),
                    patient.is_differently_abled,
                    patient.national_id.as_str(),
                    patient.address.trim(),
                    admission_number.as_str(),
                    Utc::now(),
                ],
            )?;

            get_by_id(tx, tx.last_insert_rowid())
        })?;

        tracing::info!(
            patient_id = registered.id,
            admission_number = %registered.admission_number,
            "patient registered"
        );
        Ok(registered)
    }

    pub fn find_by_admission_number(&self, admission_number: &str) -> HmsResult<Option<Patient>> {
        self.db
            .read(|conn| find_by_admission_number(conn, admission_number))
    }

    pub fn list(&self) -> HmsResult<Vec<Patient>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY id"
            ))?;
            let patients = stmt
                .query_map([], Patient::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(patients)
        })
    }
}

pub(crate) fn find_by_admission_number(
    conn: &Connection,
    admission_number: &str,
) -> HmsResult<Option<Patient>> {
    let patient = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE admission_number = ?1"),
            params![admission_number],
            Patient::from_row,
        )
        .optional()?;
    Ok(patient)
}

/// Like [`find_by_admission_number`] but treats a miss as [`HmsError::PatientNotFound`].
pub(crate) fn require_by_admission_number(
    conn: &Connection,
    admission_number: &str,
) -> HmsResult<Patient> {
    find_by_admission_number(conn, admission_number)?
        .ok_or_else(|| HmsError::PatientNotFound(admission_number.to_string()))
}

fn get_by_id(conn: &Connection, id: i64) -> HmsResult<Patient> {
    Ok(conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
        params![id],
        Patient::from_row,
    )?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ForecastSettings;
    use hms_types::FacilityCode;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::thread;
    use tempfile::TempDir;

    pub(crate) fn test_cfg() -> Arc<CoreConfig> {
        Arc::new(
            CoreConfig::new(
                PathBuf::from(":memory:"),
                FacilityCode::new("HOSP01").unwrap(),
                50,
                14,
                ForecastSettings::default(),
                ForecastSettings::default(),
            )
            .expect("CoreConfig::new should succeed"),
        )
    }

    pub(crate) fn new_patient(national_id: &str, date_of_birth: &str) -> NewPatient {
        NewPatient {
            name: NonEmptyText::new("Test Patient").unwrap(),
            date_of_birth: date_of_birth.parse().expect("valid test date"),
            gender: NonEmptyText::new("F").unwrap(),
            contact: NonEmptyText::new("9000000000").unwrap(),
            is_differently_abled: false,
            national_id: NonEmptyText::new(national_id).unwrap(),
            address: "1 Test Street".into(),
        }
    }

    fn today() -> NaiveDate {
        "2026-10-16".parse().unwrap()
    }

    #[test]
    fn test_age_on_counts_birthday() {
        let dob: NaiveDate = "1966-10-16".parse().unwrap();
        assert_eq!(age_on(dob, "2026-10-15".parse().unwrap()), 59);
        assert_eq!(age_on(dob, "2026-10-16".parse().unwrap()), 60);
        assert_eq!(age_on(dob, "1960-01-01".parse().unwrap()), 0);
    }

    #[test]
    fn test_register_issues_sequential_admission_numbers() {
        let db = Arc::new(Database::open_in_memory().expect("open should succeed"));
        let service = RegistrationService::new(db, test_cfg());

        let first = service
            .register(new_patient("N-1", "1990-05-01"), today())
            .expect("register should succeed");
        let second = service
            .register(new_patient("N-2", "1950-05-01"), today())
            .expect("register should succeed");

        assert_eq!(first.admission_number.as_str(), "HOSP012026000001");
        assert_eq!(second.admission_number.as_str(), "HOSP012026000002");
        assert_eq!(second.age_on(today()), 76);

        let found = service
            .find_by_admission_number("HOSP012026000002")
            .expect("lookup should succeed")
            .expect("patient should exist");
        assert_eq!(found, second);
    }

    #[test]
    fn test_register_rejects_duplicate_national_id_without_burning_a_serial() {
        let db = Arc::new(Database::open_in_memory().expect("open should succeed"));
        let service = RegistrationService::new(db, test_cfg());

        service
            .register(new_patient("N-1", "1990-05-01"), today())
            .expect("register should succeed");
        let err = service
            .register(new_patient("N-1", "1991-05-01"), today())
            .expect_err("duplicate national id should fail");
        assert!(matches!(err, HmsError::AlreadyRegistered(_)));

        let next = service
            .register(new_patient("N-2", "1991-05-01"), today())
            .expect("register should succeed");
        assert_eq!(next.admission_number.as_str(), "HOSP012026000002");
    }

    #[test]
    fn test_register_rejects_future_birth_date() {
        let db = Arc::new(Database::open_in_memory().expect("open should succeed"));
        let service = RegistrationService::new(db, test_cfg());

        let err = service
            .register(new_patient("N-1", "2027-01-01"), today())
            .expect_err("future date of birth should fail");
        assert!(matches!(err, HmsError::InvalidInput(_)));
        assert!(service.list().expect("list should succeed").is_empty());
    }

    #[test]
    fn test_patient_rows_always_carry_an_admission_number() {
        let db = Arc::new(Database::open_in_memory().expect("open should succeed"));
        let err = db
            .write(|tx| {
                tx.execute(
                    "INSERT INTO patients (name, date_of_birth, gender, contact, national_id,
                     address, registered_at)
                     VALUES ('P', '1990-01-01', 'M', '1', 'N-1', '-', '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .expect_err("a patient without an admission number should be rejected");
        assert!(matches!(err, HmsError::Database(_)), "unexpected error: {err:?}");

        let service = RegistrationService::new(db, test_cfg());
        assert!(service.list().expect("list should succeed").is_empty());
    }

    #[test]
    fn test_concurrent_registrations_across_connections() {
        const WORKERS: usize = 4;
        const PER_WORKER: usize = 10;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("hms.sqlite3");
        Database::open(&path).expect("initial open should succeed");

        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let path = path.clone();
                thread::spawn(move || {
                    // One connection per worker, as separate processes would have.
                    let db = Arc::new(Database::open(&path).expect("open should succeed"));
                    let service = RegistrationService::new(db, test_cfg());
                    (0..PER_WORKER)
                        .map(|i| {
                            service
                                .register(new_patient(&format!("N-{worker}-{i}"), "1990-01-01"), today())
                                .expect("register should succeed")
                                .admission_number
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut serials: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("worker should not panic"))
            .map(|n| n.serial().expect("allocated numbers always parse"))
            .collect();
        serials.sort_unstable();

        let distinct: HashSet<u32> = serials.iter().copied().collect();
        assert_eq!(distinct.len(), WORKERS * PER_WORKER);
        assert_eq!(serials, (1..=(WORKERS * PER_WORKER) as u32).collect::<Vec<_>>());
    }
}
