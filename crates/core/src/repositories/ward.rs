//! Inpatient admissions and outpatient visits.
//!
//! These records are the stored history behind [`crate::series::RecordCountSource`] and the
//! bed occupancy shown on the dashboard.

use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{HmsError, HmsResult};
use crate::repositories::patients;
use crate::series::ResourceKind;
use chrono::NaiveDate;
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::Arc;

const INPATIENT_COLUMNS: &str =
    "id, patient_id, bed_number, case_type, admitted_date, discharged_date, treatment_plan";
const OUTPATIENT_COLUMNS: &str =
    "id, patient_id, visit_date, symptoms, diagnosis, prescription, next_visit_date";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InpatientRecord {
    pub id: i64,
    pub patient_id: i64,
    pub bed_number: u32,
    pub case_type: String,
    pub admitted_date: NaiveDate,
    pub discharged_date: Option<NaiveDate>,
    pub treatment_plan: String,
}

impl InpatientRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            bed_number: row.get(2)?,
            case_type: row.get(3)?,
            admitted_date: row.get(4)?,
            discharged_date: row.get(5)?,
            treatment_plan: row.get(6)?,
        })
    }

    pub fn is_admitted(&self) -> bool {
        self.discharged_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutpatientRecord {
    pub id: i64,
    pub patient_id: i64,
    pub visit_date: NaiveDate,
    pub symptoms: String,
    pub diagnosis: String,
    pub prescription: String,
    pub next_visit_date: Option<NaiveDate>,
}

impl OutpatientRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            visit_date: row.get(2)?,
            symptoms: row.get(3)?,
            diagnosis: row.get(4)?,
            prescription: row.get(5)?,
            next_visit_date: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewInpatient {
    pub admission_number: String,
    pub bed_number: u32,
    pub case_type: NonEmptyText,
    pub admitted_date: NaiveDate,
    pub treatment_plan: String,
}

#[derive(Debug, Clone)]
pub struct NewOutpatientVisit {
    pub admission_number: String,
    pub visit_date: NaiveDate,
    pub symptoms: NonEmptyText,
    pub diagnosis: String,
    pub prescription: String,
    pub next_visit_date: Option<NaiveDate>,
}

/// Bed usage at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BedOccupancy {
    pub total_beds: u32,
    pub occupied_beds: u32,
}

impl BedOccupancy {
    pub fn available_beds(&self) -> u32 {
        self.total_beds.saturating_sub(self.occupied_beds)
    }
}

#[derive(Clone, Debug)]
pub struct WardService {
    db: Arc<Database>,
    cfg: Arc<CoreConfig>,
}

impl WardService {
    pub fn new(db: Arc<Database>, cfg: Arc<CoreConfig>) -> Self {
        Self { db, cfg }
    }

    /// Admits a registered patient to a bed.
    ///
    /// # Errors
    ///
    /// Returns `HmsError` if:
    /// - the bed number is outside `1..=total_beds` ([`HmsError::InvalidInput`])
    /// - the patient is unknown ([`HmsError::PatientNotFound`])
    /// - the bed holds an undischarged patient ([`HmsError::BedOccupied`])
    /// - the store fails
    pub fn admit_inpatient(&self, admission: NewInpatient) -> HmsResult<InpatientRecord> {
        let total_beds = self.cfg.total_beds();
        if admission.bed_number == 0 || admission.bed_number > total_beds {
            return Err(HmsError::InvalidInput(format!(
                "bed number must be between 1 and {total_beds}, got {}",
                admission.bed_number
            )));
        }

        let record = self.db.write(|tx| {
            let patient = patients::require_by_admission_number(tx, &admission.admission_number)?;

            let occupied: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM inpatient_records
                 WHERE bed_number = ?1 AND discharged_date IS NULL)",
                params![admission.bed_number],
                |row| row.get(0),
            )?;
            if occupied {
                return Err(HmsError::BedOccupied(admission.bed_number));
            }

            tx.execute(
                "INSERT INTO inpatient_records (patient_id, bed_number, case_type, admitted_date,
                 treatment_plan) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    patient.id,
                    admission.bed_number,
                    admission.case_type.as_str(),
                    admission.admitted_date,
                    admission.treatment_plan.trim(),
                ],
            )?;
            require_inpatient(tx, tx.last_insert_rowid())
        })?;

        tracing::info!(
            record_id = record.id,
            bed = record.bed_number,
            admitted = %record.admitted_date,
            "inpatient admitted"
        );
        Ok(record)
    }

    /// Records the discharge of an admitted inpatient, freeing the bed.
    pub fn discharge(&self, record_id: i64, date: NaiveDate) -> HmsResult<InpatientRecord> {
        let record = self.db.write(|tx| {
            let record = require_inpatient(tx, record_id)?;
            if let Some(discharged) = record.discharged_date {
                return Err(HmsError::InvalidInput(format!(
                    "inpatient record {record_id} was already discharged on {discharged}"
                )));
            }
            if date < record.admitted_date {
                return Err(HmsError::InvalidInput(format!(
                    "discharge date {date} precedes admission on {}",
                    record.admitted_date
                )));
            }

            tx.execute(
                "UPDATE inpatient_records SET discharged_date = ?1 WHERE id = ?2",
                params![date, record_id],
            )?;
            require_inpatient(tx, record_id)
        })?;

        tracing::info!(record_id, bed = record.bed_number, discharged = %date, "inpatient discharged");
        Ok(record)
    }

    pub fn record_outpatient_visit(&self, visit: NewOutpatientVisit) -> HmsResult<OutpatientRecord> {
        if visit
            .next_visit_date
            .is_some_and(|next| next < visit.visit_date)
        {
            return Err(HmsError::InvalidInput(
                "next visit date cannot precede the visit".into(),
            ));
        }

        let record = self.db.write(|tx| {
            let patient = patients::require_by_admission_number(tx, &visit.admission_number)?;
            tx.execute(
                "INSERT INTO outpatient_records (patient_id, visit_date, symptoms, diagnosis,
                 prescription, next_visit_date) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    patient.id,
                    visit.visit_date,
                    visit.symptoms.as_str(),
                    visit.diagnosis.trim(),
                    visit.prescription.trim(),
                    visit.next_visit_date,
                ],
            )?;
            let record = tx.query_row(
                &format!("SELECT {OUTPATIENT_COLUMNS} FROM outpatient_records WHERE id = ?1"),
                params![tx.last_insert_rowid()],
                OutpatientRecord::from_row,
            )?;
            Ok(record)
        })?;

        tracing::info!(record_id = record.id, visit = %record.visit_date, "outpatient visit recorded");
        Ok(record)
    }

    pub fn bed_occupancy(&self) -> HmsResult<BedOccupancy> {
        let occupied_beds: u32 = self.db.read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM inpatient_records WHERE discharged_date IS NULL",
                [],
                |row| row.get(0),
            )?)
        })?;

        Ok(BedOccupancy {
            total_beds: self.cfg.total_beds(),
            occupied_beds,
        })
    }

    /// Inpatients currently holding a bed, by bed number.
    pub fn current_inpatients(&self) -> HmsResult<Vec<InpatientRecord>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INPATIENT_COLUMNS} FROM inpatient_records
                 WHERE discharged_date IS NULL ORDER BY bed_number"
            ))?;
            let records = stmt
                .query_map([], InpatientRecord::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }
}

fn require_inpatient(conn: &Connection, record_id: i64) -> HmsResult<InpatientRecord> {
    conn.query_row(
        &format!("SELECT {INPATIENT_COLUMNS} FROM inpatient_records WHERE id = ?1"),
        params![record_id],
        InpatientRecord::from_row,
    )
    .optional()?
    .ok_or(HmsError::InpatientNotFound(record_id))
}

/// Number of admissions per `admitted_date`, or visits per `visit_date`, in date order.
pub(crate) fn daily_counts(
    conn: &Connection,
    resource: ResourceKind,
) -> HmsResult<Vec<(NaiveDate, u32)>> {
    let sql = match resource {
        ResourceKind::Inpatient => {
            "SELECT admitted_date, COUNT(*) FROM inpatient_records
             GROUP BY admitted_date ORDER BY admitted_date"
        }
        ResourceKind::Outpatient => {
            "SELECT visit_date, COUNT(*) FROM outpatient_records
             GROUP BY visit_date ORDER BY visit_date"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}
