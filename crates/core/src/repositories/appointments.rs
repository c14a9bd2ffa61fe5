//! Same-day appointment booking.
//!
//! A booking looks up the patient, rejects a second booking for the same day, derives the
//! priority class and claims a token, all inside one write transaction. A rejected booking
//! writes nothing and consumes no token.

use crate::admission::AdmissionNumber;
use crate::db::Database;
use crate::error::HmsResult;
use crate::repositories::patients;
use crate::token::{PriorityClass, TokenAllocator};
use chrono::{DateTime, NaiveDate, Utc};
use hms_types::NonEmptyText;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const APPOINTMENT_COLUMNS: &str = "id, patient_id, admission_number, appointment_date,
     symptom_or_disease, token_number, token_reset_date, is_priority, status, submitted_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Booked,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "Booked",
            AppointmentStatus::Completed => "Completed",
        }
    }
}

impl ToSql for AppointmentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AppointmentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "Booked" => Ok(AppointmentStatus::Booked),
            "Completed" => Ok(AppointmentStatus::Completed),
            other => Err(FromSqlError::Other(
                format!("unknown appointment status '{other}'").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub admission_number: AdmissionNumber,
    pub appointment_date: NaiveDate,
    pub symptom: String,
    pub token_number: u32,
    pub token_reset_date: Option<NaiveDate>,
    pub is_priority: bool,
    pub status: AppointmentStatus,
    pub submitted_at: DateTime<Utc>,
}

impl Appointment {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            admission_number: AdmissionNumber::from_stored(row.get::<_, String>(2)?),
            appointment_date: row.get(3)?,
            symptom: row.get(4)?,
            token_number: row.get(5)?,
            token_reset_date: row.get(6)?,
            is_priority: row.get(7)?,
            status: row.get(8)?,
            submitted_at: row.get(9)?,
        })
    }
}

/// Inputs of a same-day booking.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub admission_number: String,
    pub symptom: NonEmptyText,
    pub is_pregnant: bool,
    pub is_differently_abled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked {
        appointment: Appointment,
        /// A priority request that was queued in the normal range.
        overflowed: bool,
    },
    /// The patient already holds an appointment for the day; nothing was written.
    AlreadyBooked(Appointment),
}

impl BookingOutcome {
    pub fn appointment(&self) -> &Appointment {
        match self {
            BookingOutcome::Booked { appointment, .. } => appointment,
            BookingOutcome::AlreadyBooked(appointment) => appointment,
        }
    }

    pub fn is_booked(&self) -> bool {
        matches!(self, BookingOutcome::Booked { .. })
    }
}

#[derive(Clone, Debug)]
pub struct AppointmentService {
    db: Arc<Database>,
    tokens: TokenAllocator,
}

impl AppointmentService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            tokens: TokenAllocator::new(),
        }
    }

    /// Books `request` for `today`.
    ///
    /// The patient qualifies for the priority class when aged 60 or over on `today`,
    /// pregnant, or differently abled (flag on the request or on the registered profile).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::HmsError::PatientNotFound`] for an unknown admission number, or a
    /// storage error. A duplicate same-day booking is not an error; it yields
    /// [`BookingOutcome::AlreadyBooked`].
    pub fn book(&self, request: BookingRequest, today: NaiveDate) -> HmsResult<BookingOutcome> {
        let outcome = self.db.write(|tx| {
            let patient = patients::require_by_admission_number(tx, &request.admission_number)?;

            if let Some(existing) = find_for_patient_on(tx, &patient.admission_number, today)? {
                return Ok(BookingOutcome::AlreadyBooked(existing));
            }

            let class = PriorityClass::derive(
                patient.age_on(today),
                request.is_pregnant,
                request.is_differently_abled || patient.is_differently_abled,
            );
            let assignment = self.tokens.allocate_in(tx, today, class)?;

            tx.execute(
                "INSERT INTO appointments (patient_id, admission_number, appointment_date,
                 symptom_or_disease, token_number, token_reset_date, is_priority, status, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    patient.id,
                    patient.admission_number.as_str(),
                    today,
                    request.symptom.as_str(),
                    assignment.token,
                    today,
                    class.is_priority(),
                    AppointmentStatus::Booked,
                    Utc::now(),
                ],
            )?;

            let appointment = get_by_id(tx, tx.last_insert_rowid())?;
            Ok(BookingOutcome::Booked {
                appointment,
                overflowed: assignment.overflowed,
            })
        })?;

        match &outcome {
            BookingOutcome::Booked { appointment, .. } => tracing::info!(
                admission_number = %appointment.admission_number,
                token = appointment.token_number,
                priority = appointment.is_priority,
                "appointment booked"
            ),
            BookingOutcome::AlreadyBooked(existing) => tracing::warn!(
                admission_number = %existing.admission_number,
                date = %existing.appointment_date,
                "patient already has an appointment for today"
            ),
        }
        Ok(outcome)
    }

    /// The day's queue, ordered by token.
    pub fn appointments_on(&self, date: NaiveDate) -> HmsResult<Vec<Appointment>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE appointment_date = ?1 ORDER BY token_number, id"
            ))?;
            let appointments = stmt
                .query_map(params![date], Appointment::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(appointments)
        })
    }

    /// A patient's appointments, newest first.
    pub fn appointments_for_patient(&self, admission_number: &str) -> HmsResult<Vec<Appointment>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE admission_number = ?1 ORDER BY appointment_date DESC, id DESC"
            ))?;
            let appointments = stmt
                .query_map(params![admission_number], Appointment::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(appointments)
        })
    }

    /// Marks every booked appointment dated before `today` as completed.
    ///
    /// Returns the number of appointments changed; a repeat run returns 0.
    pub fn complete_past(&self, today: NaiveDate) -> HmsResult<usize> {
        let completed = self.db.write(|tx| {
            Ok(tx.execute(
                "UPDATE appointments SET status = ?1 WHERE status = ?2 AND appointment_date < ?3",
                params![AppointmentStatus::Completed, AppointmentStatus::Booked, today],
            )?)
        })?;
        if completed > 0 {
            tracing::info!(%today, completed, "past appointments completed");
        }
        Ok(completed)
    }
}

fn find_for_patient_on(
    conn: &Connection,
    admission_number: &AdmissionNumber,
    date: NaiveDate,
) -> HmsResult<Option<Appointment>> {
    let appointment = conn
        .query_row(
            &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE admission_number = ?1 AND appointment_date = ?2"
            ),
            params![admission_number.as_str(), date],
            Appointment::from_row,
        )
        .optional()?;
    Ok(appointment)
}

fn get_by_id(conn: &Connection, id: i64) -> HmsResult<Appointment> {
    Ok(conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        Appointment::from_row,
    )?)
}
