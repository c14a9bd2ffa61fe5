//! # HMS Core
//!
//! Core business logic for the hospital management service.
//!
//! This crate contains the allocation rules and the data operations built on them:
//! - Admission numbers: `{facility}{year}{serial:06}`, unique and gap-free per facility-year
//! - Daily appointment tokens: 1..=10 reserved for priority patients, 11+ for everyone else
//! - The daily token reset job
//! - Next-day inpatient/outpatient forecasting and the bed planning dashboard
//!
//! All state lives in one SQLite database ([`db::Database`]); every allocation happens
//! inside a write transaction, so concurrent callers in one process or several never
//! receive the same number.
//!
//! **No API concerns**: HTTP servers, request types and command lines belong in `api-rest`,
//! `api-shared` and `hms-cli`.

pub mod admission;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod forecast;
pub mod repositories;
pub mod reset;
mod sequence;
pub mod series;
pub mod token;

pub use admission::{AdmissionNumber, AdmissionNumberAllocator};
pub use config::{CoreConfig, ForecastSettings};
pub use dashboard::{DashboardService, DashboardSummary};
pub use db::Database;
pub use error::{HmsError, HmsResult};
pub use forecast::{EstimatorKind, Forecast, ForecastBasis, Forecaster};
pub use hms_types::{FacilityCode, NonEmptyText, TextError};
pub use repositories::appointments::{
    Appointment, AppointmentService, AppointmentStatus, BookingOutcome, BookingRequest,
};
pub use repositories::patients::{NewPatient, Patient, RegistrationService};
pub use repositories::ward::{
    BedOccupancy, InpatientRecord, NewInpatient, NewOutpatientVisit, OutpatientRecord,
    WardService,
};
pub use reset::{DailyResetJob, ResetReport};
pub use series::{CountSource, CsvCountSource, DailyCountSeries, RecordCountSource, ResourceKind};
pub use token::{PriorityClass, TokenAllocator, TokenAssignment};
