//! JSON messages exchanged over the REST API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    /// The conflicting appointment, when a same-day booking already exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment: Option<AppointmentRes>,
}

impl ErrorRes {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            appointment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegisterPatientReq {
    pub name: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    pub gender: String,
    pub contact: String,
    #[serde(default)]
    pub is_differently_abled: bool,
    pub national_id: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub admission_number: String,
    pub name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub contact: String,
    pub is_differently_abled: bool,
    pub national_id: String,
    pub address: String,
    /// RFC 3339 timestamp.
    pub registered_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookAppointmentReq {
    pub admission_number: String,
    pub symptom: String,
    #[serde(default)]
    pub is_pregnant: bool,
    #[serde(default)]
    pub is_differently_abled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AppointmentRes {
    pub id: i64,
    pub admission_number: String,
    pub appointment_date: String,
    pub symptom: String,
    pub token_number: u32,
    pub is_priority: bool,
    /// `Booked` or `Completed`.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookAppointmentRes {
    pub appointment: AppointmentRes,
    /// True when a priority patient was queued in the normal range because 1..=10 were taken.
    pub overflowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AppointmentListRes {
    pub date: String,
    pub appointments: Vec<AppointmentRes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdmitInpatientReq {
    pub admission_number: String,
    pub bed_number: u32,
    pub case_type: String,
    /// Defaults to today.
    #[serde(default)]
    pub admitted_date: Option<String>,
    #[serde(default)]
    pub treatment_plan: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DischargeReq {
    /// Defaults to today.
    #[serde(default)]
    pub discharged_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InpatientRes {
    pub id: i64,
    pub patient_id: i64,
    pub bed_number: u32,
    pub case_type: String,
    pub admitted_date: String,
    pub discharged_date: Option<String>,
    pub treatment_plan: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OutpatientVisitReq {
    pub admission_number: String,
    /// Defaults to today.
    #[serde(default)]
    pub visit_date: Option<String>,
    pub symptoms: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub prescription: String,
    #[serde(default)]
    pub next_visit_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OutpatientRes {
    pub id: i64,
    pub patient_id: i64,
    pub visit_date: String,
    pub symptoms: String,
    pub diagnosis: String,
    pub prescription: String,
    pub next_visit_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DashboardRes {
    pub predicted_inpatients: u32,
    pub predicted_outpatients: u32,
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub available_beds: u32,
    pub extra_beds_needed: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResetTokensRes {
    pub today: String,
    pub appointments_reset: usize,
    pub counters_pruned: usize,
    pub message: String,
}
