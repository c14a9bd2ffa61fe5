//! # API REST
//!
//! REST API implementation for HMS.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `api-shared` for the JSON messages and `hms-core` for every operation. The router is
//! built here so that both the standalone `hms-api-rest` binary and the combined `hms-run`
//! binary serve the same API.

#![warn(rust_2018_idioms)]

use api_shared::{
    AdmitInpatientReq, AppointmentListRes, AppointmentRes, BookAppointmentReq, BookAppointmentRes,
    DashboardRes, DischargeReq, ErrorRes, HealthRes, HealthService, InpatientRes,
    OutpatientRes, OutpatientVisitReq, PatientRes, RegisterPatientReq, ResetTokensRes,
};
use axum::{
    body::Bytes,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use hms_core::{
    Appointment, AppointmentService, BookingOutcome, BookingRequest, CoreConfig, DailyResetJob,
    DashboardService, DashboardSummary, Database, HmsError, InpatientRecord, NewInpatient,
    NewOutpatientVisit, NewPatient, NonEmptyText, OutpatientRecord, Patient,
    RegistrationService, TextError, WardService,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Supplies the current local date to handlers.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Application state for the REST API server
///
/// Contains the core services shared by all request handlers. Every service holds the same
/// `Arc<Database>`, so allocations made through any of them are serialized by the store.
#[derive(Clone)]
pub struct AppState {
    registration: RegistrationService,
    appointments: AppointmentService,
    ward: WardService,
    dashboard: DashboardService,
    reset_job: DailyResetJob,
    today: Clock,
}

impl AppState {
    pub fn new(db: Arc<Database>, cfg: Arc<CoreConfig>) -> Self {
        Self::with_clock(db, cfg, Arc::new(|| Local::now().date_naive()))
    }

    pub fn with_clock(db: Arc<Database>, cfg: Arc<CoreConfig>, today: Clock) -> Self {
        Self {
            registration: RegistrationService::new(db.clone(), cfg.clone()),
            appointments: AppointmentService::new(db.clone()),
            ward: WardService::new(db.clone(), cfg.clone()),
            dashboard: DashboardService::new(db.clone(), cfg),
            reset_job: DailyResetJob::new(db),
            today,
        }
    }

    fn today(&self) -> NaiveDate {
        (self.today)()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        register_patient,
        get_patient,
        book_appointment,
        todays_appointments,
        admit_inpatient,
        discharge_inpatient,
        record_outpatient_visit,
        dashboard,
        reset_tokens,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        RegisterPatientReq,
        PatientRes,
        BookAppointmentReq,
        BookAppointmentRes,
        AppointmentRes,
        AppointmentListRes,
        AdmitInpatientReq,
        DischargeReq,
        InpatientRes,
        OutpatientVisitReq,
        OutpatientRes,
        DashboardRes,
        ResetTokensRes,
    ))
)]
pub struct ApiDoc;

/// Builds the full API router, including Swagger UI and the OpenAPI document.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients", post(register_patient))
        .route("/patients/:admission_number", get(get_patient))
        .route("/appointments", post(book_appointment))
        .route("/appointments/today", get(todays_appointments))
        .route("/inpatients", post(admit_inpatient))
        .route("/inpatients/:id/discharge", post(discharge_inpatient))
        .route("/outpatients", post(record_outpatient_visit))
        .route("/dashboard", get(dashboard))
        .route("/jobs/reset-tokens", post(reset_tokens))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Failure of a REST request, rendered as an [`ErrorRes`] body.
#[derive(Debug)]
pub enum ApiError {
    Core(HmsError),
    BadRequest(String),
    AlreadyBooked(AppointmentRes),
}

impl From<HmsError> for ApiError {
    fn from(err: HmsError) -> Self {
        ApiError::Core(err)
    }
}

impl From<TextError> for ApiError {
    fn from(err: TextError) -> Self {
        ApiError::Core(HmsError::Text(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, ErrorRes::new(message)),
            ApiError::AlreadyBooked(appointment) => (
                StatusCode::CONFLICT,
                ErrorRes {
                    error: "patient already has an appointment today".into(),
                    appointment: Some(appointment),
                },
            ),
            ApiError::Core(err) => {
                let status = match &err {
                    HmsError::InvalidInput(_) | HmsError::Text(_) => StatusCode::BAD_REQUEST,
                    HmsError::PatientNotFound(_) | HmsError::InpatientNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    HmsError::AlreadyRegistered(_) | HmsError::BedOccupied(_) => {
                        StatusCode::CONFLICT
                    }
                    HmsError::AdmissionCapacityExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Request failed: {:?}", err);
                    (status, ErrorRes::new("Internal error"))
                } else {
                    (status, ErrorRes::new(err.to_string()))
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_date(field: &str, value: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("{field} must be a YYYY-MM-DD date, got '{value}'")))
}

fn parse_optional_date(field: &str, value: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_date(field, v))
        .transpose()
}

fn patient_res(patient: Patient) -> PatientRes {
    PatientRes {
        admission_number: patient.admission_number.to_string(),
        name: patient.name,
        date_of_birth: patient.date_of_birth.to_string(),
        gender: patient.gender,
        contact: patient.contact,
        is_differently_abled: patient.is_differently_abled,
        national_id: patient.national_id,
        address: patient.address,
        registered_at: patient.registered_at.to_rfc3339(),
    }
}

fn appointment_res(appointment: Appointment) -> AppointmentRes {
    AppointmentRes {
        id: appointment.id,
        admission_number: appointment.admission_number.to_string(),
        appointment_date: appointment.appointment_date.to_string(),
        symptom: appointment.symptom,
        token_number: appointment.token_number,
        is_priority: appointment.is_priority,
        status: appointment.status.as_str().to_string(),
    }
}

fn inpatient_res(record: InpatientRecord) -> InpatientRes {
    InpatientRes {
        id: record.id,
        patient_id: record.patient_id,
        bed_number: record.bed_number,
        case_type: record.case_type,
        admitted_date: record.admitted_date.to_string(),
        discharged_date: record.discharged_date.map(|d| d.to_string()),
        treatment_plan: record.treatment_plan,
    }
}

fn outpatient_res(record: OutpatientRecord) -> OutpatientRes {
    OutpatientRes {
        id: record.id,
        patient_id: record.patient_id,
        visit_date: record.visit_date.to_string(),
        symptoms: record.symptoms,
        diagnosis: record.diagnosis,
        prescription: record.prescription,
        next_visit_date: record.next_visit_date.map(|d| d.to_string()),
    }
}

fn dashboard_res(summary: DashboardSummary) -> DashboardRes {
    DashboardRes {
        predicted_inpatients: summary.predicted_inpatients,
        predicted_outpatients: summary.predicted_outpatients,
        total_beds: summary.total_beds,
        occupied_beds: summary.occupied_beds,
        available_beds: summary.available_beds,
        extra_beds_needed: summary.extra_beds_needed,
        message: summary.message,
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = RegisterPatientReq,
    responses(
        (status = 201, description = "Patient registered", body = PatientRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 409, description = "National id already registered", body = ErrorRes),
        (status = 503, description = "Admission numbers exhausted for this year", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Register a new patient
///
/// Issues the patient's admission number for the current year.
#[axum::debug_handler]
async fn register_patient(
    State(state): State<AppState>,
    Json(req): Json<RegisterPatientReq>,
) -> ApiResult<(StatusCode, Json<PatientRes>)> {
    let patient = NewPatient {
        name: NonEmptyText::new(&req.name)?,
        date_of_birth: parse_date("date_of_birth", &req.date_of_birth)?,
        gender: NonEmptyText::new(&req.gender)?,
        contact: NonEmptyText::new(&req.contact)?,
        is_differently_abled: req.is_differently_abled,
        national_id: NonEmptyText::new(&req.national_id)?,
        address: req.address,
    };

    let registered = state.registration.register(patient, state.today())?;
    Ok((StatusCode::CREATED, Json(patient_res(registered))))
}

#[utoipa::path(
    get,
    path = "/patients/{admission_number}",
    params(("admission_number" = String, Path, description = "Admission number")),
    responses(
        (status = 200, description = "Patient found", body = PatientRes),
        (status = 404, description = "Unknown admission number", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_patient(
    State(state): State<AppState>,
    AxumPath(admission_number): AxumPath<String>,
) -> ApiResult<Json<PatientRes>> {
    let patient = state
        .registration
        .find_by_admission_number(&admission_number)?
        .ok_or(HmsError::PatientNotFound(admission_number))?;
    Ok(Json(patient_res(patient)))
}

#[utoipa::path(
    post,
    path = "/appointments",
    request_body = BookAppointmentReq,
    responses(
        (status = 201, description = "Appointment booked", body = BookAppointmentRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown admission number", body = ErrorRes),
        (status = 409, description = "Already booked today; body carries the existing appointment", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Book today's appointment and issue a queue token
///
/// Patients aged 60 or over, pregnant, or differently abled receive tokens 1..=10 while
/// they last; everyone else is queued from 11.
#[axum::debug_handler]
async fn book_appointment(
    State(state): State<AppState>,
    Json(req): Json<BookAppointmentReq>,
) -> ApiResult<(StatusCode, Json<BookAppointmentRes>)> {
    let request = BookingRequest {
        admission_number: req.admission_number.trim().to_string(),
        symptom: NonEmptyText::new(&req.symptom)?,
        is_pregnant: req.is_pregnant,
        is_differently_abled: req.is_differently_abled,
    };

    match state.appointments.book(request, state.today())? {
        BookingOutcome::Booked {
            appointment,
            overflowed,
        } => Ok((
            StatusCode::CREATED,
            Json(BookAppointmentRes {
                appointment: appointment_res(appointment),
                overflowed,
            }),
        )),
        BookingOutcome::AlreadyBooked(existing) => {
            Err(ApiError::AlreadyBooked(appointment_res(existing)))
        }
    }
}

#[utoipa::path(
    get,
    path = "/appointments/today",
    responses(
        (status = 200, description = "Today's queue ordered by token", body = AppointmentListRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn todays_appointments(State(state): State<AppState>) -> ApiResult<Json<AppointmentListRes>> {
    let today = state.today();
    let appointments = state
        .appointments
        .appointments_on(today)?
        .into_iter()
        .map(appointment_res)
        .collect();
    Ok(Json(AppointmentListRes {
        date: today.to_string(),
        appointments,
    }))
}

#[utoipa::path(
    post,
    path = "/inpatients",
    request_body = AdmitInpatientReq,
    responses(
        (status = 201, description = "Inpatient admitted", body = InpatientRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown admission number", body = ErrorRes),
        (status = 409, description = "Bed occupied", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn admit_inpatient(
    State(state): State<AppState>,
    Json(req): Json<AdmitInpatientReq>,
) -> ApiResult<(StatusCode, Json<InpatientRes>)> {
    let admitted_date =
        parse_optional_date("admitted_date", req.admitted_date.as_deref())?.unwrap_or(state.today());
    let record = state.ward.admit_inpatient(NewInpatient {
        admission_number: req.admission_number.trim().to_string(),
        bed_number: req.bed_number,
        case_type: NonEmptyText::new(&req.case_type)?,
        admitted_date,
        treatment_plan: req.treatment_plan,
    })?;
    Ok((StatusCode::CREATED, Json(inpatient_res(record))))
}

#[utoipa::path(
    post,
    path = "/inpatients/{id}/discharge",
    params(("id" = i64, Path, description = "Inpatient record id")),
    request_body = DischargeReq,
    responses(
        (status = 200, description = "Inpatient discharged", body = InpatientRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown inpatient record", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Discharge an inpatient, freeing their bed
///
/// The body is optional; without a date the discharge is recorded for today. A body that is
/// present but not a valid `DischargeReq` is rejected.
#[axum::debug_handler]
async fn discharge_inpatient(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
    body: Bytes,
) -> ApiResult<Json<InpatientRes>> {
    let requested = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let Json(req) = Json::<DischargeReq>::from_bytes(&body)
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        req.discharged_date
    };
    let date = parse_optional_date("discharged_date", requested.as_deref())?
        .unwrap_or(state.today());
    let record = state.ward.discharge(id, date)?;
    Ok(Json(inpatient_res(record)))
}

#[utoipa::path(
    post,
    path = "/outpatients",
    request_body = OutpatientVisitReq,
    responses(
        (status = 201, description = "Visit recorded", body = OutpatientRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown admission number", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn record_outpatient_visit(
    State(state): State<AppState>,
    Json(req): Json<OutpatientVisitReq>,
) -> ApiResult<(StatusCode, Json<OutpatientRes>)> {
    let visit_date =
        parse_optional_date("visit_date", req.visit_date.as_deref())?.unwrap_or(state.today());
    let record = state.ward.record_outpatient_visit(NewOutpatientVisit {
        admission_number: req.admission_number.trim().to_string(),
        visit_date,
        symptoms: NonEmptyText::new(&req.symptoms)?,
        diagnosis: req.diagnosis,
        prescription: req.prescription,
        next_visit_date: parse_optional_date("next_visit_date", req.next_visit_date.as_deref())?,
    })?;
    Ok((StatusCode::CREATED, Json(outpatient_res(record))))
}

#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Next-day forecast and bed availability", body = DashboardRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardRes>> {
    let summary = state.dashboard.summary(state.today())?;
    Ok(Json(dashboard_res(summary)))
}

#[utoipa::path(
    post,
    path = "/jobs/reset-tokens",
    responses(
        (status = 200, description = "Stale tokens reset", body = ResetTokensRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Run the daily token reset now
///
/// Safe to call repeatedly; appointments already reset today are untouched.
#[axum::debug_handler]
async fn reset_tokens(State(state): State<AppState>) -> ApiResult<Json<ResetTokensRes>> {
    let report = state.reset_job.run(state.today())?;
    Ok(Json(ResetTokensRes {
        today: report.today.to_string(),
        appointments_reset: report.appointments_reset,
        counters_pruned: report.counters_pruned,
        message: "Successfully reset the tokens.".into(),
    }))
}
