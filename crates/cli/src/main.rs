use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use hms_core::{
    AppointmentService, BookingOutcome, BookingRequest, CoreConfig, CountSource, CsvCountSource,
    DailyResetJob, DashboardService, Database, EstimatorKind, ForecastBasis, Forecaster,
    NewInpatient, NewOutpatientVisit, NewPatient, NonEmptyText, RecordCountSource,
    RegistrationService, ResourceKind, WardService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hms")]
#[command(about = "Hospital management system CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset the tokens of appointments not yet reset today
    ResetTokens,
    /// Mark booked appointments from earlier days as completed
    CompletePast,
    /// Register a patient and issue an admission number
    Register {
        name: String,
        /// Date of birth (YYYY-MM-DD)
        date_of_birth: NaiveDate,
        gender: String,
        contact: String,
        national_id: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long)]
        differently_abled: bool,
    },
    /// Book today's appointment
    Book {
        admission_number: String,
        symptom: String,
        #[arg(long)]
        pregnant: bool,
        #[arg(long)]
        differently_abled: bool,
    },
    /// Show the appointment queue for a day
    Queue {
        /// Day to show (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Admit a patient to a bed
    Admit {
        admission_number: String,
        bed_number: u32,
        case_type: String,
        /// Admission date (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        plan: String,
    },
    /// Discharge an inpatient record
    Discharge {
        record_id: i64,
        /// Discharge date (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Record an outpatient visit
    Visit {
        admission_number: String,
        symptoms: String,
        #[arg(long, default_value = "")]
        diagnosis: String,
        #[arg(long, default_value = "")]
        prescription: String,
        /// Visit date (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        next_visit: Option<NaiveDate>,
    },
    /// Forecast tomorrow's count for one resource
    Forecast {
        #[arg(long)]
        resource: ResourceKind,
        /// linear-trend or moving-average (default from configuration)
        #[arg(long)]
        estimator: Option<EstimatorKind>,
        /// Date,Count CSV to read instead of the configured source
        #[arg(long)]
        series: Option<PathBuf>,
        /// Moving-average window in days (default from configuration)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        window: Option<u32>,
    },
    /// Show tomorrow's forecast and bed availability
    Dashboard,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hms=info".parse()?)
                .add_directive("hms_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'hms --help' for commands");
        return Ok(());
    };

    let cfg = Arc::new(CoreConfig::resolve(|key| std::env::var(key).ok())?);
    let db = Arc::new(Database::open(cfg.database_path())?);
    let today = Local::now().date_naive();

    match command {
        Commands::ResetTokens => {
            let report = DailyResetJob::new(db).run(today)?;
            println!(
                "Successfully reset the tokens. ({} appointment(s) reset)",
                report.appointments_reset
            );
        }
        Commands::CompletePast => {
            let completed = AppointmentService::new(db).complete_past(today)?;
            println!("Marked {completed} past appointment(s) as completed.");
        }
        Commands::Register {
            name,
            date_of_birth,
            gender,
            contact,
            national_id,
            address,
            differently_abled,
        } => {
            let patient = RegistrationService::new(db, cfg).register(
                NewPatient {
                    name: NonEmptyText::new(name)?,
                    date_of_birth,
                    gender: NonEmptyText::new(gender)?,
                    contact: NonEmptyText::new(contact)?,
                    is_differently_abled: differently_abled,
                    national_id: NonEmptyText::new(national_id)?,
                    address,
                },
                today,
            )?;
            println!(
                "Registered {} with admission number {}",
                patient.name, patient.admission_number
            );
        }
        Commands::Book {
            admission_number,
            symptom,
            pregnant,
            differently_abled,
        } => {
            let outcome = AppointmentService::new(db).book(
                BookingRequest {
                    admission_number,
                    symptom: NonEmptyText::new(symptom)?,
                    is_pregnant: pregnant,
                    is_differently_abled: differently_abled,
                },
                today,
            )?;
            match outcome {
                BookingOutcome::Booked {
                    appointment,
                    overflowed,
                } => {
                    println!(
                        "Booked for {}: token {}{}",
                        appointment.appointment_date,
                        appointment.token_number,
                        if overflowed {
                            " (priority tokens exhausted)"
                        } else {
                            ""
                        }
                    );
                }
                BookingOutcome::AlreadyBooked(existing) => {
                    println!(
                        "You already have an appointment today: token {}",
                        existing.token_number
                    );
                }
            }
        }
        Commands::Queue { date } => {
            let date = date.unwrap_or(today);
            let appointments = AppointmentService::new(db).appointments_on(date)?;
            if appointments.is_empty() {
                println!("No appointments on {date}.");
            } else {
                for a in appointments {
                    println!(
                        "Token {:>3}  {}  {}{}  {:?}",
                        a.token_number,
                        a.admission_number,
                        a.symptom,
                        if a.is_priority { "  [priority]" } else { "" },
                        a.status
                    );
                }
            }
        }
        Commands::Admit {
            admission_number,
            bed_number,
            case_type,
            date,
            plan,
        } => {
            let record = WardService::new(db, cfg).admit_inpatient(NewInpatient {
                admission_number,
                bed_number,
                case_type: NonEmptyText::new(case_type)?,
                admitted_date: date.unwrap_or(today),
                treatment_plan: plan,
            })?;
            println!(
                "Admitted to bed {} (record {})",
                record.bed_number, record.id
            );
        }
        Commands::Discharge { record_id, date } => {
            let record = WardService::new(db, cfg).discharge(record_id, date.unwrap_or(today))?;
            println!("Discharged record {} from bed {}", record.id, record.bed_number);
        }
        Commands::Visit {
            admission_number,
            symptoms,
            diagnosis,
            prescription,
            date,
            next_visit,
        } => {
            let record = WardService::new(db, cfg).record_outpatient_visit(NewOutpatientVisit {
                admission_number,
                visit_date: date.unwrap_or(today),
                symptoms: NonEmptyText::new(symptoms)?,
                diagnosis,
                prescription,
                next_visit_date: next_visit,
            })?;
            println!("Recorded visit {} on {}", record.id, record.visit_date);
        }
        Commands::Forecast {
            resource,
            estimator,
            series,
            window,
        } => {
            let settings = cfg.forecast_settings(resource);
            let source: Box<dyn CountSource> = match series.or_else(|| settings.series_path.clone()) {
                Some(path) => Box::new(CsvCountSource::new(path)),
                None => Box::new(RecordCountSource::new(db)),
            };
            let forecaster = Forecaster::new(
                resource,
                estimator.unwrap_or(settings.estimator),
                window.unwrap_or(cfg.forecast_window_days()),
            );

            let forecast = forecaster.forecast(&source.daily_counts(resource)?, today);
            let basis = match forecast.basis {
                ForecastBasis::Estimated => "",
                ForecastBasis::Defaulted => " (no history, default)",
            };
            println!(
                "Predicted {}s tomorrow: {} [{}]{}",
                resource, forecast.predicted, forecast.estimator, basis
            );
        }
        Commands::Dashboard => {
            let summary = DashboardService::new(db, cfg).summary(today)?;
            println!("Predicted outpatients tomorrow: {}", summary.predicted_outpatients);
            println!(
                "Beds: {} total, {} occupied, {} available",
                summary.total_beds, summary.occupied_beds, summary.available_beds
            );
            println!("{}", summary.message);
        }
    }

    Ok(())
}
