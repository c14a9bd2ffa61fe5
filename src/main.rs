use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use hms_core::{AppointmentService, CoreConfig, DailyResetJob, Database};

/// Used when the next midnight cannot be resolved in the local time zone.
const FALLBACK_RETRY: Duration = Duration::from_secs(60 * 60);

/// Main entry point for the HMS application
///
/// Runs two tasks concurrently:
/// - the REST server on port 3000 (configurable via HMS_REST_ADDR)
/// - the daily scheduler, which resets stale tokens and completes past appointments at
///   start-up and again just after every local midnight
///
/// # Environment Variables
/// - `HMS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `HMS_*`: core configuration, see `hms_core::config`
///
/// # Returns
/// * `Ok(())` - After a Ctrl-C shutdown
/// * `Err(anyhow::Error)` - If start-up or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hms=info".parse()?)
                .add_directive("hms_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("HMS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::resolve(|key| std::env::var(key).ok())?);
    let db = Arc::new(Database::open(cfg.database_path())?);

    tracing::info!(
        facility = %cfg.facility_code(),
        database = %cfg.database_path().display(),
        "++ Starting HMS REST on {}",
        rest_addr
    );

    let scheduler = tokio::spawn(run_scheduler(db.clone()));

    let rest_app = router(AppState::new(db, cfg));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, rest_app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutdown requested");
        })
        .await?;

    scheduler.abort();
    Ok(())
}

/// Runs the daily jobs now, then after each local midnight, until aborted.
async fn run_scheduler(db: Arc<Database>) {
    let reset_job = DailyResetJob::new(db.clone());
    let appointments = AppointmentService::new(db);

    loop {
        run_daily_jobs(&reset_job, &appointments, Local::now().date_naive());

        let wait = until_next_midnight(Local::now()).unwrap_or(FALLBACK_RETRY);
        tracing::debug!(seconds = wait.as_secs(), "next daily run scheduled");
        tokio::time::sleep(wait).await;
    }
}

fn run_daily_jobs(reset_job: &DailyResetJob, appointments: &AppointmentService, today: NaiveDate) {
    if let Err(e) = reset_job.run(today) {
        tracing::error!("Daily token reset failed: {:?}", e);
    }

    if let Err(e) = appointments.complete_past(today) {
        tracing::error!("Completing past appointments failed: {:?}", e);
    }
}

/// Time from `now` until one second past the next midnight in `now`'s time zone.
///
/// Returns `None` when that midnight does not exist locally (a DST gap at 00:00).
fn until_next_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> Option<Duration> {
    let tomorrow = now.date_naive().succ_opt()?;
    let midnight = tomorrow
        .and_hms_opt(0, 0, 1)?
        .and_local_timezone(now.timezone())
        .earliest()?;
    midnight.signed_duration_since(now).to_std().ok()
}
