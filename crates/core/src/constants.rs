//! Constants used throughout the HMS core crate.
//!
//! Policy values for token allocation and forecasting live here so the
//! allocators, the reset job and the dashboard agree on them.

/// Default SQLite database file when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "hms.sqlite3";

/// Default facility code used to prefix admission numbers.
pub const DEFAULT_FACILITY_CODE: &str = "HOSP01";

/// Default number of beds in the facility.
pub const DEFAULT_TOTAL_BEDS: u32 = 50;

/// Default trailing window, in days, for the moving-average estimator.
pub const DEFAULT_FORECAST_WINDOW_DAYS: u32 = 14;

/// Number of digits in the serial part of an admission number.
pub const ADMISSION_SERIAL_DIGITS: usize = 6;

/// Largest serial that fits in [`ADMISSION_SERIAL_DIGITS`] digits.
pub const ADMISSION_SERIAL_MAX: u32 = 999_999;

/// Highest token in the priority range `[1, PRIORITY_TOKEN_MAX]`.
pub const PRIORITY_TOKEN_MAX: u32 = 10;

/// Token value written by the daily reset job for stale appointments.
pub const RESET_TOKEN: u32 = 0;

/// Age (in completed years) from which a patient books in the priority class.
pub const PRIORITY_AGE_YEARS: u32 = 60;

/// Moving-average fallback when the window has no inpatient observations.
pub const DEFAULT_INPATIENT_FORECAST: u32 = 2;

/// Moving-average fallback when the window has no outpatient observations.
pub const DEFAULT_OUTPATIENT_FORECAST: u32 = 5;

/// Busy timeout applied to every SQLite connection, in milliseconds.
pub const DATABASE_BUSY_TIMEOUT_MS: u64 = 5_000;
