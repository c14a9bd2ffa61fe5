//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The core never reads process-wide environment variables itself:
//! [`CoreConfig::resolve`] takes a lookup function, which binaries back with `std::env::var`
//! and tests back with a map.

use crate::constants::{
    DEFAULT_DATABASE_PATH, DEFAULT_FACILITY_CODE, DEFAULT_FORECAST_WINDOW_DAYS,
    DEFAULT_TOTAL_BEDS,
};
use crate::error::{HmsError, HmsResult};
use crate::forecast::{EstimatorKind, Forecaster};
use crate::series::ResourceKind;
use hms_types::FacilityCode;
use std::path::{Path, PathBuf};

pub const ENV_DATABASE: &str = "HMS_DATABASE";
pub const ENV_FACILITY_CODE: &str = "HMS_FACILITY_CODE";
pub const ENV_TOTAL_BEDS: &str = "HMS_TOTAL_BEDS";
pub const ENV_FORECAST_WINDOW_DAYS: &str = "HMS_FORECAST_WINDOW_DAYS";
pub const ENV_INPATIENT_ESTIMATOR: &str = "HMS_INPATIENT_ESTIMATOR";
pub const ENV_OUTPATIENT_ESTIMATOR: &str = "HMS_OUTPATIENT_ESTIMATOR";
pub const ENV_INPATIENT_SERIES: &str = "HMS_INPATIENT_SERIES";
pub const ENV_OUTPATIENT_SERIES: &str = "HMS_OUTPATIENT_SERIES";

/// How one resource is forecast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForecastSettings {
    pub estimator: EstimatorKind,
    /// CSV history for this resource; `None` aggregates the stored ward records.
    pub series_path: Option<PathBuf>,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            estimator: EstimatorKind::MovingAverage,
            series_path: None,
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    facility_code: FacilityCode,
    total_beds: u32,
    forecast_window_days: u32,
    inpatient: ForecastSettings,
    outpatient: ForecastSettings,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        database_path: PathBuf,
        facility_code: FacilityCode,
        total_beds: u32,
        forecast_window_days: u32,
        inpatient: ForecastSettings,
        outpatient: ForecastSettings,
    ) -> HmsResult<Self> {
        if total_beds == 0 {
            return Err(HmsError::InvalidInput("total_beds must be at least 1".into()));
        }
        if forecast_window_days == 0 {
            return Err(HmsError::InvalidInput(
                "forecast window must be at least 1 day".into(),
            ));
        }

        Ok(Self {
            database_path,
            facility_code,
            total_beds,
            forecast_window_days,
            inpatient,
            outpatient,
        })
    }

    /// Resolves configuration from `lookup`, applying defaults for unset keys.
    ///
    /// Empty or whitespace-only values count as unset.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> HmsResult<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_path = get(ENV_DATABASE)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
        let facility_code = FacilityCode::new(
            get(ENV_FACILITY_CODE).unwrap_or_else(|| DEFAULT_FACILITY_CODE.into()),
        )?;
        let total_beds = positive_from_value(ENV_TOTAL_BEDS, get(ENV_TOTAL_BEDS), DEFAULT_TOTAL_BEDS)?;
        let forecast_window_days = positive_from_value(
            ENV_FORECAST_WINDOW_DAYS,
            get(ENV_FORECAST_WINDOW_DAYS),
            DEFAULT_FORECAST_WINDOW_DAYS,
        )?;

        let inpatient = ForecastSettings {
            estimator: estimator_from_value(get(ENV_INPATIENT_ESTIMATOR))?,
            series_path: get(ENV_INPATIENT_SERIES).map(PathBuf::from),
        };
        let outpatient = ForecastSettings {
            estimator: estimator_from_value(get(ENV_OUTPATIENT_ESTIMATOR))?,
            series_path: get(ENV_OUTPATIENT_SERIES).map(PathBuf::from),
        };

        Self::new(
            database_path,
            facility_code,
            total_beds,
            forecast_window_days,
            inpatient,
            outpatient,
        )
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn facility_code(&self) -> &FacilityCode {
        &self.facility_code
    }

    pub fn total_beds(&self) -> u32 {
        self.total_beds
    }

    pub fn forecast_window_days(&self) -> u32 {
        self.forecast_window_days
    }

    pub fn forecast_settings(&self, resource: ResourceKind) -> &ForecastSettings {
        match resource {
            ResourceKind::Inpatient => &self.inpatient,
            ResourceKind::Outpatient => &self.outpatient,
        }
    }

    /// The configured forecaster for `resource`.
    pub fn forecaster(&self, resource: ResourceKind) -> Forecaster {
        Forecaster::new(
            resource,
            self.forecast_settings(resource).estimator,
            self.forecast_window_days,
        )
    }
}

/// Parse an estimator name, defaulting to the moving average when unset.
pub fn estimator_from_value(value: Option<String>) -> HmsResult<EstimatorKind> {
    value
        .map(|v| v.parse::<EstimatorKind>())
        .transpose()
        .map(|parsed| parsed.unwrap_or(EstimatorKind::MovingAverage))
}

fn positive_from_value(key: &str, value: Option<String>, default: u32) -> HmsResult<u32> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(HmsError::InvalidInput(format!(
            "{key} must be a positive integer, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_resolve_defaults() {
        let cfg = CoreConfig::resolve(lookup(&[])).expect("defaults should resolve");

        assert_eq!(cfg.database_path(), Path::new(DEFAULT_DATABASE_PATH));
        assert_eq!(cfg.facility_code().as_str(), "HOSP01");
        assert_eq!(cfg.total_beds(), 50);
        assert_eq!(cfg.forecast_window_days(), 14);
        assert_eq!(
            cfg.forecast_settings(ResourceKind::Inpatient),
            &ForecastSettings::default()
        );
    }

    #[test]
    fn test_resolve_reads_overrides() {
        let cfg = CoreConfig::resolve(lookup(&[
            (ENV_DATABASE, "/var/lib/hms/hms.db"),
            (ENV_FACILITY_CODE, "clinic7"),
            (ENV_TOTAL_BEDS, "120"),
            (ENV_FORECAST_WINDOW_DAYS, "7"),
            (ENV_INPATIENT_ESTIMATOR, "linear-trend"),
            (ENV_INPATIENT_SERIES, "data/inpatients.csv"),
            (ENV_OUTPATIENT_ESTIMATOR, "  "),
        ]))
        .expect("overrides should resolve");

        assert_eq!(cfg.facility_code().as_str(), "CLINIC7");
        assert_eq!(cfg.total_beds(), 120);

        let inpatient = cfg.forecast_settings(ResourceKind::Inpatient);
        assert_eq!(inpatient.estimator, EstimatorKind::LinearTrend);
        assert_eq!(
            inpatient.series_path.as_deref(),
            Some(Path::new("data/inpatients.csv"))
        );

        let outpatient = cfg.forecaster(ResourceKind::Outpatient);
        assert_eq!(outpatient.estimator(), EstimatorKind::MovingAverage);
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        for pairs in [
            [(ENV_TOTAL_BEDS, "0")],
            [(ENV_TOTAL_BEDS, "many")],
            [(ENV_FORECAST_WINDOW_DAYS, "-3")],
            [(ENV_INPATIENT_ESTIMATOR, "oracle")],
        ] {
            let err = CoreConfig::resolve(lookup(&pairs)).expect_err("invalid value should be rejected");
            assert!(matches!(err, HmsError::InvalidInput(_)), "unexpected error: {err:?}");
        }

        let err = CoreConfig::resolve(lookup(&[(ENV_FACILITY_CODE, "HOSP%")]))
            .expect_err("wildcard facility code should be rejected");
        assert!(matches!(err, HmsError::Text(_)));
    }
}
