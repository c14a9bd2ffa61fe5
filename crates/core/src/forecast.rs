//! Next-day demand forecasting.
//!
//! Two interchangeable estimators work on a [`DailyCountSeries`]:
//!
//! - [`LinearTrend`]: least-squares line over the whole history, `count ≈ a + b·i` with
//!   `i = 0, 1, 2, ...` in date order, evaluated at `i = n`.
//! - [`MovingAverage`]: floor of the mean of the counts observed in the trailing window.
//!
//! A [`Forecaster`] binds one estimator to one resource. When the estimator has nothing to
//! work with, the forecast falls back to the resource's fixed default and is marked
//! [`ForecastBasis::Defaulted`]; forecasting never fails.

use crate::constants::{DEFAULT_INPATIENT_FORECAST, DEFAULT_OUTPATIENT_FORECAST};
use crate::error::HmsError;
use crate::series::{DailyCountSeries, ResourceKind};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

impl ResourceKind {
    /// Conservative baseline used when there is no history to estimate from.
    pub fn default_forecast(self) -> u32 {
        match self {
            ResourceKind::Inpatient => DEFAULT_INPATIENT_FORECAST,
            ResourceKind::Outpatient => DEFAULT_OUTPATIENT_FORECAST,
        }
    }
}

/// A demand-prediction strategy.
pub trait Estimator: Send + Sync {
    /// Predicts the next period's count, or `None` when the series gives nothing to
    /// estimate from.
    fn estimate(&self, series: &DailyCountSeries, window: Days, today: NaiveDate) -> Option<u32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrend;

impl Estimator for LinearTrend {
    /// Ignores `window` and `today`: the trend is fitted over the full history.
    fn estimate(&self, series: &DailyCountSeries, _window: Days, _today: NaiveDate) -> Option<u32> {
        let points = series.points();
        if points.is_empty() {
            return None;
        }

        let n = points.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = points.iter().map(|p| f64::from(p.count)).sum::<f64>() / n;

        let (sxx, sxy) = points
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(sxx, sxy), (i, p)| {
                let dx = i as f64 - mean_x;
                (sxx + dx * dx, sxy + dx * (f64::from(p.count) - mean_y))
            });

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = mean_y - slope * mean_x;
        let predicted = intercept + slope * n;

        tracing::debug!(slope, intercept, predicted, "linear trend fitted");
        // Counts cannot go negative; `as` saturates at u32::MAX.
        Some(predicted.round_ties_even().max(0.0) as u32)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MovingAverage;

impl Estimator for MovingAverage {
    fn estimate(&self, series: &DailyCountSeries, window: Days, today: NaiveDate) -> Option<u32> {
        let start = today.checked_sub_days(window).unwrap_or(NaiveDate::MIN);
        let observed = series.since(start);
        if observed.is_empty() {
            return None;
        }

        let total: u64 = observed.iter().map(|p| u64::from(p.count)).sum();
        let mean = total / observed.len() as u64;
        Some(u32::try_from(mean).unwrap_or(u32::MAX))
    }
}

/// Selects an estimator by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EstimatorKind {
    LinearTrend,
    MovingAverage,
}

impl EstimatorKind {
    pub fn estimator(self) -> &'static dyn Estimator {
        match self {
            EstimatorKind::LinearTrend => &LinearTrend,
            EstimatorKind::MovingAverage => &MovingAverage,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EstimatorKind::LinearTrend => "linear-trend",
            EstimatorKind::MovingAverage => "moving-average",
        }
    }
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EstimatorKind {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear-trend" | "linear" | "trend" => Ok(EstimatorKind::LinearTrend),
            "moving-average" | "average" | "mean" => Ok(EstimatorKind::MovingAverage),
            other => Err(HmsError::InvalidInput(format!(
                "unknown estimator '{other}' (expected linear-trend or moving-average)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastBasis {
    /// Computed from observed history.
    Estimated,
    /// No usable history; the resource default was returned.
    Defaulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forecast {
    pub resource: ResourceKind,
    pub predicted: u32,
    /// The estimator that produced `predicted`.
    pub estimator: EstimatorKind,
    pub basis: ForecastBasis,
}

/// Forecasts one resource with one estimator.
#[derive(Debug, Clone, Copy)]
pub struct Forecaster {
    resource: ResourceKind,
    estimator: EstimatorKind,
    window: Days,
}

impl Forecaster {
    pub fn new(resource: ResourceKind, estimator: EstimatorKind, window_days: u32) -> Self {
        Self {
            resource,
            estimator,
            window: Days::new(u64::from(window_days)),
        }
    }

    pub fn estimator(&self) -> EstimatorKind {
        self.estimator
    }

    /// Predicts the count for the day after `today`.
    ///
    /// The linear trend is undefined on an empty series, so such a request is answered by
    /// the moving average, which in turn defaults when its window is empty.
    pub fn forecast(&self, series: &DailyCountSeries, today: NaiveDate) -> Forecast {
        let estimator = match self.estimator {
            EstimatorKind::LinearTrend if series.is_empty() => EstimatorKind::MovingAverage,
            kind => kind,
        };

        let (predicted, basis) = match estimator.estimator().estimate(series, self.window, today) {
            Some(predicted) => (predicted, ForecastBasis::Estimated),
            None => (self.resource.default_forecast(), ForecastBasis::Defaulted),
        };

        tracing::debug!(
            resource = %self.resource,
            estimator = %estimator,
            predicted,
            basis = ?basis,
            observations = series.len(),
            "forecast computed"
        );

        Forecast {
            resource: self.resource,
            predicted,
            estimator,
            basis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("valid test date")
    }

    fn series(start: &str, counts: &[u32]) -> DailyCountSeries {
        let start = day(start);
        DailyCountSeries::from_records(
            counts
                .iter()
                .enumerate()
                .map(|(i, c)| (start + Days::new(i as u64), *c)),
        )
    }

    #[test]
    fn test_linear_trend_on_perfect_line() {
        let s = series("2026-10-01", &[2, 4, 6]);
        let predicted = LinearTrend.estimate(&s, Days::new(14), day("2026-10-03"));
        assert_eq!(predicted, Some(8));
    }

    #[test]
    fn test_linear_trend_single_point_is_flat() {
        let s = series("2026-10-01", &[7]);
        assert_eq!(LinearTrend.estimate(&s, Days::new(14), day("2026-10-01")), Some(7));
    }

    #[test]
    fn test_linear_trend_rounds_half_to_even() {
        // slope 0.5, intercept 0.5: predicts exactly 2.5 at i = 4
        let s = series("2026-10-01", &[0, 1, 3, 1]);
        assert_eq!(LinearTrend.estimate(&s, Days::new(14), day("2026-10-04")), Some(2));

        // slope 0.5, intercept 1.5: predicts exactly 3.5 at i = 4
        let s = series("2026-10-01", &[1, 2, 4, 2]);
        assert_eq!(LinearTrend.estimate(&s, Days::new(14), day("2026-10-04")), Some(4));
    }

    #[test]
    fn test_linear_trend_clamps_negative_predictions() {
        let s = series("2026-10-01", &[9, 6, 3, 0]);
        assert_eq!(LinearTrend.estimate(&s, Days::new(14), day("2026-10-04")), Some(0));
    }

    #[test]
    fn test_linear_trend_empty_series_is_undefined() {
        let s = DailyCountSeries::default();
        assert_eq!(LinearTrend.estimate(&s, Days::new(14), day("2026-10-04")), None);
    }

    #[test]
    fn test_moving_average_floors_mean() {
        let s = series("2026-10-14", &[3, 5, 4]);
        assert_eq!(MovingAverage.estimate(&s, Days::new(14), day("2026-10-16")), Some(4));
    }

    #[test]
    fn test_moving_average_ignores_days_outside_window() {
        let mut records = vec![(day("2026-09-01"), 100)];
        records.extend([(day("2026-10-10"), 2), (day("2026-10-15"), 3)]);
        let s = DailyCountSeries::from_records(records);
        assert_eq!(MovingAverage.estimate(&s, Days::new(14), day("2026-10-16")), Some(2));
    }

    #[test]
    fn test_moving_average_window_start_is_inclusive() {
        let s = DailyCountSeries::from_records([(day("2026-10-02"), 9)]);
        assert_eq!(MovingAverage.estimate(&s, Days::new(14), day("2026-10-16")), Some(9));
        assert_eq!(MovingAverage.estimate(&s, Days::new(13), day("2026-10-16")), None);
    }

    #[test]
    fn test_forecaster_defaults_per_resource_on_empty_window() {
        let empty = DailyCountSeries::default();
        let today = day("2026-10-16");

        let inpatient = Forecaster::new(ResourceKind::Inpatient, EstimatorKind::MovingAverage, 14)
            .forecast(&empty, today);
        assert_eq!(inpatient.predicted, 2);
        assert_eq!(inpatient.basis, ForecastBasis::Defaulted);

        let outpatient = Forecaster::new(ResourceKind::Outpatient, EstimatorKind::MovingAverage, 14)
            .forecast(&empty, today);
        assert_eq!(outpatient.predicted, 5);
        assert_eq!(outpatient.basis, ForecastBasis::Defaulted);
    }

    #[test]
    fn test_forecaster_routes_empty_linear_trend_to_moving_average() {
        let forecast = Forecaster::new(ResourceKind::Outpatient, EstimatorKind::LinearTrend, 14)
            .forecast(&DailyCountSeries::default(), day("2026-10-16"));

        assert_eq!(forecast.estimator, EstimatorKind::MovingAverage);
        assert_eq!(forecast.predicted, 5);
        assert_eq!(forecast.basis, ForecastBasis::Defaulted);
    }

    #[test]
    fn test_forecaster_linear_trend_ignores_window() {
        let s = series("2025-01-01", &[2, 4, 6]);
        let forecast = Forecaster::new(ResourceKind::Inpatient, EstimatorKind::LinearTrend, 14)
            .forecast(&s, day("2026-10-16"));
        assert_eq!(forecast.predicted, 8);
        assert_eq!(forecast.basis, ForecastBasis::Estimated);
    }

    #[test]
    fn test_estimator_kind_round_trips_names() {
        for kind in [EstimatorKind::LinearTrend, EstimatorKind::MovingAverage] {
            assert_eq!(kind.as_str().parse::<EstimatorKind>().unwrap(), kind);
        }
        assert!("neural-net".parse::<EstimatorKind>().is_err());
    }
}
