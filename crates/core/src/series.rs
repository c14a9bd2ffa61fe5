//! Daily count series and the sources that supply them.
//!
//! A [`DailyCountSeries`] is the read-only input of the forecaster: one count per date,
//! in chronological order. Sources hide where the history comes from, so forecasting has
//! no knowledge of file paths or tables.

use crate::db::Database;
use crate::error::{HmsError, HmsResult};
use crate::repositories::ward;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Date formats accepted in count series files, tried in order.
const SERIES_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

/// The resource whose demand is being forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Inpatient,
    Outpatient,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Inpatient => "inpatient",
            ResourceKind::Outpatient => "outpatient",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inpatient" | "inpatients" => Ok(ResourceKind::Inpatient),
            "outpatient" | "outpatients" => Ok(ResourceKind::Outpatient),
            other => Err(HmsError::InvalidInput(format!(
                "unknown resource '{other}' (expected inpatient or outpatient)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u32,
}

/// Date-ordered counts with at most one entry per date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyCountSeries {
    points: Vec<DailyCount>,
}

impl DailyCountSeries {
    /// Aggregates raw `(date, count)` observations, summing repeated dates.
    pub fn from_records(records: impl IntoIterator<Item = (NaiveDate, u32)>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for (date, count) in records {
            let total = by_date.entry(date).or_insert(0);
            *total = total.saturating_add(count);
        }

        Self {
            points: by_date
                .into_iter()
                .map(|(date, count)| DailyCount { date, count })
                .collect(),
        }
    }

    pub fn points(&self) -> &[DailyCount] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Observations dated on or after `start`.
    pub fn since(&self, start: NaiveDate) -> &[DailyCount] {
        let first = self.points.partition_point(|p| p.date < start);
        &self.points[first..]
    }
}

/// Supplies the history for one resource.
pub trait CountSource: Send + Sync {
    fn daily_counts(&self, resource: ResourceKind) -> HmsResult<DailyCountSeries>;
}

/// Reads a `Date,Count` CSV file.
#[derive(Debug, Clone)]
pub struct CsvCountSource {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SeriesRow {
    #[serde(rename = "Date", alias = "date")]
    date: String,
    #[serde(rename = "Count", alias = "count")]
    count: u32,
}

impl CsvCountSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, source: csv::Error) -> HmsError {
        HmsError::SeriesRead {
            path: self.path.clone(),
            source,
        }
    }
}

impl CountSource for CsvCountSource {
    /// The same file is used whatever the resource; configure one source per resource.
    fn daily_counts(&self, _resource: ResourceKind) -> HmsResult<DailyCountSeries> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| self.read_error(e))?;
        let headers = reader.headers().map_err(|e| self.read_error(e))?.clone();

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| self.read_error(e))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let row: SeriesRow = record
                .deserialize(Some(&headers))
                .map_err(|e| self.read_error(e))?;
            let date = parse_series_date(&row.date).ok_or_else(|| HmsError::SeriesRow {
                path: self.path.clone(),
                line,
                reason: format!("unrecognised date '{}'", row.date),
            })?;
            records.push((date, row.count));
        }

        tracing::debug!(path = %self.path.display(), rows = records.len(), "read count series");
        Ok(DailyCountSeries::from_records(records))
    }
}

fn parse_series_date(value: &str) -> Option<NaiveDate> {
    SERIES_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Aggregates stored ward records: admissions per `admitted_date` for inpatients and
/// visits per `visit_date` for outpatients.
#[derive(Debug, Clone)]
pub struct RecordCountSource {
    db: Arc<Database>,
}

impl RecordCountSource {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl CountSource for RecordCountSource {
    fn daily_counts(&self, resource: ResourceKind) -> HmsResult<DailyCountSeries> {
        let records = self.db.read(|conn| ward::daily_counts(conn, resource))?;
        Ok(DailyCountSeries::from_records(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("valid test date")
    }

    #[test]
    fn test_from_records_sorts_and_sums_duplicate_dates() {
        let series = DailyCountSeries::from_records([
            (day("2026-10-03"), 1),
            (day("2026-10-01"), 2),
            (day("2026-10-03"), 4),
        ]);

        assert_eq!(
            series.points(),
            &[
                DailyCount { date: day("2026-10-01"), count: 2 },
                DailyCount { date: day("2026-10-03"), count: 5 },
            ]
        );
    }

    #[test]
    fn test_since_is_inclusive() {
        let series = DailyCountSeries::from_records([
            (day("2026-10-01"), 1),
            (day("2026-10-02"), 2),
            (day("2026-10-03"), 3),
        ]);
        let window = series.since(day("2026-10-02"));
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].count, 2);
        assert!(series.since(day("2026-11-01")).is_empty());
    }

    #[test]
    fn test_resource_kind_parses() {
        assert_eq!("Inpatient".parse::<ResourceKind>().unwrap(), ResourceKind::Inpatient);
        assert_eq!("outpatients".parse::<ResourceKind>().unwrap(), ResourceKind::Outpatient);
        assert!("beds".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_csv_source_reads_unsorted_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("inpatients.csv");
        fs::write(&path, "Date,Count\n2026-10-02, 4\n01/10/2026,2\n2026-10-03,6\n")
            .expect("should write csv");

        let series = CsvCountSource::new(&path)
            .daily_counts(ResourceKind::Inpatient)
            .expect("csv should parse");

        let counts: Vec<u32> = series.points().iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![2, 4, 6]);
    }

    #[test]
    fn test_csv_source_reports_bad_date_with_line() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bad.csv");
        fs::write(&path, "Date,Count\n2026-10-02,4\nyesterday,2\n").expect("should write csv");

        let err = CsvCountSource::new(&path)
            .daily_counts(ResourceKind::Inpatient)
            .expect_err("bad date should fail");
        assert!(
            matches!(err, HmsError::SeriesRow { line: 3, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_csv_source_missing_file_is_read_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let err = CsvCountSource::new(temp_dir.path().join("missing.csv"))
            .daily_counts(ResourceKind::Outpatient)
            .expect_err("missing file should fail");
        assert!(matches!(err, HmsError::SeriesRead { .. }));
    }
}
