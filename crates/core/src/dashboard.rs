//! Next-day bed planning summary.

use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::HmsResult;
use crate::forecast::Forecast;
use crate::repositories::ward::{BedOccupancy, WardService};
use crate::series::{CountSource, CsvCountSource, RecordCountSource, ResourceKind};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub predicted_inpatients: u32,
    pub predicted_outpatients: u32,
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub available_beds: u32,
    pub extra_beds_needed: u32,
    pub message: String,
}

impl DashboardSummary {
    fn compose(inpatients: &Forecast, outpatients: &Forecast, occupancy: BedOccupancy) -> Self {
        let available_beds = occupancy.available_beds();
        let extra_beds_needed = inpatients.predicted.saturating_sub(available_beds);

        let message = if extra_beds_needed == 0 {
            format!(
                "Predicted inpatients tomorrow: {}. Sufficient beds available.",
                inpatients.predicted
            )
        } else {
            format!(
                "Predicted inpatients tomorrow: {}. Not enough beds! Please arrange {extra_beds_needed} more.",
                inpatients.predicted
            )
        };

        Self {
            predicted_inpatients: inpatients.predicted,
            predicted_outpatients: outpatients.predicted,
            total_beds: occupancy.total_beds,
            occupied_beds: occupancy.occupied_beds,
            available_beds,
            extra_beds_needed,
            message,
        }
    }
}

#[derive(Clone)]
pub struct DashboardService {
    cfg: Arc<CoreConfig>,
    ward: WardService,
    inpatient_source: Arc<dyn CountSource>,
    outpatient_source: Arc<dyn CountSource>,
}

impl DashboardService {
    /// Reads each resource's history from its configured CSV file, or from the stored ward
    /// records when none is configured.
    pub fn new(db: Arc<Database>, cfg: Arc<CoreConfig>) -> Self {
        let source_for = |resource: ResourceKind| -> Arc<dyn CountSource> {
            match &cfg.forecast_settings(resource).series_path {
                Some(path) => Arc::new(CsvCountSource::new(path.clone())),
                None => Arc::new(RecordCountSource::new(db.clone())),
            }
        };
        let inpatient_source = source_for(ResourceKind::Inpatient);
        let outpatient_source = source_for(ResourceKind::Outpatient);

        Self::with_sources(db, cfg, inpatient_source, outpatient_source)
    }

    pub fn with_sources(
        db: Arc<Database>,
        cfg: Arc<CoreConfig>,
        inpatient_source: Arc<dyn CountSource>,
        outpatient_source: Arc<dyn CountSource>,
    ) -> Self {
        Self {
            ward: WardService::new(db, cfg.clone()),
            cfg,
            inpatient_source,
            outpatient_source,
        }
    }

    pub fn forecast(&self, resource: ResourceKind, today: NaiveDate) -> HmsResult<Forecast> {
        let source = match resource {
            ResourceKind::Inpatient => &self.inpatient_source,
            ResourceKind::Outpatient => &self.outpatient_source,
        };
        let series = source.daily_counts(resource)?;
        Ok(self.cfg.forecaster(resource).forecast(&series, today))
    }

    pub fn summary(&self, today: NaiveDate) -> HmsResult<DashboardSummary> {
        let inpatients = self.forecast(ResourceKind::Inpatient, today)?;
        let outpatients = self.forecast(ResourceKind::Outpatient, today)?;
        let occupancy = self.ward.bed_occupancy()?;

        let summary = DashboardSummary::compose(&inpatients, &outpatients, occupancy);
        tracing::info!(
            predicted_inpatients = summary.predicted_inpatients,
            available_beds = summary.available_beds,
            extra_beds_needed = summary.extra_beds_needed,
            "dashboard summary computed"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for DashboardService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardService")
            .field("ward", &self.ward)
            .finish_non_exhaustive()
    }
}
