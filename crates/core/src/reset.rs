//! Daily token reset.
//!
//! Runs once per day (scheduler or `hms reset-tokens`). Every appointment whose
//! `token_reset_date` is missing or earlier than `today` gets token 0 and
//! `token_reset_date = today`; appointments already stamped with `today` are left alone,
//! so the job can run any number of times, and on any later day, without touching the
//! current queue. Token counters for earlier dates are dropped in the same transaction.

use crate::constants::RESET_TOKEN;
use crate::db::Database;
use crate::error::HmsResult;
use crate::sequence;
use crate::token::{NORMAL_SCOPE, PRIORITY_SCOPE};
use chrono::NaiveDate;
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;

/// Summary of one reset run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub today: NaiveDate,
    pub appointments_reset: usize,
    pub counters_pruned: usize,
}

impl ResetReport {
    pub fn is_noop(&self) -> bool {
        self.appointments_reset == 0 && self.counters_pruned == 0
    }
}

#[derive(Debug, Clone)]
pub struct DailyResetJob {
    db: Arc<Database>,
}

impl DailyResetJob {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn run(&self, today: NaiveDate) -> HmsResult<ResetReport> {
        let report = self.db.write(|tx| {
            let appointments_reset = tx.execute(
                "UPDATE appointments
                 SET token_number = ?1, token_reset_date = ?2
                 WHERE token_reset_date IS NULL OR token_reset_date < ?2",
                params![RESET_TOKEN, today],
            )?;

            let cutoff = today.to_string();
            let counters_pruned = sequence::prune_before(tx, PRIORITY_SCOPE, &cutoff)?
                + sequence::prune_before(tx, NORMAL_SCOPE, &cutoff)?;

            Ok(ResetReport {
                today,
                appointments_reset,
                counters_pruned,
            })
        })?;

        tracing::info!(
            %today,
            appointments_reset = report.appointments_reset,
            counters_pruned = report.counters_pruned,
            "daily token reset finished"
        );
        Ok(report)
    }
}
