//! Same-day queue tokens.
//!
//! Tokens `1..=10` are reserved for the priority class; normal tokens start at 11 and
//! grow without bound. When the priority range of a day is used up, further priority
//! requests are queued as normal tokens instead of being refused.
//!
//! Each day keeps two allocation counters (`token-priority` and `token-normal`, keyed by
//! the ISO date). A counter that does not exist yet is seeded from the day's stored
//! appointments, classified by token range rather than by flag, so an overflowed priority
//! booking (flagged priority, token above 10) still counts towards the normal range.

use crate::constants::{PRIORITY_AGE_YEARS, PRIORITY_TOKEN_MAX};
use crate::db::Database;
use crate::error::HmsResult;
use crate::sequence::{self, SequenceKey};
use chrono::NaiveDate;
use rusqlite::{params, Transaction};
use serde::{Deserialize, Serialize};

pub(crate) const PRIORITY_SCOPE: &str = "token-priority";
pub(crate) const NORMAL_SCOPE: &str = "token-normal";

/// Booking class, derived at booking time and never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    Priority,
    Normal,
}

impl PriorityClass {
    /// Any one of: aged 60 or over, pregnant, or differently abled.
    pub fn derive(age_years: u32, pregnant: bool, disabled: bool) -> Self {
        if age_years >= PRIORITY_AGE_YEARS || pregnant || disabled {
            PriorityClass::Priority
        } else {
            PriorityClass::Normal
        }
    }

    pub fn from_flag(is_priority: bool) -> Self {
        if is_priority {
            PriorityClass::Priority
        } else {
            PriorityClass::Normal
        }
    }

    pub fn is_priority(self) -> bool {
        matches!(self, PriorityClass::Priority)
    }
}

/// Outcome of a token allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAssignment {
    pub token: u32,
    /// The class that was requested, which is kept even after an overflow.
    pub class: PriorityClass,
    /// `true` when a priority request was queued in the normal range.
    pub overflowed: bool,
}

/// Decides the next token from the current maxima of the two ranges.
///
/// `max_priority` is the highest token issued in `1..=10` (0 when none), `max_normal` the
/// highest issued above 10 (`None` when none).
pub fn next_token(class: PriorityClass, max_priority: u32, max_normal: Option<u32>) -> TokenAssignment {
    if class.is_priority() && max_priority < PRIORITY_TOKEN_MAX {
        return TokenAssignment {
            token: max_priority + 1,
            class,
            overflowed: false,
        };
    }

    let base = max_normal
        .unwrap_or(PRIORITY_TOKEN_MAX)
        .max(PRIORITY_TOKEN_MAX);
    TokenAssignment {
        token: base + 1,
        class,
        overflowed: class.is_priority(),
    }
}

/// Issues queue tokens per appointment date.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAllocator;

impl TokenAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Claims the next token for `date` in its own transaction.
    pub fn next_token(
        &self,
        db: &Database,
        date: NaiveDate,
        class: PriorityClass,
    ) -> HmsResult<TokenAssignment> {
        db.write(|tx| self.allocate_in(tx, date, class))
    }

    /// Claims the next token for `date` inside an open write transaction.
    pub fn allocate_in(
        &self,
        tx: &Transaction<'_>,
        date: NaiveDate,
        class: PriorityClass,
    ) -> HmsResult<TokenAssignment> {
        let day = date.to_string();
        let priority_key = SequenceKey::new(PRIORITY_SCOPE, &day);
        let normal_key = SequenceKey::new(NORMAL_SCOPE, &day);

        let max_priority = if class.is_priority() {
            sequence::current(tx, priority_key, |tx| scan_priority_max(tx, date))?
        } else {
            PRIORITY_TOKEN_MAX
        };

        let max_normal = if class.is_priority() && max_priority < PRIORITY_TOKEN_MAX {
            None
        } else {
            Some(sequence::current(tx, normal_key, |tx| scan_normal_max(tx, date))?)
        };

        let assignment = next_token(class, max_priority, max_normal);
        if assignment.token <= PRIORITY_TOKEN_MAX {
            sequence::advance(tx, priority_key, assignment.token)?;
        } else {
            sequence::advance(tx, normal_key, assignment.token)?;
        }

        if assignment.overflowed {
            tracing::info!(%date, token = assignment.token, "priority range full, queued as normal");
        } else {
            tracing::debug!(%date, token = assignment.token, class = ?class, "allocated token");
        }
        Ok(assignment)
    }
}

fn scan_priority_max(tx: &Transaction<'_>, date: NaiveDate) -> HmsResult<u32> {
    let max: Option<u32> = tx.query_row(
        "SELECT MAX(token_number) FROM appointments
         WHERE appointment_date = ?1 AND token_number BETWEEN 1 AND ?2",
        params![date, PRIORITY_TOKEN_MAX],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0))
}

fn scan_normal_max(tx: &Transaction<'_>, date: NaiveDate) -> HmsResult<u32> {
    let max: Option<u32> = tx.query_row(
        "SELECT MAX(token_number) FROM appointments
         WHERE appointment_date = ?1 AND token_number > ?2",
        params![date, PRIORITY_TOKEN_MAX],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(PRIORITY_TOKEN_MAX))
}
