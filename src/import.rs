//! Planning for CSV imports of monthly evaluations.
//!
//! Rows are ordered by student and month, then replayed through the gate
//! against what each student already has stored. Rows that would be rejected
//! are set aside before anything is written.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::error::GateError;
use crate::gate::{Eligibility, MonthlyProgressGate};
use crate::models::{NewProgress, Outcome, Period};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportRow {
    pub full_name: String,
    pub email: String,
    pub company: String,
    pub total_months: Option<u32>,
    pub month: Period,
    pub outcome: Outcome,
    pub actions_taken: Option<String>,
    pub evaluation_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl ImportRow {
    pub fn to_progress(&self) -> NewProgress {
        NewProgress {
            period: self.month,
            outcome: self.outcome,
            actions_taken: self.actions_taken.clone(),
            evaluation_date: self.evaluation_date,
            notes: self.notes.clone(),
        }
    }
}

/// What is already stored for a student before the import runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentSnapshot {
    pub total_months: u32,
    pub months: BTreeSet<Period>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("month {month} is locked: {reason}")]
    Locked { month: Period, reason: Eligibility },
    #[error("total of {total} months would drop recorded month {recorded}")]
    TotalBelowRecorded { total: u32, recorded: Period },
    #[error("month {month} was not advanced, remedial actions are required")]
    MissingActions { month: Period },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    pub accepted: Vec<ImportRow>,
    pub skipped: Vec<(ImportRow, SkipReason)>,
}

pub fn plan_import(
    mut rows: Vec<ImportRow>,
    snapshots: &HashMap<String, StudentSnapshot>,
    default_total_months: u32,
) -> ImportPlan {
    // Months must land in order for the gate to open each one in turn.
    rows.sort_by(|a, b| a.email.cmp(&b.email).then(a.month.cmp(&b.month)));

    let mut state: HashMap<String, StudentSnapshot> = HashMap::new();
    let mut plan = ImportPlan::default();

    for row in rows {
        let current = state.entry(row.email.clone()).or_insert_with(|| {
            snapshots
                .get(&row.email)
                .cloned()
                .unwrap_or_else(|| StudentSnapshot {
                    total_months: default_total_months,
                    months: BTreeSet::new(),
                })
        });

        match check_row(&row, current) {
            Ok(total) => {
                current.total_months = total;
                current.months.insert(row.month);
                plan.accepted.push(row);
            }
            Err(reason) => plan.skipped.push((row, reason)),
        }
    }

    plan
}

fn check_row(row: &ImportRow, current: &StudentSnapshot) -> Result<u32, SkipReason> {
    let total = row.total_months.unwrap_or(current.total_months);
    let gate = MonthlyProgressGate::with_total(total)?;

    if let Some(&recorded) = current.months.iter().next_back() {
        if recorded > total {
            return Err(SkipReason::TotalBelowRecorded { total, recorded });
        }
    }

    let eligibility = gate.check(&current.months, row.month)?;
    if !eligibility.is_allowed() {
        return Err(SkipReason::Locked {
            month: row.month,
            reason: eligibility,
        });
    }

    row.to_progress()
        .validate()
        .map_err(|_| SkipReason::MissingActions { month: row.month })?;

    Ok(total)
}
