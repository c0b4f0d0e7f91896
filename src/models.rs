use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ProgressError;

/// One month slot of an internship, numbered from 1.
pub type Period = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Advanced,
    NotAdvanced,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Advanced => "advanced",
            Outcome::NotAdvanced => "not_advanced",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown outcome `{0}`, expected `advanced` or `not_advanced`")]
pub struct ParseOutcomeError(String);

impl FromStr for Outcome {
    type Err = ParseOutcomeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "advanced" => Ok(Outcome::Advanced),
            "not_advanced" | "not-advanced" | "notadvanced" => Ok(Outcome::NotAdvanced),
            _ => Err(ParseOutcomeError(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InternshipStudent {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub company: String,
    pub total_months: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub period: Period,
    pub outcome: Outcome,
    pub actions_taken: Option<String>,
    pub evaluation_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Fields submitted when a month is evaluated for the first time.
#[derive(Debug, Clone)]
pub struct NewProgress {
    pub period: Period,
    pub outcome: Outcome,
    pub actions_taken: Option<String>,
    pub evaluation_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewProgress {
    /// A month that was not advanced must say what is being done about it.
    pub fn validate(&self) -> Result<(), ProgressError> {
        if self.outcome == Outcome::NotAdvanced && is_blank(self.actions_taken.as_deref()) {
            return Err(ProgressError::MissingActions {
                period: self.period,
            });
        }
        Ok(())
    }
}

/// In-place edit of an existing record. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub outcome: Option<Outcome>,
    pub actions_taken: Option<String>,
    pub evaluation_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl ProgressUpdate {
    pub fn is_empty(&self) -> bool {
        self.outcome.is_none()
            && self.actions_taken.is_none()
            && self.evaluation_date.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentProgress {
    pub student: InternshipStudent,
    pub records: Vec<ProgressRecord>,
}

impl StudentProgress {
    pub fn existing_periods(&self) -> BTreeSet<Period> {
        existing_periods(&self.records)
    }

    /// Records whose month falls inside the student's internship.
    pub fn tracked_records(&self) -> impl Iterator<Item = &ProgressRecord> + '_ {
        let total = self.student.total_months;
        self.records
            .iter()
            .filter(move |record| (1..=total).contains(&record.period))
    }
}

pub fn existing_periods(records: &[ProgressRecord]) -> BTreeSet<Period> {
    records.iter().map(|record| record.period).collect()
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |text| text.trim().is_empty())
}
