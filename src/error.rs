use thiserror::Error;

use crate::gate::Eligibility;
use crate::models::Period;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("month {period} is outside the valid range 1..={total}")]
    InvalidPeriod { period: Period, total: u32 },
    #[error("an internship must track at least one month")]
    InvalidTotal,
}

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("no internship student with email {0}")]
    StudentNotFound(String),
    #[error("no progress recorded for {email} in month {period}")]
    RecordNotFound { email: String, period: Period },
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("month {period} is locked: {reason}")]
    Locked { period: Period, reason: Eligibility },
    #[error("month {period} was not advanced, remedial actions are required")]
    MissingActions { period: Period },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
