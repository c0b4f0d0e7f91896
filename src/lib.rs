//! Monthly progress tracking for university internships.
//!
//! Each student in an internship gets one evaluation per month, and a month can
//! only be evaluated once the months before it have been. [`gate`] holds that
//! rule as a pure check; [`db`] applies it to records stored in Postgres.

pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod import;
pub mod models;
pub mod report;

pub use error::{GateError, ProgressError};
pub use gate::{Eligibility, MonthlyProgressGate};
pub use models::{Outcome, Period, ProgressRecord};
