use std::fmt::Write;

use serde::Serialize;

use crate::gate::MonthlyProgressGate;
use crate::models::{Outcome, Period, StudentProgress};

#[derive(Debug, Clone, Serialize)]
pub struct StudentStatus {
    pub full_name: String,
    pub email: String,
    pub company: String,
    pub total_months: u32,
    pub recorded: usize,
    pub high_water_mark: Period,
    pub next_month: Option<Period>,
    pub gaps: Vec<Period>,
    pub not_advanced: usize,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeSummary {
    pub outcome: Outcome,
    pub count: usize,
    pub share: f64,
}

pub fn summarize_student(progress: &StudentProgress) -> StudentStatus {
    let existing = progress.existing_periods();
    // A stored zero is rejected by the schema; fall back to the default gate.
    let gate = MonthlyProgressGate::with_total(progress.student.total_months).unwrap_or_default();
    let recorded = progress.tracked_records().count();

    StudentStatus {
        full_name: progress.student.full_name.clone(),
        email: progress.student.email.clone(),
        company: progress.student.company.clone(),
        total_months: gate.total_periods(),
        recorded,
        high_water_mark: gate.high_water_mark(&existing),
        next_month: gate.next_period(&existing),
        gaps: gate.gaps(&existing),
        not_advanced: progress
            .tracked_records()
            .filter(|record| record.outcome == Outcome::NotAdvanced)
            .count(),
        complete: gate.is_complete(&existing),
    }
}

/// Incomplete students first, least progress first, then by name.
pub fn summarize_students(students: &[StudentProgress]) -> Vec<StudentStatus> {
    let mut statuses: Vec<StudentStatus> = students.iter().map(summarize_student).collect();
    statuses.sort_by(|a, b| {
        a.complete
            .cmp(&b.complete)
            .then(a.recorded.cmp(&b.recorded))
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    statuses
}

pub fn summarize_outcomes(students: &[StudentProgress]) -> Vec<OutcomeSummary> {
    let total: usize = students.iter().map(|student| student.tracked_records().count()).sum();

    [Outcome::Advanced, Outcome::NotAdvanced]
        .into_iter()
        .map(|outcome| {
            let count = students
                .iter()
                .flat_map(|student| student.tracked_records())
                .filter(|record| record.outcome == outcome)
                .count();
            OutcomeSummary {
                outcome,
                count,
                share: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                },
            }
        })
        .collect()
}

pub fn describe_next(status: &StudentStatus) -> String {
    match status.next_month {
        Some(month) if status.gaps.contains(&month) => format!("month {month} (missing)"),
        Some(month) => format!("month {month}"),
        None => "complete".to_string(),
    }
}

pub fn build_report(scope: Option<&str>, students: &[StudentProgress]) -> String {
    let statuses = summarize_students(students);
    let outcomes = summarize_outcomes(students);
    let recorded: usize = students
        .iter()
        .map(|student| student.tracked_records().count())
        .sum();

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all internships");

    let _ = writeln!(output, "# Internship Monthly Progress Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} students, {} monthly evaluations)",
        scope_label,
        students.len(),
        recorded
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Outcome Mix");

    if recorded == 0 {
        let _ = writeln!(output, "No evaluations recorded yet.");
    } else {
        for summary in outcomes.iter() {
            let _ = writeln!(
                output,
                "- {}: {} evaluations ({:.0}%)",
                summary.outcome,
                summary.count,
                summary.share * 100.0
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Status");

    if statuses.is_empty() {
        let _ = writeln!(output, "No students in this scope.");
    } else {
        for status in statuses.iter() {
            let _ = writeln!(
                output,
                "- {} ({}, {}) {}/{} months, next: {}",
                status.full_name,
                status.email,
                status.company,
                status.recorded,
                status.total_months,
                describe_next(status)
            );
        }
    }

    let mut remedial: Vec<(&str, Period, &str)> = students
        .iter()
        .flat_map(|student| {
            student.tracked_records().filter_map(move |record| {
                (record.outcome == Outcome::NotAdvanced).then(|| {
                    (
                        student.student.full_name.as_str(),
                        record.period,
                        record.actions_taken.as_deref().unwrap_or("none recorded"),
                    )
                })
            })
        })
        .collect();
    remedial.sort();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Remedial Actions");

    if remedial.is_empty() {
        let _ = writeln!(output, "Every recorded month advanced.");
    } else {
        for (name, month, actions) in remedial {
            let _ = writeln!(output, "- {name}, month {month}: {actions}");
        }
    }

    output
}
