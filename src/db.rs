use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ProgressError;
use crate::gate::{Eligibility, MonthlyProgressGate};
use crate::import::{plan_import, ImportRow, StudentSnapshot};
use crate::models::{
    InternshipStudent, NewProgress, Outcome, Period, ProgressRecord, ProgressUpdate,
    StudentProgress,
};

const RECORD_COLUMNS: &str =
    "id, student_id, month, outcome, actions_taken, evaluation_date, notes";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, default_total_months: u32) -> anyhow::Result<()> {
    let students = vec![
        (
            "Mariana Ortega",
            "mariana.ortega@alumnos.utec.edu.mx",
            "Manufacturas del Bajío",
            3,
        ),
        (
            "Diego Ramírez",
            "diego.ramirez@alumnos.utec.edu.mx",
            "Soluciones Logísticas Norte",
            2,
        ),
        (
            "Lucía Hernández",
            "lucia.hernandez@alumnos.utec.edu.mx",
            "Manufacturas del Bajío",
            0,
        ),
    ];

    for (name, email, company, months_done) in students {
        let mut tx = pool.begin().await?;
        let student =
            upsert_student(&mut tx, name, email, company, None, default_total_months).await?;
        tx.commit().await?;

        for month in seeded_months(months_done, student.total_months) {
            let progress = seed_progress(month)?;
            match create_progress(pool, email, &progress).await {
                Ok(_) => {}
                Err(ProgressError::Locked {
                    reason: Eligibility::AlreadyRecorded,
                    ..
                }) => debug!(email, month, "seed month already present"),
                Err(err) => return Err(err).context("failed to seed progress"),
            }
        }
    }

    Ok(())
}

/// Seed months never run past the student's own internship length.
fn seeded_months(months_done: u32, total_months: u32) -> std::ops::RangeInclusive<Period> {
    1..=months_done.min(total_months)
}

fn seed_progress(month: Period) -> anyhow::Result<NewProgress> {
    let evaluation_date = NaiveDate::from_ymd_opt(2026, month, 28).context("invalid date")?;
    let (outcome, actions_taken, notes) = if month == 2 {
        (
            Outcome::NotAdvanced,
            Some("Weekly review with the company advisor".to_string()),
            Some("Project scope changed mid-month".to_string()),
        )
    } else {
        (Outcome::Advanced, None, Some("On track".to_string()))
    };

    Ok(NewProgress {
        period: month,
        outcome,
        actions_taken,
        evaluation_date: Some(evaluation_date),
        notes,
    })
}

/// Inserts or refreshes a student. `total_months` only overrides the stored
/// value when given; new students fall back to `default_total_months`.
pub async fn upsert_student(
    tx: &mut Transaction<'_, Postgres>,
    full_name: &str,
    email: &str,
    company: &str,
    total_months: Option<u32>,
    default_total_months: u32,
) -> Result<InternshipStudent, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO estadia_progress.students (id, full_name, email, company, total_months)
        VALUES ($1, $2, $3, $4, COALESCE($5, $6))
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            company = EXCLUDED.company,
            total_months = COALESCE($5, estadia_progress.students.total_months)
        RETURNING id, full_name, email, company, total_months
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(company)
    .bind(total_months.map(to_db_int))
    .bind(to_db_int(default_total_months))
    .fetch_one(&mut **tx)
    .await?;

    student_from_row(&row)
}

pub async fn fetch_student_progress(
    pool: &PgPool,
    company: Option<&str>,
    email: Option<&str>,
) -> anyhow::Result<Vec<StudentProgress>> {
    let mut query = String::from(
        "SELECT id, full_name, email, company, total_months FROM estadia_progress.students",
    );

    if company.is_some() {
        query.push_str(" WHERE company = $1");
    } else if email.is_some() {
        query.push_str(" WHERE email = $1");
    }
    query.push_str(" ORDER BY full_name");

    let mut rows = sqlx::query(&query);

    if let Some(value) = company {
        rows = rows.bind(value);
    } else if let Some(value) = email {
        rows = rows.bind(value);
    }

    let students = rows
        .fetch_all(pool)
        .await?
        .iter()
        .map(student_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let ids: Vec<Uuid> = students.iter().map(|student| student.id).collect();
    let record_query = format!(
        "SELECT {RECORD_COLUMNS} FROM estadia_progress.progress_records \
         WHERE student_id = ANY($1) ORDER BY month"
    );
    let record_rows = sqlx::query(&record_query)
        .bind(&ids)
        .fetch_all(pool)
        .await?;

    let mut by_student: HashMap<Uuid, Vec<ProgressRecord>> = HashMap::new();
    for row in record_rows.iter() {
        let record = progress_from_row(row)?;
        by_student.entry(record.student_id).or_default().push(record);
    }

    Ok(students
        .into_iter()
        .map(|student| {
            let records = by_student.remove(&student.id).unwrap_or_default();
            StudentProgress { student, records }
        })
        .collect())
}

/// Records the first evaluation of a month, if the gate allows it.
///
/// The student row is locked for the duration of the transaction so two
/// submissions for the same student cannot both pass the gate.
pub async fn create_progress(
    pool: &PgPool,
    email: &str,
    progress: &NewProgress,
) -> Result<ProgressRecord, ProgressError> {
    let mut tx = pool.begin().await?;
    let record = create_progress_in(&mut tx, email, progress).await?;
    tx.commit().await?;

    info!(
        email,
        month = record.period,
        outcome = %record.outcome,
        "progress recorded"
    );
    Ok(record)
}

async fn create_progress_in(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    progress: &NewProgress,
) -> Result<ProgressRecord, ProgressError> {
    let student = lock_student(tx, email)
        .await?
        .ok_or_else(|| ProgressError::StudentNotFound(email.to_string()))?;

    let gate = MonthlyProgressGate::with_total(student.total_months)?;
    let existing = existing_months(tx, student.id).await?;
    let eligibility = gate.check(&existing, progress.period)?;
    if !eligibility.is_allowed() {
        debug!(email, month = progress.period, %eligibility, "month locked");
        return Err(ProgressError::Locked {
            period: progress.period,
            reason: eligibility,
        });
    }
    progress.validate()?;

    let query = format!(
        "INSERT INTO estadia_progress.progress_records \
         (id, student_id, month, outcome, actions_taken, evaluation_date, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {RECORD_COLUMNS}"
    );
    let inserted = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(student.id)
        .bind(to_db_int(progress.period))
        .bind(progress.outcome.as_str())
        .bind(progress.actions_taken.as_deref())
        .bind(progress.evaluation_date)
        .bind(progress.notes.as_deref())
        .fetch_one(&mut **tx)
        .await;

    match inserted {
        Ok(row) => Ok(progress_from_row(&row)?),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            Err(ProgressError::Locked {
                period: progress.period,
                reason: Eligibility::AlreadyRecorded,
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Edits an existing month in place. Editing is never gated, but the result
/// still has to satisfy the not-advanced rule.
pub async fn update_progress(
    pool: &PgPool,
    email: &str,
    period: Period,
    update: &ProgressUpdate,
) -> Result<ProgressRecord, ProgressError> {
    let mut tx = pool.begin().await?;
    let student = lock_student(&mut tx, email)
        .await?
        .ok_or_else(|| ProgressError::StudentNotFound(email.to_string()))?;
    MonthlyProgressGate::with_total(student.total_months)?.validate_period(period)?;

    let select = format!(
        "SELECT {RECORD_COLUMNS} FROM estadia_progress.progress_records \
         WHERE student_id = $1 AND month = $2 FOR UPDATE"
    );
    let current = match sqlx::query(&select)
        .bind(student.id)
        .bind(to_db_int(period))
        .fetch_optional(&mut *tx)
        .await?
    {
        Some(row) => progress_from_row(&row)?,
        None => {
            return Err(ProgressError::RecordNotFound {
                email: email.to_string(),
                period,
            })
        }
    };

    let merged = NewProgress {
        period,
        outcome: update.outcome.unwrap_or(current.outcome),
        actions_taken: update.actions_taken.clone().or(current.actions_taken),
        evaluation_date: update.evaluation_date.or(current.evaluation_date),
        notes: update.notes.clone().or(current.notes),
    };
    merged.validate()?;

    let query = format!(
        "UPDATE estadia_progress.progress_records \
         SET outcome = $2, actions_taken = $3, evaluation_date = $4, notes = $5, \
             updated_at = now() \
         WHERE id = $1 \
         RETURNING {RECORD_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(current.id)
        .bind(merged.outcome.as_str())
        .bind(merged.actions_taken.as_deref())
        .bind(merged.evaluation_date)
        .bind(merged.notes.as_deref())
        .fetch_one(&mut *tx)
        .await?;
    let record = progress_from_row(&row)?;
    tx.commit().await?;

    info!(email, month = period, "progress updated");
    Ok(record)
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    default_total_months: u32,
) -> anyhow::Result<ImportSummary> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = reader
        .deserialize::<ImportRow>()
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse progress CSV")?;

    let mut emails: Vec<String> = rows.iter().map(|row| row.email.clone()).collect();
    emails.sort();
    emails.dedup();
    let snapshots = fetch_snapshots(pool, &emails).await?;
    let plan = plan_import(rows, &snapshots, default_total_months);

    let mut summary = ImportSummary {
        inserted: 0,
        skipped: plan.skipped.len(),
    };
    for (row, reason) in plan.skipped.iter() {
        warn!(email = %row.email, month = row.month, error = %reason, "skipping row");
    }

    for row in plan.accepted {
        // Student refresh and insert commit together or not at all.
        let mut tx = pool.begin().await?;
        upsert_student(
            &mut tx,
            &row.full_name,
            &row.email,
            &row.company,
            row.total_months,
            default_total_months,
        )
        .await?;

        match create_progress_in(&mut tx, &row.email, &row.to_progress()).await {
            Ok(_) => {
                tx.commit().await?;
                summary.inserted += 1;
            }
            Err(ProgressError::Database(err)) => return Err(err.into()),
            Err(err) => {
                tx.rollback().await?;
                warn!(email = %row.email, month = row.month, error = %err, "skipping row");
                summary.skipped += 1;
            }
        }
    }

    info!(inserted = summary.inserted, skipped = summary.skipped, "import finished");
    Ok(summary)
}

async fn fetch_snapshots(
    pool: &PgPool,
    emails: &[String],
) -> Result<HashMap<String, StudentSnapshot>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT s.email, s.total_months, r.month \
         FROM estadia_progress.students s \
         LEFT JOIN estadia_progress.progress_records r ON r.student_id = s.id \
         WHERE s.email = ANY($1)",
    )
    .bind(emails)
    .fetch_all(pool)
    .await?;

    let mut snapshots: HashMap<String, StudentSnapshot> = HashMap::new();
    for row in rows {
        let email: String = row.try_get("email")?;
        let total_months = from_db_int(row.try_get("total_months")?)?;
        let month: Option<i32> = row.try_get("month")?;

        let snapshot = snapshots.entry(email).or_insert_with(|| StudentSnapshot {
            total_months,
            months: BTreeSet::new(),
        });
        if let Some(month) = month {
            snapshot.months.insert(from_db_int(month)?);
        }
    }
    Ok(snapshots)
}

async fn lock_student(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
) -> Result<Option<InternshipStudent>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, full_name, email, company, total_months \
         FROM estadia_progress.students WHERE email = $1 FOR UPDATE",
    )
    .bind(email)
    .fetch_optional(&mut **tx)
    .await?;

    row.as_ref().map(student_from_row).transpose()
}

async fn existing_months(
    tx: &mut Transaction<'_, Postgres>,
    student_id: Uuid,
) -> Result<BTreeSet<Period>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT month FROM estadia_progress.progress_records WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut months = BTreeSet::new();
    for row in rows {
        let month: i32 = row.try_get("month")?;
        months.insert(from_db_int(month)?);
    }
    Ok(months)
}

fn student_from_row(row: &PgRow) -> Result<InternshipStudent, sqlx::Error> {
    Ok(InternshipStudent {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        company: row.try_get("company")?,
        total_months: from_db_int(row.try_get("total_months")?)?,
    })
}

fn progress_from_row(row: &PgRow) -> Result<ProgressRecord, sqlx::Error> {
    let outcome: String = row.try_get("outcome")?;
    Ok(ProgressRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        period: from_db_int(row.try_get("month")?)?,
        outcome: outcome
            .parse()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
        actions_taken: row.try_get("actions_taken")?,
        evaluation_date: row.try_get("evaluation_date")?,
        notes: row.try_get("notes")?,
    })
}

fn to_db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn from_db_int(value: i32) -> Result<u32, sqlx::Error> {
    u32::try_from(value).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}
