use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use estadia_progress::config::Config;
use estadia_progress::models::{NewProgress, Outcome, Period, ProgressUpdate};
use estadia_progress::{db, report, ProgressError};

#[derive(Parser)]
#[command(name = "estadia-progress")]
#[command(about = "Monthly progress tracker for university internships", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import monthly evaluations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show recorded and open months per student
    #[command(group(
        ArgGroup::new("scope")
            .args(["company", "email"])
            .multiple(false)
    ))]
    Status {
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Print machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Record the first evaluation of a month
    Record {
        #[arg(long)]
        email: String,
        #[arg(long)]
        month: Period,
        /// `advanced` or `not_advanced`
        #[arg(long)]
        outcome: Outcome,
        /// Remedial actions, required when the month was not advanced
        #[arg(long)]
        actions: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Edit an already recorded month
    Update {
        #[arg(long)]
        email: String,
        #[arg(long)]
        month: Period,
        #[arg(long)]
        outcome: Option<Outcome>,
        #[arg(long)]
        actions: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("scope")
            .args(["company", "email"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    info!(max_connections = config.max_connections, "connected to Postgres");

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, config.default_total_months).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&pool, &csv, config.default_total_months).await?;
            println!(
                "Inserted {} evaluations from {} ({} skipped).",
                summary.inserted,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Status {
            company,
            email,
            json,
        } => {
            let students =
                db::fetch_student_progress(&pool, company.as_deref(), email.as_deref()).await?;
            let statuses = report::summarize_students(&students);

            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
                return Ok(());
            }

            if statuses.is_empty() {
                println!("No students found for this scope.");
                return Ok(());
            }

            for status in statuses.iter() {
                println!(
                    "- {} ({}, {}) {}/{} months, next: {}",
                    status.full_name,
                    status.email,
                    status.company,
                    status.recorded,
                    status.total_months,
                    report::describe_next(status)
                );
            }
        }
        Commands::Record {
            email,
            month,
            outcome,
            actions,
            date,
            notes,
        } => {
            let progress = NewProgress {
                period: month,
                outcome,
                actions_taken: actions,
                evaluation_date: date,
                notes,
            };

            match db::create_progress(&pool, &email, &progress).await {
                Ok(record) => println!(
                    "Recorded month {} for {} as {}.",
                    record.period, email, record.outcome
                ),
                Err(ProgressError::Locked { period, reason }) => {
                    println!("Month {period} is locked for {email}: {reason}.");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Update {
            email,
            month,
            outcome,
            actions,
            date,
            notes,
        } => {
            let update = ProgressUpdate {
                outcome,
                actions_taken: actions,
                evaluation_date: date,
                notes,
            };
            if update.is_empty() {
                println!("Nothing to update.");
                return Ok(());
            }

            let record = db::update_progress(&pool, &email, month, &update).await?;
            println!(
                "Updated month {} for {} ({}).",
                record.period, email, record.outcome
            );
        }
        Commands::Report {
            company,
            email,
            out,
        } => {
            let students =
                db::fetch_student_progress(&pool, company.as_deref(), email.as_deref()).await?;
            let scope = company.as_deref().or(email.as_deref());
            let report = report::build_report(scope, &students);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
