use anyhow::{anyhow, Context};

use crate::gate::DEFAULT_TOTAL_MONTHS;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Months assigned to students whose internship does not say otherwise.
    pub default_total_months: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid DATABASE_MAX_CONNECTIONS `{value}`"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let default_total_months = match lookup("ESTADIA_TOTAL_MONTHS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid ESTADIA_TOTAL_MONTHS `{value}`"))?,
            None => DEFAULT_TOTAL_MONTHS,
        };
        if default_total_months == 0 {
            return Err(anyhow!("ESTADIA_TOTAL_MONTHS must be at least 1"));
        }

        Ok(Self {
            database_url,
            max_connections: max_connections.max(1),
            default_total_months,
        })
    }
}
