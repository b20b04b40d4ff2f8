use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::db::models::{CountOptions, ViewCounting, MAX_TRENDING_WINDOW_DAYS};
use crate::scoring::ranking::DEFAULT_FEATURED_COUNT;
use crate::scoring::reputation::{ReputationFloor, ReputationWeights};

/// Central configuration loaded from environment variables.
///
/// The cron secret comes from the environment only (never hardcoded). The
/// .env file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// PostgreSQL connection URL (when set and starts with postgres://, uses Postgres backend)
    pub database_url: Option<String>,
    /// Shared secret guarding the trigger endpoints (CRON_SECRET env var)
    pub cron_secret: String,
    /// How many posts each ranking run features
    pub featured_count: usize,
    pub view_counting: ViewCounting,
    pub reputation_floor: ReputationFloor,
    pub trending_window_days: i64,
    pub trending_min_views: i64,
    pub weights: ReputationWeights,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable has a default except CRON_SECRET, which is only
    /// required by `serve`. Malformed values are rejected rather than
    /// silently replaced by the default.
    pub fn load() -> Result<Self> {
        let featured_count = parse_var("SPOTLIGHT_FEATURED_COUNT", DEFAULT_FEATURED_COUNT)?;
        let view_counting = parse_var("SPOTLIGHT_VIEW_COUNTING", ViewCounting::default())?;
        let reputation_floor = parse_var("SPOTLIGHT_REPUTATION_FLOOR", ReputationFloor::default())?;

        let defaults = CountOptions::default();
        let trending_window_days =
            parse_var("SPOTLIGHT_TRENDING_WINDOW_DAYS", defaults.trending_window_days)?;
        let trending_min_views =
            parse_var("SPOTLIGHT_TRENDING_MIN_VIEWS", defaults.trending_min_views)?;

        let config = Self {
            db_path: env::var("SPOTLIGHT_DB_PATH").unwrap_or_else(|_| "./spotlight.db".to_string()),
            database_url: env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
            cron_secret: env::var("CRON_SECRET").unwrap_or_default(),
            featured_count,
            view_counting,
            reputation_floor,
            trending_window_days,
            trending_min_views,
            weights: ReputationWeights::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject trending settings the engagement aggregation can't use.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TRENDING_WINDOW_DAYS).contains(&self.trending_window_days) {
            anyhow::bail!(
                "SPOTLIGHT_TRENDING_WINDOW_DAYS must be between 1 and {MAX_TRENDING_WINDOW_DAYS}"
            );
        }
        if self.trending_min_views < 1 {
            anyhow::bail!("SPOTLIGHT_TRENDING_MIN_VIEWS must be at least 1");
        }
        Ok(())
    }

    /// Options for the per-user engagement aggregation.
    pub fn count_options(&self) -> CountOptions {
        CountOptions {
            view_counting: self.view_counting,
            trending_window_days: self.trending_window_days,
            trending_min_views: self.trending_min_views,
        }
    }

    /// Whether DATABASE_URL selects the PostgreSQL backend.
    pub fn uses_postgres(&self) -> bool {
        self.database_url
            .as_deref()
            .is_some_and(|url| url.starts_with("postgres://") || url.starts_with("postgresql://"))
    }

    /// Check that the cron secret is configured.
    /// Call this before starting the web server.
    pub fn require_cron_secret(&self) -> Result<()> {
        if self.cron_secret.is_empty() {
            anyhow::bail!(
                "CRON_SECRET not set. Add it to your .env file.\n\
                 Every trigger request will be rejected until it is configured."
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let defaults = CountOptions::default();
        Self {
            db_path: "./spotlight.db".to_string(),
            database_url: None,
            cron_secret: String::new(),
            featured_count: DEFAULT_FEATURED_COUNT,
            view_counting: defaults.view_counting,
            reputation_floor: ReputationFloor::default(),
            trending_window_days: defaults.trending_window_days,
            trending_min_views: defaults.trending_min_views,
            weights: ReputationWeights::default(),
        }
    }
}

/// Read `name` and parse it, falling back to `default` when unset or empty.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {name}: '{raw}'")),
        _ => Ok(default),
    }
}
