use std::str::FromStr;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset, jobs and news live in memory.
    pub database_url: Option<String>,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,

    // Research orchestrator
    pub job_workers: usize,
    pub max_parallel_stages: usize,
    pub stage_max_attempts: u32,

    // News aggregation
    pub news_api_url: Option<String>,
    pub news_api_key: Option<String>,
    pub news_lookback_days: i64,
    pub news_llm_enabled: bool,
    pub news_llm_always: bool,
    pub news_min_feed_results: usize,
    pub news_refresh_interval_secs: Option<u64>,
    pub dedup_jaccard_threshold: f64,
    pub dedup_signature_window_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            database_url: optional("DATABASE_URL"),
            anthropic_api_key: optional("ANTHROPIC_API_KEY").with_context(|| {
                "Required environment variable 'ANTHROPIC_API_KEY' is not set".to_string()
            })?,
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            job_workers: parse_or(&lookup, "JOB_WORKERS", 1)?,
            max_parallel_stages: parse_or(&lookup, "MAX_PARALLEL_STAGES", 3)?,
            stage_max_attempts: parse_or(&lookup, "STAGE_MAX_ATTEMPTS", 2)?,
            news_api_url: optional("NEWS_API_URL"),
            news_api_key: optional("NEWS_API_KEY"),
            news_lookback_days: parse_or(&lookup, "NEWS_LOOKBACK_DAYS", 14)?,
            news_llm_enabled: parse_or(&lookup, "NEWS_LLM_ENABLED", true)?,
            news_llm_always: parse_or(&lookup, "NEWS_LLM_ALWAYS", false)?,
            news_min_feed_results: parse_or(&lookup, "NEWS_MIN_FEED_RESULTS", 5)?,
            news_refresh_interval_secs: optional("NEWS_REFRESH_INTERVAL_SECS")
                .map(|v| {
                    v.parse::<u64>()
                        .context("NEWS_REFRESH_INTERVAL_SECS must be a whole number of seconds")
                })
                .transpose()?,
            dedup_jaccard_threshold: parse_or(&lookup, "DEDUP_JACCARD_THRESHOLD", 0.6)?,
            dedup_signature_window_days: parse_or(&lookup, "DEDUP_SIGNATURE_WINDOW_DAYS", 3)?,
        };

        if config.job_workers == 0 {
            anyhow::bail!("JOB_WORKERS must be at least 1");
        }
        if config.max_parallel_stages == 0 {
            anyhow::bail!("MAX_PARALLEL_STAGES must be at least 1");
        }
        if config.stage_max_attempts == 0 {
            anyhow::bail!("STAGE_MAX_ATTEMPTS must be at least 1");
        }
        if !(0.0..=1.0).contains(&config.dedup_jaccard_threshold) {
            anyhow::bail!("DEDUP_JACCARD_THRESHOLD must be between 0.0 and 1.0");
        }

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}
