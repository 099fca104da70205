use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::click_meter::DEFAULT_API_URL;
use crate::generation::generator::ProvisioningFailurePolicy;
use crate::generation::profile_selector::ProfileSelection;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub click_meter_api_key: Option<String>,
    pub click_meter_api_url: String,
    /// Published per-second limit of the tracking service. The engine gates one below it.
    pub click_meter_rate_limit: u32,
    pub throttle_enabled: bool,
    pub rate_gate_max_wait: Option<Duration>,
    pub progress_channel: String,
    pub progress_timeout: Duration,
    pub profile_selection: ProfileSelection,
    pub tracking_failure_policy: ProvisioningFailurePolicy,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let click_meter_rate_limit = parse_env("CLICK_METER_RATE_LIMIT", 10u32)?;
        if click_meter_rate_limit < 2 {
            bail!("CLICK_METER_RATE_LIMIT must be at least 2 (one call/sec is reserved for housekeeping)");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            click_meter_api_key: std::env::var("CLICK_METER_API_KEY").ok(),
            click_meter_api_url: std::env::var("CLICK_METER_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            click_meter_rate_limit,
            throttle_enabled: parse_env("THROTTLE_ENABLED", true)?,
            rate_gate_max_wait: std::env::var("RATE_GATE_MAX_WAIT_MS")
                .ok()
                .map(|v| v.parse::<u64>().map(Duration::from_millis))
                .transpose()
                .context("RATE_GATE_MAX_WAIT_MS must be a number of milliseconds")?,
            progress_channel: std::env::var("PROGRESS_CHANNEL")
                .unwrap_or_else(|_| "progress".to_string()),
            progress_timeout: Duration::from_millis(parse_env("PROGRESS_TIMEOUT_MS", 500u64)?),
            profile_selection: std::env::var("PROFILE_SELECTION")
                .unwrap_or_else(|_| "round_robin".to_string())
                .parse()?,
            tracking_failure_policy: std::env::var("TRACKING_FAILURE_POLICY")
                .unwrap_or_else(|_| "abort".to_string())
                .parse()?,
            port: parse_env("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Gate budget for tracking-service calls: one below the published limit,
    /// leaving headroom for stale-link retirement.
    pub fn tracking_gate_capacity(&self) -> u32 {
        self.click_meter_rate_limit - 1
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}
