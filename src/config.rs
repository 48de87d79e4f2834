//! Configuration loaded from environment variables
//!
//! Every knob has a default so the binary runs with no arguments; a `.env`
//! file is honored. Jitter windows are validated so a misconfigured range
//! fails fast instead of panicking mid-run.

use std::env;
use std::time::Duration;

/// Sent on every HTTP request and installed in the browser session
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherBackend {
    Api,
    Browser,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub query: String,
    pub top_pairs: usize,
    pub output_path: String,
    pub backend: FetcherBackend,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
    pub retry_max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub backoff_spread: Duration,
    pub discovery_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Bounded wait for the trader panel (browser backend)
    pub panel_wait: Duration,
    pub nav_delay_min: Duration,
    pub nav_delay_max: Duration,
    pub emit_synthesized: bool,
    pub resume_from_output: bool,
    pub browser_headless: bool,
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|s| s.to_lowercase().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `HARVEST_QUERY` (default: "solana meme")
    /// - `HARVEST_TOP_PAIRS` (default: 20)
    /// - `HARVEST_OUTPUT` (default: trader_addresses.csv)
    /// - `HARVEST_BACKEND` - "api" or "browser" (default: api)
    /// - `PACING_MIN_MS` / `PACING_MAX_MS` (default: 1000 / 3000)
    /// - `RETRY_MAX_ATTEMPTS` (default: 3)
    /// - `RETRY_BACKOFF_MIN_SECS` / `RETRY_BACKOFF_MAX_SECS` /
    ///   `RETRY_BACKOFF_SPREAD_SECS` (default: 10 / 15 / 5)
    /// - `DISCOVERY_TIMEOUT_SECS` / `FETCH_TIMEOUT_SECS` (default: 30 / 30)
    /// - `PANEL_WAIT_SECS` (default: 8)
    /// - `NAV_DELAY_MIN_MS` / `NAV_DELAY_MAX_MS` (default: 500 / 2500)
    /// - `EMIT_SYNTHESIZED` (default: false)
    /// - `RESUME_FROM_OUTPUT` (default: false)
    /// - `BROWSER_HEADLESS` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let query = env::var("HARVEST_QUERY").unwrap_or_else(|_| "solana meme".to_string());
        if query.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "HARVEST_QUERY cannot be empty".to_string(),
            ));
        }

        let top_pairs = env_u64("HARVEST_TOP_PAIRS", 20) as usize;
        if top_pairs == 0 {
            return Err(ConfigError::InvalidValue(
                "HARVEST_TOP_PAIRS must be at least 1".to_string(),
            ));
        }

        let backend_str = env::var("HARVEST_BACKEND").unwrap_or_else(|_| "api".to_string());
        let backend = match backend_str.to_lowercase().as_str() {
            "api" => FetcherBackend::Api,
            "browser" => FetcherBackend::Browser,
            _ => {
                log::warn!("Invalid HARVEST_BACKEND '{}', defaulting to api", backend_str);
                FetcherBackend::Api
            }
        };

        let config = Self {
            query,
            top_pairs,
            output_path: env::var("HARVEST_OUTPUT")
                .unwrap_or_else(|_| "trader_addresses.csv".to_string()),
            backend,
            pacing_min: Duration::from_millis(env_u64("PACING_MIN_MS", 1_000)),
            pacing_max: Duration::from_millis(env_u64("PACING_MAX_MS", 3_000)),
            retry_max_attempts: env_u64("RETRY_MAX_ATTEMPTS", 3) as u32,
            backoff_min: Duration::from_secs(env_u64("RETRY_BACKOFF_MIN_SECS", 10)),
            backoff_max: Duration::from_secs(env_u64("RETRY_BACKOFF_MAX_SECS", 15)),
            backoff_spread: Duration::from_secs(env_u64("RETRY_BACKOFF_SPREAD_SECS", 5)),
            discovery_timeout: Duration::from_secs(env_u64("DISCOVERY_TIMEOUT_SECS", 30)),
            fetch_timeout: Duration::from_secs(env_u64("FETCH_TIMEOUT_SECS", 30)),
            panel_wait: Duration::from_secs(env_u64("PANEL_WAIT_SECS", 8)),
            nav_delay_min: Duration::from_millis(env_u64("NAV_DELAY_MIN_MS", 500)),
            nav_delay_max: Duration::from_millis(env_u64("NAV_DELAY_MAX_MS", 2_500)),
            emit_synthesized: env_bool("EMIT_SYNTHESIZED", false),
            resume_from_output: env_bool("RESUME_FROM_OUTPUT", false),
            browser_headless: env_bool("BROWSER_HEADLESS", true),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pacing_min > self.pacing_max {
            return Err(ConfigError::InvalidValue(format!(
                "PACING_MIN_MS ({}ms) exceeds PACING_MAX_MS ({}ms)",
                self.pacing_min.as_millis(),
                self.pacing_max.as_millis()
            )));
        }

        if self.backoff_min > self.backoff_max {
            return Err(ConfigError::InvalidValue(format!(
                "RETRY_BACKOFF_MIN_SECS ({}s) exceeds RETRY_BACKOFF_MAX_SECS ({}s)",
                self.backoff_min.as_secs(),
                self.backoff_max.as_secs()
            )));
        }

        if self.nav_delay_min > self.nav_delay_max {
            return Err(ConfigError::InvalidValue(format!(
                "NAV_DELAY_MIN_MS ({}ms) exceeds NAV_DELAY_MAX_MS ({}ms)",
                self.nav_delay_min.as_millis(),
                self.nav_delay_max.as_millis()
            )));
        }

        if self.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
