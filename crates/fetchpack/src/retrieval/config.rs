//! Configuration types for the retrieval engine

use std::str::FromStr;
use std::time::Duration;

use crate::retrieval::core::{Result, RetrievalError};

/// Prefix of every environment variable read by [`RetrievalConfig::from_env`]
pub const ENV_PREFIX: &str = "FETCHPACK_";

/// Configuration for one retrieval run
///
/// The pacing values (backoff unit, pauses) depend on the origin's rate
/// limits, so they are plain settings rather than constants.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Maximum number of fetches in flight at once (archived mode)
    pub concurrency: usize,
    /// Objects submitted per sub-batch (archived mode)
    pub batch_size: usize,
    /// Total attempts per object, including the first
    pub max_attempts_per_object: usize,
    /// Linear backoff unit: the wait before attempt `n + 1` is `retry_base_delay * n`
    pub retry_base_delay: Duration,
    /// Courtesy pause between sub-batches
    pub inter_batch_pause: Duration,
    /// Courtesy pause between objects in progressive mode
    pub inter_object_pause: Duration,
    /// Hard timeout for a single attempt in progressive mode
    pub object_timeout: Duration,
    /// Timeout of the HTTP client
    pub request_timeout: Duration,
    /// Number of instantaneous speed samples kept for smoothing
    pub speed_sample_window: usize,
    pub user_agent: String,
    /// Owner/session qualifier forwarded to the byte fetcher
    pub owner_qualifier: Option<String>,
}

impl RetrievalConfig {
    /// Check the invariants the components rely on
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RetrievalError::configuration("concurrency", "concurrency must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(RetrievalError::configuration("batch_size", "batch size must be at least 1"));
        }
        if self.max_attempts_per_object == 0 {
            return Err(RetrievalError::configuration(
                "max_attempts_per_object",
                "at least one attempt per object is required",
            ));
        }
        if self.speed_sample_window == 0 {
            return Err(RetrievalError::configuration(
                "speed_sample_window",
                "speed sample window must hold at least one sample",
            ));
        }
        if self.object_timeout.is_zero() {
            return Err(RetrievalError::configuration("object_timeout", "object timeout must be non-zero"));
        }
        Ok(())
    }

    /// Defaults overridden by `FETCHPACK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(value) = var("CONCURRENCY") {
            config.concurrency = parse_var("CONCURRENCY", &value)?;
        }
        if let Some(value) = var("BATCH_SIZE") {
            config.batch_size = parse_var("BATCH_SIZE", &value)?;
        }
        if let Some(value) = var("MAX_ATTEMPTS") {
            config.max_attempts_per_object = parse_var("MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = var("RETRY_DELAY_MS") {
            config.retry_base_delay = Duration::from_millis(parse_var("RETRY_DELAY_MS", &value)?);
        }
        if let Some(value) = var("BATCH_PAUSE_MS") {
            config.inter_batch_pause = Duration::from_millis(parse_var("BATCH_PAUSE_MS", &value)?);
        }
        if let Some(value) = var("OBJECT_PAUSE_MS") {
            config.inter_object_pause = Duration::from_millis(parse_var("OBJECT_PAUSE_MS", &value)?);
        }
        if let Some(value) = var("OBJECT_TIMEOUT_SECS") {
            config.object_timeout = Duration::from_secs(parse_var("OBJECT_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = var("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = var("OWNER") {
            let value = value.trim().to_string();
            config.owner_qualifier = (!value.is_empty()).then_some(value);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| RetrievalError::Configuration {
        message: format!("{}{} has an invalid value '{}'", ENV_PREFIX, name, value),
        field: Some(format!("{}{}", ENV_PREFIX, name)),
    })
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 20,
            max_attempts_per_object: 3,
            retry_base_delay: Duration::from_millis(1000),
            inter_batch_pause: Duration::from_millis(500),
            inter_object_pause: Duration::from_millis(500),
            object_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(60),
            speed_sample_window: 10,
            user_agent: concat!("fetchpack/", env!("CARGO_PKG_VERSION")).to_string(),
            owner_qualifier: None,
        }
    }
}
