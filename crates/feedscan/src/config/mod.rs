//! Runtime settings for the ingest core.
//!
//! Everything is sourced from the process environment so the hosting
//! container can tune the pipeline without a config file. The only setting
//! without a default is `VALIDATOR_MIN_COLUMNS`: feeds disagree on their
//! minimum column count, so callers must state it explicitly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_FRAGMENT_MAX_BYTES: usize = 32 * 1024 * 1024;

/// Column checks applied to every data line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorSettings {
    /// Minimum number of delimited columns a line must carry. No default.
    pub min_columns: usize,
    /// Zero-based column holding the currency code.
    pub currency_column: usize,
    /// Zero-based column holding the province code.
    pub province_column: usize,
    /// Zero-based column holding the product code.
    pub product_column: usize,
}

impl ValidatorSettings {
    /// Source-feed column layout with an explicit minimum column count.
    pub fn with_min_columns(min_columns: usize) -> Self {
        Self {
            min_columns,
            currency_column: 3,
            province_column: 10,
            product_column: 11,
        }
    }
}

/// Process-wide settings, one field per environment knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Cap on concurrently running job runners.
    pub max_concurrent_jobs: usize,
    /// Fragment worker threads per job.
    pub num_workers: usize,
    /// Byte budget after which the fragmenter cuts at the last newline.
    pub fragment_max_bytes: usize,
    /// Seconds between heartbeat writes to the job row.
    pub heartbeat_interval_secs: u64,
    /// Age in seconds after which a PROCESSING job counts as abandoned.
    pub heartbeat_timeout_secs: u64,
    /// Seconds between throughput log lines.
    pub metrics_log_interval_secs: u64,
    /// Abort the job once this many error lines have accumulated.
    pub fail_fast_threshold: u64,
    /// Percentage of the container memory budget that triggers an abort.
    pub memory_threshold_percent: u8,
    /// Declared container memory budget in megabytes.
    pub container_memory_mb: u64,
    /// Identity component recorded in `claimed_by` on claim.
    pub instance_index: String,
    pub validator: ValidatorSettings,
}

impl Settings {
    /// Defaults for everything except the feed-specific minimum column count.
    pub fn with_min_columns(min_columns: usize) -> Self {
        Self {
            max_concurrent_jobs: 1,
            num_workers: 2,
            fragment_max_bytes: DEFAULT_FRAGMENT_MAX_BYTES,
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 60,
            metrics_log_interval_secs: 10,
            fail_fast_threshold: 50_000,
            memory_threshold_percent: 75,
            container_memory_mb: 2048,
            instance_index: "0".to_string(),
            validator: ValidatorSettings::with_min_columns(min_columns),
        }
    }

    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary lookup function.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = get("VALIDATOR_MIN_COLUMNS").ok_or_else(|| ConfigError::Missing {
            key: "VALIDATOR_MIN_COLUMNS".to_string(),
        })?;
        let min_columns: usize = raw.parse().map_err(|_| ConfigError::Invalid {
            key: "VALIDATOR_MIN_COLUMNS".to_string(),
            value: raw.clone(),
        })?;

        let mut settings = Self::with_min_columns(min_columns);
        settings.max_concurrent_jobs =
            parse_or(&get, "MAX_CONCURRENT_JOBS", settings.max_concurrent_jobs)?;
        settings.num_workers = parse_or(&get, "NUM_WORKERS", settings.num_workers)?;
        settings.fragment_max_bytes =
            parse_or(&get, "FRAGMENT_MAX_BYTES", settings.fragment_max_bytes)?;
        settings.heartbeat_interval_secs =
            parse_or(&get, "HEARTBEAT_INTERVAL", settings.heartbeat_interval_secs)?;
        settings.heartbeat_timeout_secs =
            parse_or(&get, "HEARTBEAT_TIMEOUT", settings.heartbeat_timeout_secs)?;
        settings.metrics_log_interval_secs = parse_or(
            &get,
            "METRICS_LOG_INTERVAL",
            settings.metrics_log_interval_secs,
        )?;
        settings.fail_fast_threshold =
            parse_or(&get, "FAIL_FAST_THRESHOLD", settings.fail_fast_threshold)?;
        settings.memory_threshold_percent = parse_or(
            &get,
            "MEMORY_THRESHOLD_PERCENT",
            settings.memory_threshold_percent,
        )?;
        settings.container_memory_mb =
            parse_or(&get, "CONTAINER_MEMORY_MB", settings.container_memory_mb)?;
        if let Some(index) = get("INSTANCE_INDEX") {
            settings.instance_index = index;
        }
        settings.validator.currency_column = parse_or(
            &get,
            "VALIDATOR_CURRENCY_COLUMN",
            settings.validator.currency_column,
        )?;
        settings.validator.province_column = parse_or(
            &get,
            "VALIDATOR_PROVINCE_COLUMN",
            settings.validator.province_column,
        )?;
        settings.validator.product_column = parse_or(
            &get,
            "VALIDATOR_PRODUCT_COLUMN",
            settings.validator.product_column,
        )?;

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(validation("NUM_WORKERS must be at least 1"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(validation("MAX_CONCURRENT_JOBS must be at least 1"));
        }
        if self.fragment_max_bytes == 0 {
            return Err(validation("FRAGMENT_MAX_BYTES must be positive"));
        }
        if self.memory_threshold_percent == 0 || self.memory_threshold_percent > 100 {
            return Err(validation("MEMORY_THRESHOLD_PERCENT must be within 1..=100"));
        }
        if self.validator.min_columns == 0 {
            return Err(validation("VALIDATOR_MIN_COLUMNS must be at least 1"));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_log_interval_secs)
    }

    /// Resident-memory ceiling in bytes derived from the container budget.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.container_memory_mb * 1024 * 1024 * u64::from(self.memory_threshold_percent) / 100
    }

    /// Identity written into `claimed_by` when this instance claims a job.
    pub fn instance_id(&self) -> String {
        format!("feedscan-{}", self.instance_index)
    }
}

fn validation(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_min_columns_is_required() {
        let map = HashMap::new();
        let err = Settings::from_lookup(lookup(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key } if key == "VALIDATOR_MIN_COLUMNS"));
    }

    #[test]
    fn test_defaults_apply() {
        let map = HashMap::from([("VALIDATOR_MIN_COLUMNS", "12")]);
        let settings = Settings::from_lookup(lookup(&map)).unwrap();

        assert_eq!(settings.max_concurrent_jobs, 1);
        assert_eq!(settings.num_workers, 2);
        assert_eq!(settings.fragment_max_bytes, 32 * 1024 * 1024);
        assert_eq!(settings.heartbeat_interval_secs, 15);
        assert_eq!(settings.heartbeat_timeout_secs, 60);
        assert_eq!(settings.metrics_log_interval_secs, 10);
        assert_eq!(settings.fail_fast_threshold, 50_000);
        assert_eq!(settings.memory_threshold_percent, 75);
        assert_eq!(settings.container_memory_mb, 2048);
        assert_eq!(settings.instance_index, "0");
        assert_eq!(settings.validator.min_columns, 12);
        assert_eq!(settings.validator.currency_column, 3);
        assert_eq!(settings.validator.province_column, 10);
        assert_eq!(settings.validator.product_column, 11);
    }

    #[test]
    fn test_overrides_apply() {
        let map = HashMap::from([
            ("VALIDATOR_MIN_COLUMNS", "18"),
            ("MAX_CONCURRENT_JOBS", "2"),
            ("NUM_WORKERS", "4"),
            ("FRAGMENT_MAX_BYTES", "1048576"),
            ("INSTANCE_INDEX", "3"),
        ]);
        let settings = Settings::from_lookup(lookup(&map)).unwrap();

        assert_eq!(settings.validator.min_columns, 18);
        assert_eq!(settings.max_concurrent_jobs, 2);
        assert_eq!(settings.num_workers, 4);
        assert_eq!(settings.fragment_max_bytes, 1024 * 1024);
        assert_eq!(settings.instance_id(), "feedscan-3");
    }

    #[test]
    fn test_invalid_number_rejected() {
        let map = HashMap::from([
            ("VALIDATOR_MIN_COLUMNS", "12"),
            ("NUM_WORKERS", "not-a-number"),
        ]);
        let err = Settings::from_lookup(lookup(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == "NUM_WORKERS"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let map = HashMap::from([("VALIDATOR_MIN_COLUMNS", "12"), ("NUM_WORKERS", "0")]);
        let err = Settings::from_lookup(lookup(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_memory_limit_bytes() {
        let mut settings = Settings::with_min_columns(12);
        settings.container_memory_mb = 1000;
        settings.memory_threshold_percent = 75;
        assert_eq!(settings.memory_limit_bytes(), 750 * 1024 * 1024);
    }
}
