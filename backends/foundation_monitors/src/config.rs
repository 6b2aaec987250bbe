//! Serde backed configuration for the monitor components.
//!
//! Configuration is plain TOML, every section is optional:
//!
//! ```toml
//! [queue]
//! capacity = 5
//!
//! [limiter]
//! capacity = 10
//! refill_interval = 0.5   # seconds, fractions allowed
//! initial_tokens = 0
//! thread_name = "api_limiter"
//!
//! [scheduler]
//! thread_name = "deferred_dispatcher"
//! ```

use std::time;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::errors::ConfigError;

pub const DEFAULT_REFILL_INTERVAL: time::Duration = time::Duration::from_secs(1);

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorsConfig {
    pub queue: Option<QueueConfig>,
    pub limiter: Option<BucketConfig>,
    pub scheduler: Option<SchedulerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub capacity: usize,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum number of tokens the bucket holds (the burst size).
    pub capacity: usize,

    /// One token is added every `refill_interval`.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(default = "default_refill_interval")]
    pub refill_interval: time::Duration,

    /// Tokens available before the first tick.
    #[serde(default)]
    pub initial_tokens: usize,

    /// Name given to the ticker thread.
    #[serde(default)]
    pub thread_name: Option<String>,
}

impl BucketConfig {
    #[must_use]
    pub fn new(capacity: usize, refill_interval: time::Duration) -> Self {
        Self {
            capacity,
            refill_interval,
            initial_tokens: 0,
            thread_name: None,
        }
    }

    /// Checks the invariants a usable bucket needs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero capacity, a zero interval or
    /// more initial tokens than capacity.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity("TokenBucketLimiter"));
        }

        if self.refill_interval.is_zero() {
            return Err(ConfigError::ZeroRefillInterval);
        }

        if self.initial_tokens > self.capacity {
            return Err(ConfigError::InitialTokensAboveCapacity {
                initial: self.initial_tokens,
                capacity: self.capacity,
            });
        }

        Ok(())
    }
}

fn default_refill_interval() -> time::Duration {
    DEFAULT_REFILL_INTERVAL
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Name given to the dispatcher thread.
    #[serde(default)]
    pub thread_name: Option<String>,
}

/// `from_str` deserializes any configuration type from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::DeserializationFailed`] for malformed TOML or
/// values of the wrong type (e.g. a negative capacity).
pub fn from_str<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config_obj: T = toml::from_str(content)?;
    Ok(config_obj)
}

/// `from_path` reads and deserializes a TOML file.
///
/// # Errors
///
/// Returns [`ConfigError::IOError`] if the file can not be read and
/// [`ConfigError::DeserializationFailed`] if its content is invalid.
pub fn from_path<T, V>(target: V) -> ConfigResult<T>
where
    T: DeserializeOwned,
    V: Into<std::path::PathBuf>,
{
    let target_path = target.into();
    let config_content = std::fs::read_to_string(target_path)?;
    from_str(&config_content)
}

#[cfg(test)]
mod test_config {
    use super::*;

    #[test]
    fn parses_full_document() {
        let config: MonitorsConfig = from_str(
            r#"
            [queue]
            capacity = 5

            [limiter]
            capacity = 10
            refill_interval = 0.25
            initial_tokens = 2
            thread_name = "api_limiter"

            [scheduler]
            thread_name = "dispatcher"
            "#,
        )
        .expect("should parse");

        assert_eq!(config.queue, Some(QueueConfig { capacity: 5 }));

        let limiter = config.limiter.expect("limiter section");
        assert_eq!(limiter.capacity, 10);
        assert_eq!(limiter.refill_interval, time::Duration::from_millis(250));
        assert_eq!(limiter.initial_tokens, 2);
        assert_eq!(limiter.thread_name.as_deref(), Some("api_limiter"));

        assert_eq!(
            config.scheduler,
            Some(SchedulerConfig {
                thread_name: Some(String::from("dispatcher"))
            })
        );
    }

    #[test]
    fn limiter_defaults_to_one_second_refill() {
        let config: BucketConfig = from_str("capacity = 1").expect("should parse");
        assert_eq!(config.refill_interval, DEFAULT_REFILL_INTERVAL);
        assert_eq!(config.initial_tokens, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_has_no_sections() {
        let config: MonitorsConfig = from_str("").expect("should parse");
        assert_eq!(config, MonitorsConfig::default());
    }

    #[test]
    fn negative_capacity_fails_to_deserialize() {
        let result: ConfigResult<QueueConfig> = from_str("capacity = -1");
        assert!(matches!(result, Err(ConfigError::DeserializationFailed(_))));
    }

    #[test]
    fn validate_rejects_unusable_buckets() {
        let zero_capacity = BucketConfig::new(0, DEFAULT_REFILL_INTERVAL);
        assert!(matches!(
            zero_capacity.validate(),
            Err(ConfigError::ZeroCapacity("TokenBucketLimiter"))
        ));

        let zero_interval = BucketConfig::new(1, time::Duration::ZERO);
        assert!(matches!(
            zero_interval.validate(),
            Err(ConfigError::ZeroRefillInterval)
        ));

        let mut overfilled = BucketConfig::new(2, DEFAULT_REFILL_INTERVAL);
        overfilled.initial_tokens = 3;
        assert!(matches!(
            overfilled.validate(),
            Err(ConfigError::InitialTokensAboveCapacity {
                initial: 3,
                capacity: 2
            })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result: ConfigResult<MonitorsConfig> =
            from_path("/definitely/not/here/monitors.toml");
        assert!(matches!(result, Err(ConfigError::IOError(_))));
    }
}
