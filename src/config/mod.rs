//! # Configuration System
//!
//! Layered configuration for the caching and resilience facade. Values
//! come from an optional config file merged with `STOCKDASH_*`
//! environment variables, validated before use. Every setting has a
//! production-safe default so the facade boots with no file at all.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stockdash_core::config::StockdashConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StockdashConfig::load()?;
//! assert!(!config.cache.namespace.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::cache::{ScheduleConfig, TtlPolicy};
use crate::resilience::{BackoffStrategy, CircuitBreakerConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Configuration loading and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Detect the running environment from `STOCKDASH_ENV`, then `APP_ENV`,
/// defaulting to `development`.
pub fn detect_environment() -> String {
    std::env::var("STOCKDASH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Cache namespace and per-entity TTLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Key namespace prefix shared by every cache entry.
    pub namespace: String,
    pub quote_ttl_secs: u64,
    pub analysis_ttl_secs: u64,
    pub history_ttl_secs: u64,
    pub symbol_list_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: "stockdash".to_string(),
            quote_ttl_secs: 120,
            analysis_ttl_secs: 15 * 60,
            history_ttl_secs: 60 * 60,
            symbol_list_ttl_secs: 6 * 60 * 60,
        }
    }
}

/// Default circuit breaker thresholds plus per-dependency overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub timeout_secs: u64,
    pub retry_duration_secs: u64,
    /// Overrides keyed by dependency name; unset fields inherit the
    /// defaults above.
    pub dependencies: HashMap<String, BreakerOverride>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
            retry_duration_secs: 30,
            dependencies: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub retry_duration_secs: Option<u64>,
}

/// Retry attempts and backoff shape for transient remote failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay_ms: u64,
    /// Growth factor for exponential backoff.
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Fixed,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Background maintenance intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub health_interval_secs: u64,
    pub metrics_interval_secs: u64,
    pub maintenance_interval_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            health_interval_secs: 30,
            metrics_interval_secs: 60,
            maintenance_interval_secs: 300,
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StockdashConfig {
    pub cache: CacheSettings,
    pub circuit_breaker: BreakerSettings,
    pub retry: RetrySettings,
    pub schedule: ScheduleSettings,
}

impl StockdashConfig {
    /// Load from the default sources: an optional `stockdash` config file
    /// in the working directory, then `STOCKDASH_*` environment variables
    /// (nested keys separated by `__`, e.g. `STOCKDASH_CACHE__NAMESPACE`).
    pub fn load() -> Result<Self, ConfigError> {
        let environment = detect_environment();
        debug!(environment = %environment, "Loading configuration");

        let settings = config::Config::builder()
            .add_source(config::File::with_name("stockdash").required(false))
            .add_source(
                config::File::with_name(&format!("stockdash.{environment}")).required(false),
            )
            .add_source(
                config::Environment::with_prefix("STOCKDASH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load from one explicit file, with environment variables layered on
    /// top. Used by tests and bespoke deployments.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("STOCKDASH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.namespace.is_empty() {
            return Err(ConfigError::Invalid("cache.namespace must not be empty".into()));
        }
        if self.cache.namespace.contains(':') || self.cache.namespace.contains('*') {
            return Err(ConfigError::Invalid(
                "cache.namespace must not contain ':' or '*'".into(),
            ));
        }
        self.breaker_defaults()
            .validate()
            .map_err(|msg| ConfigError::Invalid(format!("circuit_breaker: {msg}")))?;
        for name in self.circuit_breaker.dependencies.keys() {
            self.breaker_for(name)
                .validate()
                .map_err(|msg| ConfigError::Invalid(format!("circuit_breaker.{name}: {msg}")))?;
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.backoff == BackoffKind::Exponential && self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            quote: Duration::from_secs(self.cache.quote_ttl_secs),
            analysis: Duration::from_secs(self.cache.analysis_ttl_secs),
            history: Duration::from_secs(self.cache.history_ttl_secs),
            symbol_list: Duration::from_secs(self.cache.symbol_list_ttl_secs),
        }
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            health_interval: Duration::from_secs(self.schedule.health_interval_secs),
            metrics_interval: Duration::from_secs(self.schedule.metrics_interval_secs),
            maintenance_interval: Duration::from_secs(self.schedule.maintenance_interval_secs),
        }
    }

    pub fn breaker_defaults(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            timeout: Duration::from_secs(self.circuit_breaker.timeout_secs),
            retry_duration: Duration::from_secs(self.circuit_breaker.retry_duration_secs),
        }
    }

    /// Effective breaker config for one dependency, with overrides
    /// applied over the defaults.
    pub fn breaker_for(&self, dependency: &str) -> CircuitBreakerConfig {
        let defaults = self.breaker_defaults();
        match self.circuit_breaker.dependencies.get(dependency) {
            Some(over) => CircuitBreakerConfig {
                failure_threshold: over.failure_threshold.unwrap_or(defaults.failure_threshold),
                timeout: over
                    .timeout_secs
                    .map_or(defaults.timeout, Duration::from_secs),
                retry_duration: over
                    .retry_duration_secs
                    .map_or(defaults.retry_duration, Duration::from_secs),
            },
            None => defaults,
        }
    }

    pub fn breaker_overrides(&self) -> HashMap<String, CircuitBreakerConfig> {
        self.circuit_breaker
            .dependencies
            .keys()
            .map(|name| (name.clone(), self.breaker_for(name)))
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.retry.backoff {
            BackoffKind::Fixed => {
                BackoffStrategy::Fixed(Duration::from_millis(self.retry.base_delay_ms))
            }
            BackoffKind::Exponential => BackoffStrategy::Exponential {
                base: Duration::from_millis(self.retry.base_delay_ms),
                multiplier: self.retry.multiplier,
                max: Duration::from_millis(self.retry.max_delay_ms),
            },
        };
        RetryPolicy::new(self.retry.max_attempts, backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = StockdashConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.namespace, "stockdash");
        assert_eq!(config.ttl_policy().quote, Duration::from_secs(120));
        assert_eq!(config.breaker_defaults().failure_threshold, 5);
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn loads_from_toml_file_with_overrides() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        write!(
            file,
            r#"
[cache]
namespace = "dashboard"
quote_ttl_secs = 60

[circuit_breaker]
failure_threshold = 3

[circuit_breaker.dependencies.quote-feed]
failure_threshold = 2
retry_duration_secs = 10

[retry]
max_attempts = 4
backoff = "exponential"
base_delay_ms = 100
"#
        )
        .unwrap();

        let config = StockdashConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.cache.namespace, "dashboard");
        assert_eq!(config.ttl_policy().quote, Duration::from_secs(60));
        // Unset fields fall back to defaults.
        assert_eq!(config.ttl_policy().analysis, Duration::from_secs(900));

        assert_eq!(config.breaker_defaults().failure_threshold, 3);
        let quote_feed = config.breaker_for("quote-feed");
        assert_eq!(quote_feed.failure_threshold, 2);
        assert_eq!(quote_feed.retry_duration, Duration::from_secs(10));
        assert_eq!(quote_feed.timeout, Duration::from_secs(60));

        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.backoff, BackoffKind::Exponential);
    }

    #[test]
    fn rejects_invalid_namespace() {
        let mut config = StockdashConfig::default();
        config.cache.namespace = "bad:namespace".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.cache.namespace = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_thresholds() {
        let mut config = StockdashConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = StockdashConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
