//! # Circuit Breaker Registry
//!
//! Central directory of per-dependency circuit breakers. Breakers are
//! created on first use and live for the process lifetime, so every call
//! site guarding the same dependency shares one breaker.

use crate::resilience::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState,
};
use crate::resilience::metrics::RegistryMetrics;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Process-wide registry of named circuit breakers.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    /// Per-dependency config overrides applied at creation time.
    overrides: HashMap<String, CircuitBreakerConfig>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            overrides: HashMap::new(),
        }
    }

    pub fn with_overrides(
        default_config: CircuitBreakerConfig,
        overrides: HashMap<String, CircuitBreakerConfig>,
    ) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            overrides,
        }
    }

    /// Fetch the breaker for `name`, creating it with the dependency's
    /// configured (or default) settings on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }

        let config = self
            .overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());

        // entry() arbitrates concurrent first calls for the same name.
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(dependency = name, "Registering circuit breaker");
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone();
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    pub fn status(&self, name: &str) -> Option<CircuitBreakerStatus> {
        self.get(name).map(|breaker| breaker.status())
    }

    pub fn status_all(&self) -> HashMap<String, CircuitBreakerStatus> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    /// Reset one breaker to Closed. Returns false when the name is
    /// unknown.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
        info!(count = self.breakers.len(), "All circuit breakers reset");
    }

    /// Count of breakers per state, for health endpoints.
    pub fn state_summary(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for entry in self.breakers.iter() {
            *counts.entry(entry.value().state()).or_insert(0) += 1;
        }
        counts
    }

    pub fn metrics(&self) -> RegistryMetrics {
        let mut aggregate = RegistryMetrics::new();
        for entry in self.breakers.iter() {
            aggregate.insert(entry.key().clone(), entry.value().metrics());
        }
        aggregate
    }

    /// Fraction of registered breakers currently healthy.
    pub fn health_score(&self) -> f64 {
        self.metrics().health_score()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_name_shares_one_breaker() {
        let registry = CircuitBreakerRegistry::default();

        let a = registry.get_or_create("quote-feed");
        let b = registry.get_or_create("quote-feed");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        let _ = a
            .call(|| async { Err::<(), _>("boom".to_string()) })
            .await;
        assert_eq!(b.failure_count(), 1);
    }

    #[tokio::test]
    async fn overrides_apply_at_creation() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "quote-feed".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                timeout: Duration::from_secs(3),
                retry_duration: Duration::from_secs(5),
            },
        );
        let registry =
            CircuitBreakerRegistry::with_overrides(CircuitBreakerConfig::default(), overrides);

        let quote = registry.get_or_create("quote-feed");
        assert_eq!(quote.config().failure_threshold, 2);

        let other = registry.get_or_create("analysis");
        assert_eq!(other.config().failure_threshold, 5);
    }

    #[tokio::test]
    async fn status_and_reset_by_name() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_secs(5),
            retry_duration: Duration::from_secs(30),
        });

        let breaker = registry.get_or_create("analysis");
        let _ = breaker
            .call(|| async { Err::<(), _>("boom".to_string()) })
            .await;

        let status = registry.status("analysis").unwrap();
        assert!(status.is_open);
        assert_eq!(status.failure_count, 1);
        assert!(registry.status("unknown").is_none());

        assert!(registry.reset("analysis"));
        assert!(registry.status("analysis").unwrap().is_closed);
        assert!(!registry.reset("unknown"));
    }

    #[tokio::test]
    async fn summary_and_health_track_states() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_secs(5),
            retry_duration: Duration::from_secs(30),
        });

        registry.get_or_create("quote-feed");
        let failing = registry.get_or_create("analysis");
        let _ = failing
            .call(|| async { Err::<(), _>("boom".to_string()) })
            .await;

        let summary = registry.state_summary();
        assert_eq!(summary.get(&CircuitState::Closed), Some(&1));
        assert_eq!(summary.get(&CircuitState::Open), Some(&1));
        assert_eq!(registry.health_score(), 0.5);

        registry.reset_all();
        assert_eq!(registry.health_score(), 1.0);
    }
}
