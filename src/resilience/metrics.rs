//! # Circuit Breaker Metrics
//!
//! Per-breaker call accounting plus a system-wide aggregate used by the
//! registry's health reporting.

use crate::resilience::CircuitState;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Call accounting for a single circuit breaker instance.
#[derive(Debug, Clone, Serialize)]
pub struct CallMetrics {
    /// Calls that reached the guarded operation.
    pub total_calls: u64,

    /// Calls that completed successfully.
    pub success_count: u64,

    /// Calls that failed or timed out.
    pub failure_count: u64,

    /// Calls rejected without executing because the circuit was open.
    pub rejected_calls: u64,

    /// Wall-clock time spent inside guarded operations.
    pub total_duration: Duration,

    /// Breaker state at the time the snapshot was taken.
    pub current_state: CircuitState,
}

impl CallMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
        }
    }

    /// Failure rate over executed calls (0.0 to 1.0). Rejections are not
    /// counted; they never reached the operation.
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failure_count as f64 / self.total_calls as f64
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_calls as f64
    }

    pub fn average_duration(&self) -> Duration {
        if self.total_calls == 0 {
            return Duration::ZERO;
        }
        self.total_duration / self.total_calls as u32
    }

    /// A breaker counts as healthy while closed with a modest failure
    /// rate, or while half-open (actively recovering).
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate() < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "State: {:?} | Calls: {} | Success: {:.1}% | Rejected: {} | Avg: {:.2}ms",
            self.current_state,
            self.total_calls,
            self.success_rate() * 100.0,
            self.rejected_calls,
            self.average_duration().as_secs_f64() * 1000.0
        )
    }
}

impl Default for CallMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated metrics across every breaker in a registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryMetrics {
    /// Metrics per breaker, keyed by dependency name.
    pub breakers: HashMap<String, CallMetrics>,

    /// When this snapshot was collected.
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        Self {
            breakers: HashMap::new(),
            collected_at: chrono::Utc::now(),
        }
    }

    pub fn insert(&mut self, name: String, metrics: CallMetrics) {
        self.breakers.insert(name, metrics);
        self.collected_at = chrono::Utc::now();
    }

    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for metrics in self.breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }
        counts
    }

    pub fn unhealthy(&self) -> Vec<(&String, &CallMetrics)> {
        self.breakers
            .iter()
            .filter(|(_, metrics)| !metrics.is_healthy())
            .collect()
    }

    /// Fraction of breakers currently healthy (1.0 when none registered).
    pub fn health_score(&self) -> f64 {
        if self.breakers.is_empty() {
            return 1.0;
        }
        let healthy = self.breakers.values().filter(|m| m.is_healthy()).count();
        healthy as f64 / self.breakers.len() as f64
    }

    pub fn total_calls(&self) -> u64 {
        self.breakers.values().map(|m| m.total_calls).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.breakers.values().map(|m| m.failure_count).sum()
    }

    pub fn system_failure_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            return 0.0;
        }
        self.total_failures() as f64 / total as f64
    }

    pub fn format_summary(&self) -> String {
        let counts = self.count_by_state();
        format!(
            "Circuit breakers: {} total | {} closed | {} open | {} half-open | Health: {:.1}% | Failure rate: {:.2}%",
            self.breakers.len(),
            counts.get(&CircuitState::Closed).unwrap_or(&0),
            counts.get(&CircuitState::Open).unwrap_or(&0),
            counts.get(&CircuitState::HalfOpen).unwrap_or(&0),
            self.health_score() * 100.0,
            self.system_failure_rate() * 100.0
        )
    }
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_healthy_zeros() {
        let metrics = CallMetrics::new();
        assert_eq!(metrics.total_calls, 0);
        assert_eq!(metrics.failure_rate(), 0.0);
        assert_eq!(metrics.average_duration(), Duration::ZERO);
        assert!(metrics.is_healthy());
    }

    #[test]
    fn health_follows_state_and_failure_rate() {
        let mut metrics = CallMetrics::new();
        metrics.total_calls = 100;
        metrics.success_count = 95;
        metrics.failure_count = 5;
        assert!(metrics.is_healthy());

        metrics.failure_count = 15;
        metrics.success_count = 85;
        assert!(!metrics.is_healthy());

        metrics.current_state = CircuitState::Open;
        metrics.failure_count = 0;
        assert!(!metrics.is_healthy());

        metrics.current_state = CircuitState::HalfOpen;
        assert!(metrics.is_healthy());
    }

    #[test]
    fn registry_aggregation() {
        let mut registry = RegistryMetrics::new();

        let mut quotes = CallMetrics::new();
        quotes.total_calls = 100;
        quotes.success_count = 95;
        quotes.failure_count = 5;

        let mut analysis = CallMetrics::new();
        analysis.current_state = CircuitState::Open;
        analysis.total_calls = 50;
        analysis.success_count = 25;
        analysis.failure_count = 25;

        registry.insert("quote-feed".to_string(), quotes);
        registry.insert("analysis".to_string(), analysis);

        assert_eq!(registry.total_calls(), 150);
        assert_eq!(registry.total_failures(), 30);
        assert_eq!(registry.system_failure_rate(), 0.2);
        assert_eq!(registry.health_score(), 0.5);

        let counts = registry.count_by_state();
        assert_eq!(counts.get(&CircuitState::Closed), Some(&1));
        assert_eq!(counts.get(&CircuitState::Open), Some(&1));

        let unhealthy = registry.unhealthy();
        assert_eq!(unhealthy.len(), 1);
        assert_eq!(unhealthy[0].0, "analysis");
    }
}
