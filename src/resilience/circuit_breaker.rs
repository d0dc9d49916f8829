//! # Circuit Breaker
//!
//! Fault isolation for calls to the remote analytics service. Follows the
//! classic three-state pattern: Closed (normal operation), Open (failing
//! fast), and HalfOpen (testing recovery with a single probe call).
//!
//! State transitions happen only inside the `call` protocol, under one
//! mutex, so concurrent callers observe a consistent state. In Closed
//! state operations run concurrently; HalfOpen admits exactly one probe
//! and rejects the rest as if the circuit were still Open.

use crate::resilience::metrics::CallMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Failing fast, calls are rejected without executing.
    Open,
    /// Testing recovery, a single probe call is allowed through.
    HalfOpen,
}

/// Configuration for a single circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Deadline applied to each guarded operation. A timeout counts as a
    /// failure.
    pub timeout: Duration,

    /// How long the circuit stays open before the next call becomes a
    /// recovery probe.
    pub retry_duration: Duration,
}

impl CircuitBreakerConfig {
    /// Preset for the live quote feed: trip early, recover fast.
    pub fn for_quote_feed() -> Self {
        Self {
            failure_threshold: 3,
            timeout: Duration::from_secs(5),
            retry_duration: Duration::from_secs(15),
        }
    }

    /// Preset for computed-analysis endpoints, which run long.
    pub fn for_analysis() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(45),
            retry_duration: Duration::from_secs(30),
        }
    }

    /// Preset for the notification endpoints of the analytics service.
    pub fn for_notifications() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(10),
            retry_duration: Duration::from_secs(60),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }
        if self.retry_duration.is_zero() {
            return Err("retry_duration must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            retry_duration: Duration::from_secs(30),
        }
    }
}

/// Errors produced by guarded execution.
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the operation was not invoked.
    #[error("circuit breaker is open for {dependency}")]
    Open { dependency: String },

    /// The operation ran but exceeded the configured deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation ran and failed; the failure was recorded.
    #[error("operation failed: {0}")]
    Operation(E),
}

/// Externally visible breaker state, for operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub is_open: bool,
    pub is_closed: bool,
    pub is_half_open: bool,
}

/// The mutable state record. All reads and writes happen under one lock.
#[derive(Debug)]
struct Gate {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Gate {
    fn initial() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Admission ticket for one guarded call. If a probe permit is dropped
/// without resolving (the caller was cancelled), the circuit falls back to
/// Open so the next caller can re-probe.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl Permit<'_> {
    fn resolve(mut self, success: bool) {
        self.resolved = true;
        if success {
            self.breaker.on_success(self.probe);
        } else {
            self.breaker.on_failure(self.probe);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.resolved {
            let mut gate = self.breaker.gate.lock();
            gate.state = CircuitState::Open;
            gate.probe_in_flight = false;
            debug!(
                dependency = %self.breaker.name,
                "Probe abandoned before resolving; circuit returns to open"
            );
        }
    }
}

/// Per-dependency circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    gate: Mutex<Gate>,
    metrics: Mutex<CallMetrics>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            dependency = %name,
            failure_threshold = config.failure_threshold,
            timeout_secs = config.timeout.as_secs(),
            retry_duration_secs = config.retry_duration.as_secs(),
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            gate: Mutex::new(Gate::initial()),
            metrics: Mutex::new(CallMetrics::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.gate.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.gate.lock().failure_count
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let gate = self.gate.lock();
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: gate.state,
            failure_count: gate.failure_count,
            is_open: gate.state == CircuitState::Open,
            is_closed: gate.state == CircuitState::Closed,
            is_half_open: gate.state == CircuitState::HalfOpen,
        }
    }

    /// Snapshot of per-call metrics, annotated with the current state.
    pub fn metrics(&self) -> CallMetrics {
        let mut snapshot = self.metrics.lock().clone();
        snapshot.current_state = self.state();
        snapshot
    }

    /// Clear the breaker back to its initial Closed/zero state.
    pub fn reset(&self) {
        let mut gate = self.gate.lock();
        *gate = Gate::initial();
        info!(dependency = %self.name, "Circuit breaker reset to closed");
    }

    /// Execute a single-value operation under the breaker protocol.
    ///
    /// While Open, the operation is not invoked and
    /// [`CircuitBreakerError::Open`] is returned immediately; once
    /// `retry_duration` has elapsed the next call becomes the HalfOpen
    /// probe. The configured `timeout` bounds the operation and a timeout
    /// counts as a failure.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire()?;

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, operation()).await;
        let duration = start.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                self.record_call(duration, true);
                permit.resolve(true);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_call(duration, false);
                permit.resolve(false);
                Err(CircuitBreakerError::Operation(err))
            }
            Err(_elapsed) => {
                self.record_call(duration, false);
                permit.resolve(false);
                Err(CircuitBreakerError::Timeout(self.config.timeout))
            }
        }
    }

    /// Execute a stream-producing operation under the breaker protocol.
    ///
    /// The stream is drained to completion inside the guarded window. A
    /// stream error counts as a single breaker failure; draining without
    /// error counts as one success. Items are returned in order.
    pub async fn call_stream<F, S, T, E, Fut>(
        &self,
        operation: F,
    ) -> Result<Vec<T>, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, E>>,
        S: futures::Stream<Item = Result<T, E>>,
    {
        use futures::StreamExt;

        let permit = self.try_acquire()?;

        let start = Instant::now();
        let drained = tokio::time::timeout(self.config.timeout, async {
            let stream = operation().await?;
            futures::pin_mut!(stream);
            let mut items = Vec::new();
            while let Some(item) = stream.next().await {
                items.push(item?);
            }
            Ok::<_, E>(items)
        })
        .await;
        let duration = start.elapsed();

        match drained {
            Ok(Ok(items)) => {
                self.record_call(duration, true);
                permit.resolve(true);
                Ok(items)
            }
            Ok(Err(err)) => {
                self.record_call(duration, false);
                permit.resolve(false);
                Err(CircuitBreakerError::Operation(err))
            }
            Err(_elapsed) => {
                self.record_call(duration, false);
                permit.resolve(false);
                Err(CircuitBreakerError::Timeout(self.config.timeout))
            }
        }
    }

    /// Decide, atomically, whether this call may proceed.
    fn try_acquire<E>(&self) -> Result<Permit<'_>, CircuitBreakerError<E>> {
        let mut gate = self.gate.lock();
        match gate.state {
            CircuitState::Closed => Ok(Permit {
                breaker: self,
                probe: false,
                resolved: false,
            }),
            CircuitState::Open => {
                let cooled_down = gate
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.retry_duration);
                if cooled_down {
                    gate.state = CircuitState::HalfOpen;
                    gate.opened_at = None;
                    gate.probe_in_flight = true;
                    info!(dependency = %self.name, "🟡 Circuit breaker half-open (probing recovery)");
                    Ok(Permit {
                        breaker: self,
                        probe: true,
                        resolved: false,
                    })
                } else {
                    self.metrics.lock().rejected_calls += 1;
                    Err(CircuitBreakerError::Open {
                        dependency: self.name.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if gate.probe_in_flight {
                    // The single probe slot is taken; behave as if open.
                    self.metrics.lock().rejected_calls += 1;
                    Err(CircuitBreakerError::Open {
                        dependency: self.name.clone(),
                    })
                } else {
                    gate.probe_in_flight = true;
                    Ok(Permit {
                        breaker: self,
                        probe: true,
                        resolved: false,
                    })
                }
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let mut gate = self.gate.lock();
        if probe {
            gate.state = CircuitState::Closed;
            gate.failure_count = 0;
            gate.opened_at = None;
            gate.probe_in_flight = false;
            info!(dependency = %self.name, "🟢 Circuit breaker closed (recovered)");
            return;
        }

        match gate.state {
            CircuitState::Closed => gate.failure_count = 0,
            // A call admitted in Closed state finished after the circuit
            // opened; the outcome no longer changes anything.
            CircuitState::Open | CircuitState::HalfOpen => {
                debug!(dependency = %self.name, "Stale success after state transition");
            }
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut gate = self.gate.lock();
        if probe {
            gate.state = CircuitState::Open;
            gate.opened_at = Some(Instant::now());
            gate.probe_in_flight = false;
            warn!(dependency = %self.name, "🔴 Probe failed; circuit breaker reopened");
            return;
        }

        match gate.state {
            CircuitState::Closed => {
                gate.failure_count += 1;
                if gate.failure_count >= self.config.failure_threshold {
                    gate.state = CircuitState::Open;
                    gate.opened_at = Some(Instant::now());
                    warn!(
                        dependency = %self.name,
                        failure_count = gate.failure_count,
                        failure_threshold = self.config.failure_threshold,
                        retry_duration_secs = self.config.retry_duration.as_secs(),
                        "🔴 Circuit breaker opened (failing fast)"
                    );
                }
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                debug!(dependency = %self.name, "Stale failure after state transition");
            }
        }
    }

    fn record_call(&self, duration: Duration, success: bool) {
        let mut metrics = self.metrics.lock();
        metrics.total_calls += 1;
        metrics.total_duration += duration;
        if success {
            metrics.success_count += 1;
        } else {
            metrics.failure_count += 1;
        }
    }
}
