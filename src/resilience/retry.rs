//! # Retry Policy
//!
//! Bounded retry with backoff for transient remote failures. Only errors
//! whose [`Retryable::is_transient`] returns true are retried; everything
//! else propagates on the first attempt. Layered outside a circuit
//! breaker this means an open circuit fails fast instead of burning
//! attempts.

use crate::error::RemoteError;
use crate::resilience::circuit_breaker::CircuitBreakerError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Classifies an error as transient (worth retrying) or permanent.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for RemoteError {
    fn is_transient(&self) -> bool {
        RemoteError::is_transient(self)
    }
}

impl<E: Retryable> Retryable for CircuitBreakerError<E> {
    fn is_transient(&self) -> bool {
        match self {
            // An open circuit is a deliberate fast-fail; retrying would
            // defeat it.
            CircuitBreakerError::Open { .. } => false,
            CircuitBreakerError::Timeout(_) => true,
            CircuitBreakerError::Operation(err) => err.is_transient(),
        }
    }
}

/// Delay schedule between attempts.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `base * multiplier^(attempt-1)`, capped at `max`.
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Delay before the given retry. `attempt` is 1-based: the delay
    /// taken after the first failed attempt is `delay_for(1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential {
                base,
                multiplier,
                max,
            } => {
                let scaled = base.as_secs_f64() * multiplier.powi(attempt.saturating_sub(1) as i32);
                Duration::from_secs_f64(scaled).min(*max)
            }
        }
    }
}

/// Bounded retry loop over a re-invocable async operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Three attempts, one second apart.
    pub fn standard() -> Self {
        Self::new(3, BackoffStrategy::Fixed(Duration::from_secs(1)))
    }

    /// Execute `operation`, re-invoking it on transient errors until it
    /// succeeds or attempts run out. The last error is returned verbatim.
    ///
    /// Stream-shaped calls retry the same way: wrap the stream drain (for
    /// example [`CircuitBreaker::call_stream`]) so each attempt restarts
    /// the stream from the beginning.
    ///
    /// [`CircuitBreaker::call_stream`]: crate::resilience::CircuitBreaker::call_stream
    pub async fn execute<F, T, E, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
