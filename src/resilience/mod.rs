//! # Resilience Module
//!
//! Fault tolerance for the remote analytics dependency: per-dependency
//! circuit breakers, a process-wide breaker registry, and a bounded retry
//! policy for transient failures.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: isolate a failing dependency and fail fast
//! - **Registry**: one shared breaker per dependency name
//! - **Retry Policy**: bounded re-attempts for transient errors only
//! - **Metrics**: per-breaker call accounting and system health scoring
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stockdash_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new("quote-feed", CircuitBreakerConfig::for_quote_feed());
//!
//! let quote = breaker
//!     .call(|| async {
//!         // Remote quote fetch here
//!         Ok::<&str, String>("185.20")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod metrics;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStatus, CircuitState,
};
pub use metrics::{CallMetrics, RegistryMetrics};
pub use registry::CircuitBreakerRegistry;
pub use retry::{BackoffStrategy, RetryPolicy, Retryable};
