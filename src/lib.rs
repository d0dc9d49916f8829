#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Stockdash Core
//!
//! Resilience and caching facade between a stock-analysis dashboard
//! backend and its two fragile dependencies: a shared cache cluster and
//! a remote analytics service.
//!
//! ## Overview
//!
//! The crate enforces two propagation policies. Cache failures are
//! **fail-soft**: a dead cache backend degrades every read to a miss and
//! every write to a no-op, and callers never see a cache error. Remote
//! failures are **fail-fast**: calls to the analytics service run behind
//! per-dependency circuit breakers and a bounded retry policy, and an
//! unhealthy dependency is rejected immediately instead of piling up
//! timeouts.
//!
//! ## Module Organization
//!
//! - [`kv`] - Key-value backend trait and the in-memory test double
//! - [`cache`] - Fail-soft cache client, domain keys/TTLs, cache-aside,
//!   orchestration and metrics
//! - [`resilience`] - Circuit breakers, breaker registry, retry policy
//! - [`facade`] - The combined entry point the dashboard backend uses
//! - [`config`] - Layered configuration with validation
//! - [`error`] - The error taxonomy behind both propagation policies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stockdash_core::cache::EntityKind;
//! use stockdash_core::config::StockdashConfig;
//! use stockdash_core::facade::AnalyticsFacade;
//! use stockdash_core::kv::InMemoryKv;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! stockdash_core::logging::init_logging();
//!
//! let config = StockdashConfig::load()?;
//! let facade = AnalyticsFacade::new(Arc::new(InMemoryKv::new()), &config);
//!
//! let price: f64 = facade
//!     .fetch_or_cache("quote-feed", EntityKind::Quote, "AAPL", || async {
//!         // Remote quote fetch here
//!         Ok(185.20)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod kv;
pub mod logging;
pub mod resilience;

pub use cache::{CacheAside, CacheClient, CacheOrchestrator, DomainCache, EntityKind, TtlPolicy};
pub use config::StockdashConfig;
pub use error::{CacheError, FacadeError, FacadeResult, RemoteError, RemoteResult};
pub use facade::AnalyticsFacade;
pub use kv::{InMemoryKv, KvClient};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, RetryPolicy,
};
