//! # Cache Facade
//!
//! Fault-tolerant caching over the remote key-value cluster, layered
//! leaf-to-root:
//!
//! - [`client::CacheClient`] — typed (de)serialization and fail-soft
//!   operations over the raw [`crate::kv::KvClient`]
//! - [`health::ConnectionHealth`] — backend reachability tracking with
//!   throttled alerting
//! - [`domain::DomainCache`] — key namespaces and per-entity TTL policy
//! - [`aside::CacheAside`] — explicit read-through decoration of fetch
//!   operations
//! - [`metrics::CacheMetrics`] — hit/miss and timing counters stored in the
//!   backend itself
//! - [`orchestrator::CacheOrchestrator`] — warm-up, invalidation, health
//!   reporting, and the background maintenance schedule
//!
//! The governing rule at every layer: a cache failure is converted into a
//! miss or no-op, never into a caller-visible error.

pub mod aside;
pub mod client;
pub mod domain;
pub mod health;
pub mod metrics;
pub mod orchestrator;

pub use aside::CacheAside;
pub use client::CacheClient;
pub use domain::{DomainCache, EntityKind, TtlPolicy};
pub use health::{ConnectionHealth, ConnectionHealthSnapshot};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use orchestrator::{CacheHealthReport, CacheOrchestrator, ScheduleConfig, WarmUpReport};
