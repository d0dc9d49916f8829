//! # Cache Orchestrator
//!
//! Cross-cutting cache operations that run independently of request
//! traffic: warm-up seeding, pattern invalidation, metrics recording, and
//! aggregate health reporting, plus the background schedule that drives
//! them. Everything here is best-effort; individual failures are logged
//! and skipped, never propagated.

use crate::cache::client::CacheClient;
use crate::cache::domain::{DomainCache, EntityKind};
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Background schedule for orchestrator-driven maintenance.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// How often to probe and log aggregate cache health.
    pub health_interval: Duration,
    /// How often to roll up and log the metrics snapshot.
    pub metrics_interval: Duration,
    /// How often to run warm-up/cleanup maintenance.
    pub maintenance_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(30),
            metrics_interval: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(300),
        }
    }
}

/// Aggregate cache health document. Always constructed, even when every
/// underlying read fails (fields default to zeros/empty).
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealthReport {
    pub status: String,
    pub hit_rate: f64,
    pub cache_size: u64,
    pub cluster_health: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a warm-up pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmUpReport {
    pub symbols: u64,
    pub seeded: u64,
    pub already_cached: u64,
}

/// Cross-cutting operations over the domain cache.
#[derive(Clone)]
pub struct CacheOrchestrator {
    domain: DomainCache,
    metrics: CacheMetrics,
    schedule: ScheduleConfig,
}

impl CacheOrchestrator {
    pub fn new(domain: DomainCache, metrics: CacheMetrics, schedule: ScheduleConfig) -> Self {
        Self {
            domain,
            metrics,
            schedule,
        }
    }

    fn client(&self) -> &CacheClient {
        self.domain.client()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Seed placeholder quote entries for every known symbol that has no
    /// cached quote yet. Placeholders carry a zero price and are replaced
    /// by the first real fetch; individual failures are ignored.
    pub async fn warm_up(&self) -> WarmUpReport {
        let started = Instant::now();
        let symbols: Vec<String> = self
            .domain
            .get(EntityKind::SymbolList, "all")
            .await
            .unwrap_or_default();

        let mut report = WarmUpReport {
            symbols: symbols.len() as u64,
            ..WarmUpReport::default()
        };

        for symbol in &symbols {
            let placeholder = json!({
                "symbol": symbol,
                "price": 0.0,
                "placeholder": true,
            });
            if self
                .domain
                .seed_if_absent(EntityKind::Quote, symbol, &placeholder)
                .await
            {
                report.seeded += 1;
            } else {
                report.already_cached += 1;
            }
        }

        info!(
            symbols = report.symbols,
            seeded = report.seeded,
            already_cached = report.already_cached,
            "🔥 Cache warm-up completed"
        );
        self.record_metrics("warm_up", started.elapsed()).await;
        report
    }

    /// Delete every key matching the glob within the namespace.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let started = Instant::now();
        let scoped = format!("{}:{}", self.domain.namespace(), pattern);
        let removed = self.client().delete_pattern(&scoped).await;
        self.record_metrics("invalidate", started.elapsed()).await;
        removed
    }

    /// Delete every entity entry in the namespace (metrics keys survive).
    pub async fn invalidate_all(&self) -> u64 {
        let started = Instant::now();
        let removed = self.domain.invalidate_all().await;
        info!(removed = removed, "Cache namespace invalidated");
        self.record_metrics("invalidate_all", started.elapsed()).await;
        removed
    }

    /// Record a named operation and its duration into the metrics store.
    pub async fn record_metrics(&self, operation: &str, duration: Duration) {
        self.metrics.record_operation(operation, duration).await;
    }

    /// Compose the aggregate health document. Never fails: unreadable
    /// fields default to zeros and the status degrades instead.
    pub async fn health(&self) -> CacheHealthReport {
        let snapshot = self.metrics.snapshot().await;
        let cache_size = self
            .client()
            .key_count(&format!("{}:*", self.domain.namespace()))
            .await;
        let connected = self.client().health().is_connected();

        CacheHealthReport {
            status: if connected { "healthy" } else { "degraded" }.to_string(),
            hit_rate: snapshot.hit_rate,
            cache_size,
            cluster_health: if connected {
                "connected"
            } else {
                "unreachable"
            }
            .to_string(),
            timestamp: Utc::now(),
        }
    }

    pub async fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot().await
    }

    /// Spawn the independent maintenance loops: health probe, metrics
    /// rollup, and periodic warm-up. Handles are returned so a host
    /// application can abort them on shutdown.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(3);

        let orchestrator = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(orchestrator.schedule.health_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let report = orchestrator.health().await;
                if report.status == "healthy" {
                    debug!(
                        hit_rate = report.hit_rate,
                        cache_size = report.cache_size,
                        "Cache health probe"
                    );
                } else {
                    warn!(
                        cluster_health = %report.cluster_health,
                        "Cache health probe found degraded backend"
                    );
                }
            }
        }));

        let orchestrator = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(orchestrator.schedule.metrics_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let snapshot = orchestrator.metrics_snapshot().await;
                info!(
                    hits = snapshot.hits,
                    misses = snapshot.misses,
                    hit_rate = snapshot.hit_rate,
                    avg_duration_ms = snapshot.avg_duration_ms,
                    "📊 Cache metrics rollup"
                );
            }
        }));

        let orchestrator = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(orchestrator.schedule.maintenance_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                orchestrator.warm_up().await;
            }
        }));

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::domain::TtlPolicy;
    use crate::kv::{InMemoryKv, KvClient};

    fn orchestrator() -> (Arc<InMemoryKv>, CacheOrchestrator) {
        let kv = Arc::new(InMemoryKv::new());
        let client = CacheClient::new(kv.clone() as Arc<dyn KvClient>);
        let domain = DomainCache::new(client.clone(), "stockdash", TtlPolicy::default());
        let metrics = CacheMetrics::new(client, "stockdash");
        (
            kv,
            CacheOrchestrator::new(domain, metrics, ScheduleConfig::default()),
        )
    }

    #[tokio::test]
    async fn warm_up_seeds_missing_quotes_only() {
        let (_kv, orch) = orchestrator();
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()];
        orch.domain.set(EntityKind::SymbolList, "all", &symbols).await;
        orch.domain
            .set(EntityKind::Quote, "AAPL", &json!({"symbol": "AAPL", "price": 150.0}))
            .await;

        let report = orch.warm_up().await;
        assert_eq!(report.symbols, 3);
        assert_eq!(report.seeded, 2);
        assert_eq!(report.already_cached, 1);

        // The pre-existing real quote was not overwritten.
        let aapl: serde_json::Value = orch.domain.get(EntityKind::Quote, "AAPL").await.unwrap();
        assert_eq!(aapl["price"], 150.0);
        let msft: serde_json::Value = orch.domain.get(EntityKind::Quote, "MSFT").await.unwrap();
        assert_eq!(msft["placeholder"], true);
    }

    #[tokio::test]
    async fn warm_up_with_dead_backend_is_a_noop() {
        let (kv, orch) = orchestrator();
        kv.fail_backend(true);

        let report = orch.warm_up().await;
        assert_eq!(report.symbols, 0);
        assert_eq!(report.seeded, 0);
    }

    #[tokio::test]
    async fn pattern_invalidation_is_namespace_scoped() {
        let (kv, orch) = orchestrator();
        orch.domain.set(EntityKind::Quote, "AAPL", &1_u32).await;
        kv.set("otherapp:quote:AAPL", "1", None).await.unwrap();

        assert_eq!(orch.invalidate("quote:*").await, 1);
        assert!(kv.exists("otherapp:quote:AAPL").await.unwrap());
    }

    #[tokio::test]
    async fn health_reports_healthy_backend() {
        let (_kv, orch) = orchestrator();
        orch.domain.set(EntityKind::Quote, "AAPL", &1_u32).await;

        let report = orch.health().await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.cluster_health, "connected");
        assert!(report.cache_size >= 1);
    }

    #[tokio::test]
    async fn health_always_returns_a_document() {
        let (kv, orch) = orchestrator();
        // One failing probe flips connection health before we ask.
        kv.fail_backend(true);
        let _ = orch.domain.get::<u32>(EntityKind::Quote, "AAPL").await;

        let report = orch.health().await;
        assert_eq!(report.status, "degraded");
        assert_eq!(report.cluster_health, "unreachable");
        assert_eq!(report.cache_size, 0);
        assert_eq!(report.hit_rate, 0.0);
    }

    #[tokio::test]
    async fn record_metrics_updates_last_operation() {
        let (_kv, orch) = orchestrator();
        orch.record_metrics("manual_probe", Duration::from_millis(42)).await;

        let snapshot = orch.metrics_snapshot().await;
        assert_eq!(snapshot.last_operation.as_deref(), Some("manual_probe"));
        assert_eq!(snapshot.operation_count, 1);
    }
}
