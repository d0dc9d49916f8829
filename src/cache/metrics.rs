//! # Cache Metrics
//!
//! Hit/miss counters and operation timings, stored in the cache backend
//! itself under reserved `<namespace>:metrics:*` keys so they survive
//! process restarts (but not backend data loss). All writes are fail-soft:
//! a dead backend silently drops the data points.

use crate::cache::client::CacheClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aggregate cache metrics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub last_operation: Option<String>,
    pub last_operation_at: Option<DateTime<Utc>>,
    pub avg_duration_ms: f64,
    pub operation_count: u64,
}

/// Records hit/miss counts and operation timings against reserved keys.
#[derive(Clone)]
pub struct CacheMetrics {
    client: CacheClient,
    hits_key: String,
    misses_key: String,
    ops_key: String,
}

impl CacheMetrics {
    pub fn new(client: CacheClient, namespace: &str) -> Self {
        Self {
            client,
            hits_key: format!("{namespace}:metrics:hits"),
            misses_key: format!("{namespace}:metrics:misses"),
            ops_key: format!("{namespace}:metrics:ops"),
        }
    }

    pub async fn record_hit(&self) {
        self.client.increment(&self.hits_key, 1).await;
    }

    pub async fn record_miss(&self) {
        self.client.increment(&self.misses_key, 1).await;
    }

    /// Record an operation name and duration, folding the duration into an
    /// online running average: `avg' = (avg * (n - 1) + d) / n`.
    pub async fn record_operation(&self, operation: &str, duration: Duration) {
        let count = self
            .hash_field_u64("count")
            .await
            .unwrap_or(0)
            .saturating_add(1);
        let prev_avg = self.hash_field_f64("avg_ms").await.unwrap_or(0.0);
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let avg = (prev_avg * (count - 1) as f64 + duration_ms) / count as f64;

        self.client
            .hash_set(&self.ops_key, "last_operation", operation)
            .await;
        self.client
            .hash_set(&self.ops_key, "last_at", &Utc::now().to_rfc3339())
            .await;
        self.client
            .hash_set(&self.ops_key, "count", &count.to_string())
            .await;
        self.client
            .hash_set(&self.ops_key, "avg_ms", &format!("{avg:.3}"))
            .await;
    }

    /// Read the current snapshot. Unreadable fields default to zero/`None`
    /// so this never fails.
    pub async fn snapshot(&self) -> CacheMetricsSnapshot {
        let hits = self.counter(&self.hits_key).await;
        let misses = self.counter(&self.misses_key).await;
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheMetricsSnapshot {
            hits,
            misses,
            hit_rate,
            last_operation: self.client.hash_get(&self.ops_key, "last_operation").await,
            last_operation_at: self
                .client
                .hash_get(&self.ops_key, "last_at")
                .await
                .and_then(|raw| raw.parse::<DateTime<Utc>>().ok()),
            avg_duration_ms: self.hash_field_f64("avg_ms").await.unwrap_or(0.0),
            operation_count: self.hash_field_u64("count").await.unwrap_or(0),
        }
    }

    async fn counter(&self, key: &str) -> u64 {
        // increment(0) reads the counter without perturbing it.
        self.client
            .increment(key, 0)
            .await
            .and_then(|value| u64::try_from(value).ok())
            .unwrap_or(0)
    }

    async fn hash_field_u64(&self, field: &str) -> Option<u64> {
        self.client
            .hash_get(&self.ops_key, field)
            .await
            .and_then(|raw| raw.parse().ok())
    }

    async fn hash_field_f64(&self, field: &str) -> Option<f64> {
        self.client
            .hash_get(&self.ops_key, field)
            .await
            .and_then(|raw| raw.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{InMemoryKv, KvClient};
    use std::sync::Arc;

    fn metrics() -> (Arc<InMemoryKv>, CacheMetrics) {
        let kv = Arc::new(InMemoryKv::new());
        let client = CacheClient::new(kv.clone() as Arc<dyn KvClient>);
        (kv.clone(), CacheMetrics::new(client, "stockdash"))
    }

    #[tokio::test]
    async fn hit_rate_calculation() {
        let (_kv, metrics) = metrics();
        metrics.record_hit().await;
        metrics.record_hit().await;
        metrics.record_hit().await;
        metrics.record_miss().await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert!((snapshot.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn online_average_converges() {
        let (_kv, metrics) = metrics();
        metrics.record_operation("warm_up", Duration::from_millis(100)).await;
        metrics.record_operation("invalidate", Duration::from_millis(200)).await;
        metrics.record_operation("health", Duration::from_millis(300)).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.operation_count, 3);
        assert_eq!(snapshot.last_operation.as_deref(), Some("health"));
        assert!(snapshot.last_operation_at.is_some());
        assert!((snapshot.avg_duration_ms - 200.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn snapshot_defaults_when_backend_down() {
        let (kv, metrics) = metrics();
        metrics.record_hit().await;
        kv.fail_backend(true);

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.hits, 0);
        assert_eq!(snapshot.hit_rate, 0.0);
        assert!(snapshot.last_operation.is_none());
    }

    #[tokio::test]
    async fn metrics_survive_entity_invalidation() {
        use crate::cache::domain::{DomainCache, TtlPolicy};

        let (kv, metrics) = metrics();
        metrics.record_hit().await;

        let client = CacheClient::new(kv.clone() as Arc<dyn KvClient>);
        let domain = DomainCache::new(client, "stockdash", TtlPolicy::default());
        domain.invalidate_all().await;

        assert_eq!(metrics.snapshot().await.hits, 1);
    }
}
