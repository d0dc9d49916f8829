//! # Cache-Aside Wrapper
//!
//! Explicit read-through decoration for arbitrary fetch operations: check
//! the domain cache, fall back to the real fetch on a miss, populate the
//! cache with the result. Written as a plain wrapper type applied at the
//! call site, so any `(args) -> value` future can be decorated regardless
//! of where it is defined.
//!
//! The wrapper is never allowed to turn a working dependency into a
//! failure: if the cache read or the write-back fails, the real fetch runs
//! and its result is returned untouched.

use crate::cache::domain::{DomainCache, EntityKind};
use crate::cache::metrics::CacheMetrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tracing::debug;

/// Read-through decorator over a [`DomainCache`].
#[derive(Clone)]
pub struct CacheAside {
    domain: DomainCache,
    metrics: CacheMetrics,
}

impl CacheAside {
    pub fn new(domain: DomainCache, metrics: CacheMetrics) -> Self {
        Self { domain, metrics }
    }

    pub fn domain(&self) -> &DomainCache {
        &self.domain
    }

    /// Run `fetch` through the cache for `(kind, id)`.
    ///
    /// Hit: the cached value is returned and a hit is recorded. Miss or
    /// cache failure: `fetch` runs, its result is stored best-effort, a miss
    /// is recorded, and the result is returned. `fetch` errors propagate
    /// unchanged.
    pub async fn fetch_or_cache<T, E, F, Fut>(
        &self,
        kind: EntityKind,
        id: &str,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.domain.get::<T>(kind, id).await {
            debug!(kind = ?kind, id = id, "Cache hit");
            self.metrics.record_hit().await;
            return Ok(cached);
        }

        self.metrics.record_miss().await;
        let value = fetch().await?;
        self.domain.set(kind, id, &value).await;
        Ok(value)
    }

    /// Collection-shaped analogue of [`fetch_or_cache`](Self::fetch_or_cache).
    pub async fn fetch_or_cache_many<T, E, F, Fut>(
        &self,
        kind: EntityKind,
        id: &str,
        fetch: F,
    ) -> Result<Vec<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        if let Some(cached) = self.domain.get::<Vec<T>>(kind, id).await {
            debug!(kind = ?kind, id = id, "Cache hit (collection)");
            self.metrics.record_hit().await;
            return Ok(cached);
        }

        self.metrics.record_miss().await;
        let values = fetch().await?;
        self.domain.set(kind, id, &values).await;
        Ok(values)
    }

    /// Qualified-key variant, e.g. a history series keyed by range.
    pub async fn fetch_or_cache_qualified<T, E, F, Fut>(
        &self,
        kind: EntityKind,
        id: &str,
        qualifier: &str,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.domain.get_qualified::<T>(kind, id, qualifier).await {
            self.metrics.record_hit().await;
            return Ok(cached);
        }

        self.metrics.record_miss().await;
        let value = fetch().await?;
        self.domain.set_qualified(kind, id, qualifier, &value).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::client::CacheClient;
    use crate::cache::domain::TtlPolicy;
    use crate::kv::{InMemoryKv, KvClient};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn aside() -> (Arc<InMemoryKv>, CacheAside) {
        let kv = Arc::new(InMemoryKv::new());
        let client = CacheClient::new(kv.clone() as Arc<dyn KvClient>);
        let domain = DomainCache::new(client.clone(), "stockdash", TtlPolicy::default());
        let metrics = CacheMetrics::new(client, "stockdash");
        (kv, CacheAside::new(domain, metrics))
    }

    #[tokio::test]
    async fn first_call_fetches_second_call_hits() {
        let (_kv, aside) = aside();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let price = aside
                .fetch_or_cache(EntityKind::Quote, "AAPL", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(150.0_f64)
                })
                .await
                .unwrap();
            assert_eq!(price, 150.0);
        }

        // Only the first call reached the real fetch.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fail_open_when_backend_unreachable() {
        let (kv, aside) = aside();
        kv.fail_backend(true);
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let value = aside
                .fetch_or_cache(EntityKind::Quote, "AAPL", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(150.0_f64)
                })
                .await
                .unwrap();
            assert_eq!(value, 150.0);
        }

        // No caching possible, so every call fell through to the fetch —
        // and none of them surfaced a cache error.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_error_propagates() {
        let (_kv, aside) = aside();
        let result: Result<f64, String> = aside
            .fetch_or_cache(EntityKind::Quote, "AAPL", || async {
                Err("feed offline".to_string())
            })
            .await;
        assert_eq!(result.unwrap_err(), "feed offline");
    }

    #[tokio::test]
    async fn collection_shape_roundtrip() {
        let (_kv, aside) = aside();

        let series = aside
            .fetch_or_cache_many(EntityKind::History, "AAPL", || async {
                Ok::<_, String>(vec![149.1_f64, 150.2, 151.3])
            })
            .await
            .unwrap();
        assert_eq!(series.len(), 3);

        let cached = aside
            .fetch_or_cache_many::<f64, String, _, _>(EntityKind::History, "AAPL", || async {
                panic!("fetch invoked on a cache hit")
            })
            .await
            .unwrap();
        assert_eq!(cached, series);
    }

    #[tokio::test]
    async fn qualified_keys_are_independent() {
        let (_kv, aside) = aside();

        let one_year = aside
            .fetch_or_cache_qualified(EntityKind::History, "AAPL", "1y", || async {
                Ok::<_, String>(vec![1.0_f64])
            })
            .await
            .unwrap();
        let five_year = aside
            .fetch_or_cache_qualified(EntityKind::History, "AAPL", "5y", || async {
                Ok::<_, String>(vec![2.0_f64])
            })
            .await
            .unwrap();

        assert_ne!(one_year, five_year);
    }

    #[tokio::test]
    async fn hits_and_misses_are_recorded() {
        let (kv, aside) = aside();

        aside
            .fetch_or_cache(EntityKind::Quote, "AAPL", || async { Ok::<_, String>(1.0_f64) })
            .await
            .unwrap();
        aside
            .fetch_or_cache(EntityKind::Quote, "AAPL", || async { Ok::<_, String>(1.0_f64) })
            .await
            .unwrap();

        assert_eq!(kv.get("stockdash:metrics:misses").await.unwrap(), Some("1".into()));
        assert_eq!(kv.get("stockdash:metrics:hits").await.unwrap(), Some("1".into()));
    }
}
