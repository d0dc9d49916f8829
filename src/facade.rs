//! # Analytics Facade
//!
//! The single entry point the dashboard backend talks to. Composes the
//! cache-aside layer with the circuit breaker registry and retry policy
//! so that every remote fetch is cached, guarded, and retried in one
//! call.
//!
//! Layering, outermost first: cache-aside (hit short-circuits
//! everything), retry (re-attempts transient failures), circuit breaker
//! (fails fast while the dependency is down), the remote operation
//! itself.

use crate::cache::{
    CacheAside, CacheClient, CacheHealthReport, CacheMetrics, CacheMetricsSnapshot,
    CacheOrchestrator, DomainCache, EntityKind, WarmUpReport,
};
use crate::config::StockdashConfig;
use crate::error::{FacadeError, FacadeResult, RemoteError, RemoteResult};
use crate::kv::KvClient;
use crate::resilience::{
    CircuitBreakerError, CircuitBreakerRegistry, CircuitBreakerStatus, CircuitState, RetryPolicy,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Combined health view over the cache and every registered breaker.
#[derive(Debug, Clone, Serialize)]
pub struct FacadeHealth {
    pub cache: CacheHealthReport,
    pub breaker_states: HashMap<CircuitState, usize>,
    pub breaker_health_score: f64,
}

/// Caching and resilience facade for the stock analytics dependency.
pub struct AnalyticsFacade {
    aside: CacheAside,
    orchestrator: Arc<CacheOrchestrator>,
    registry: Arc<CircuitBreakerRegistry>,
    retry: RetryPolicy,
}

impl AnalyticsFacade {
    /// Wire up the full stack over the given cache backend.
    pub fn new(kv: Arc<dyn KvClient>, config: &StockdashConfig) -> Self {
        let client = CacheClient::new(kv);
        let metrics = CacheMetrics::new(client.clone(), &config.cache.namespace);
        let domain = DomainCache::new(client, &config.cache.namespace, config.ttl_policy());

        let orchestrator = Arc::new(CacheOrchestrator::new(
            domain.clone(),
            metrics.clone(),
            config.schedule(),
        ));
        let registry = Arc::new(CircuitBreakerRegistry::with_overrides(
            config.breaker_defaults(),
            config.breaker_overrides(),
        ));

        Self {
            aside: CacheAside::new(domain, metrics),
            orchestrator,
            registry,
            retry: config.retry_policy(),
        }
    }

    pub fn aside(&self) -> &CacheAside {
        &self.aside
    }

    pub fn orchestrator(&self) -> &Arc<CacheOrchestrator> {
        &self.orchestrator
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Fetch `(kind, id)` through the cache, guarding the remote call
    /// behind `dependency`'s circuit breaker and the retry policy.
    ///
    /// A cache hit never touches the breaker. On a miss the fetch runs
    /// guarded; an open circuit surfaces as
    /// [`FacadeError::CircuitOpen`] so the caller can substitute a
    /// neutral default.
    pub async fn fetch_or_cache<T, F, Fut>(
        &self,
        dependency: &str,
        kind: EntityKind,
        id: &str,
        fetch: F,
    ) -> FacadeResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let breaker = self.registry.get_or_create(dependency);
        let breaker = &breaker;
        let retry = &self.retry;
        let fetch = &fetch;

        self.aside
            .fetch_or_cache(kind, id, || async move {
                retry.execute(|| breaker.call(fetch)).await
            })
            .await
            .map_err(|err| Self::map_guard_error(dependency, err))
    }

    /// Collection-shaped analogue of [`fetch_or_cache`](Self::fetch_or_cache).
    pub async fn fetch_or_cache_many<T, F, Fut>(
        &self,
        dependency: &str,
        kind: EntityKind,
        id: &str,
        fetch: F,
    ) -> FacadeResult<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = RemoteResult<Vec<T>>>,
    {
        let breaker = self.registry.get_or_create(dependency);
        let breaker = &breaker;
        let retry = &self.retry;
        let fetch = &fetch;

        self.aside
            .fetch_or_cache_many(kind, id, || async move {
                retry.execute(|| breaker.call(fetch)).await
            })
            .await
            .map_err(|err| Self::map_guard_error(dependency, err))
    }

    /// Qualified-key variant, e.g. a history series keyed by range.
    pub async fn fetch_or_cache_qualified<T, F, Fut>(
        &self,
        dependency: &str,
        kind: EntityKind,
        id: &str,
        qualifier: &str,
        fetch: F,
    ) -> FacadeResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let breaker = self.registry.get_or_create(dependency);
        let breaker = &breaker;
        let retry = &self.retry;
        let fetch = &fetch;

        self.aside
            .fetch_or_cache_qualified(kind, id, qualifier, || async move {
                retry.execute(|| breaker.call(fetch)).await
            })
            .await
            .map_err(|err| Self::map_guard_error(dependency, err))
    }

    /// Run a remote operation guarded and retried, without caching.
    /// For mutations and anything else that must not serve stale data.
    pub async fn execute_guarded<T, F, Fut>(&self, dependency: &str, operation: F) -> FacadeResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let breaker = self.registry.get_or_create(dependency);
        let operation = &operation;

        self.retry
            .execute(|| breaker.call(operation))
            .await
            .map_err(|err| Self::map_guard_error(dependency, err))
    }

    /// Guarded, retried drain of a stream-producing remote operation.
    /// Each retry restarts the stream from the beginning.
    pub async fn execute_guarded_stream<S, T, F, Fut>(
        &self,
        dependency: &str,
        operation: F,
    ) -> FacadeResult<Vec<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RemoteResult<S>>,
        S: futures::Stream<Item = RemoteResult<T>>,
    {
        let breaker = self.registry.get_or_create(dependency);
        let operation = &operation;

        self.retry
            .execute(|| breaker.call_stream(operation))
            .await
            .map_err(|err| Self::map_guard_error(dependency, err))
    }

    /// Drop every cached entry for one symbol across all entity kinds.
    pub async fn invalidate(&self, id: &str) -> u64 {
        self.aside.domain().invalidate(id).await
    }

    /// Drop every cached entry in the namespace (metrics survive).
    pub async fn invalidate_all(&self) -> u64 {
        self.orchestrator.invalidate_all().await
    }

    pub async fn warm_up(&self) -> WarmUpReport {
        self.orchestrator.warm_up().await
    }

    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        self.orchestrator.spawn_background_tasks()
    }

    pub fn breaker_status(&self, dependency: &str) -> Option<CircuitBreakerStatus> {
        self.registry.status(dependency)
    }

    pub fn breaker_status_all(&self) -> HashMap<String, CircuitBreakerStatus> {
        self.registry.status_all()
    }

    pub async fn cache_metrics(&self) -> CacheMetricsSnapshot {
        self.orchestrator.metrics_snapshot().await
    }

    /// Health probe covering the cache connection and breaker fleet.
    /// Never fails; a dead backend reports as degraded.
    pub async fn health(&self) -> FacadeHealth {
        FacadeHealth {
            cache: self.orchestrator.health().await,
            breaker_states: self.registry.state_summary(),
            breaker_health_score: self.registry.health_score(),
        }
    }

    fn map_guard_error(dependency: &str, err: CircuitBreakerError<RemoteError>) -> FacadeError {
        match err {
            CircuitBreakerError::Open { dependency } => FacadeError::CircuitOpen(dependency),
            CircuitBreakerError::Timeout(timeout) => FacadeError::Remote(RemoteError::Timeout {
                operation: dependency.to_string(),
                timeout,
            }),
            CircuitBreakerError::Operation(remote) => FacadeError::Remote(remote),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config() -> StockdashConfig {
        let mut config = StockdashConfig::default();
        config.retry.max_attempts = 2;
        config.retry.base_delay_ms = 1;
        config.circuit_breaker.failure_threshold = 2;
        config.circuit_breaker.retry_duration_secs = 60;
        config
    }

    fn facade_over(kv: Arc<InMemoryKv>) -> AnalyticsFacade {
        AnalyticsFacade::new(kv, &test_config())
    }

    #[tokio::test]
    async fn caches_after_first_fetch() {
        let kv = Arc::new(InMemoryKv::new());
        let facade = facade_over(kv);
        let fetches = AtomicU32::new(0);

        for _ in 0..3 {
            let price: f64 = facade
                .fetch_or_cache("quote-feed", EntityKind::Quote, "AAPL", || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(185.20)
                })
                .await
                .unwrap();
            assert_eq!(price, 185.20);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_caches() {
        let kv = Arc::new(InMemoryKv::new());
        let facade = facade_over(kv);
        let fetches = AtomicU32::new(0);

        let price: f64 = facade
            .fetch_or_cache("quote-feed", EntityKind::Quote, "MSFT", || async {
                if fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RemoteError::ConnectionReset("peer closed".to_string()))
                } else {
                    Ok(410.0)
                }
            })
            .await
            .unwrap();

        assert_eq!(price, 410.0);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        // The breaker saw one failure but the retry recovered; still closed.
        assert!(facade.breaker_status("quote-feed").unwrap().is_closed);
    }

    #[tokio::test]
    async fn open_circuit_surfaces_as_circuit_open() {
        let kv = Arc::new(InMemoryKv::new());
        let facade = facade_over(kv);

        // threshold=2 and 2 attempts per call: one failing call opens it.
        let result: FacadeResult<f64> = facade
            .fetch_or_cache("analysis", EntityKind::Analysis, "AAPL", || async {
                Err(RemoteError::ConnectionRefused("10.0.0.4:9200".to_string()))
            })
            .await;
        assert!(matches!(result, Err(FacadeError::Remote(_))));
        assert!(facade.breaker_status("analysis").unwrap().is_open);

        let fetches = AtomicU32::new(0);
        let result: FacadeResult<f64> = facade
            .fetch_or_cache("analysis", EntityKind::Analysis, "AAPL", || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(1.0)
            })
            .await;
        assert!(matches!(result, Err(FacadeError::CircuitOpen(_))));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_hit_bypasses_an_open_circuit() {
        let kv = Arc::new(InMemoryKv::new());
        let facade = facade_over(kv);

        let price: f64 = facade
            .fetch_or_cache("quote-feed", EntityKind::Quote, "AAPL", || async { Ok(185.20) })
            .await
            .unwrap();
        assert_eq!(price, 185.20);

        // Trip the breaker with cache-missing failures.
        let _: FacadeResult<f64> = facade
            .fetch_or_cache("quote-feed", EntityKind::Quote, "TSLA", || async {
                Err(RemoteError::ConnectionReset("peer closed".to_string()))
            })
            .await;
        assert!(facade.breaker_status("quote-feed").unwrap().is_open);

        // The cached symbol still serves.
        let price: f64 = facade
            .fetch_or_cache("quote-feed", EntityKind::Quote, "AAPL", || async {
                Err(RemoteError::ConnectionReset("peer closed".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(price, 185.20);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let kv = Arc::new(InMemoryKv::new());
        let facade = facade_over(kv);
        let fetches = AtomicU32::new(0);

        for _ in 0..2 {
            let _: f64 = facade
                .fetch_or_cache("quote-feed", EntityKind::Quote, "AAPL", || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(185.20)
                })
                .await
                .unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        assert!(facade.invalidate("AAPL").await >= 1);

        let _: f64 = facade
            .fetch_or_cache("quote-feed", EntityKind::Quote, "AAPL", || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(186.00)
            })
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn guarded_execution_without_caching() {
        let kv = Arc::new(InMemoryKv::new());
        let facade = facade_over(kv);
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let ack: &str = facade
                .execute_guarded("notifications", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("sent")
                })
                .await
                .unwrap();
            assert_eq!(ack, "sent");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn guarded_stream_collects_in_order() {
        let kv = Arc::new(InMemoryKv::new());
        let facade = facade_over(kv);

        let ticks = facade
            .execute_guarded_stream("quote-feed", || async {
                Ok(futures::stream::iter(vec![Ok(1u32), Ok(2), Ok(3)]))
            })
            .await
            .unwrap();
        assert_eq!(ticks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn health_reflects_breaker_fleet() {
        let kv = Arc::new(InMemoryKv::new());
        let facade = facade_over(kv);

        let _: f64 = facade
            .fetch_or_cache("quote-feed", EntityKind::Quote, "AAPL", || async { Ok(1.0) })
            .await
            .unwrap();

        let health = facade.health().await;
        assert_eq!(health.cache.status, "healthy");
        assert_eq!(health.breaker_states.get(&CircuitState::Closed), Some(&1));
        assert_eq!(health.breaker_health_score, 1.0);
    }
}
