//! # Fault-Tolerant Cache Client
//!
//! Typed wrapper over the raw [`KvClient`] boundary. Every operation is
//! fail-soft: a backend or serialization error is converted into the miss or
//! no-op outcome for the caller, recorded against connection health, and
//! never propagated. The cache is an optimization, not a dependency.

use crate::cache::health::{ConnectionHealth, ConnectionHealthSnapshot};
use crate::error::CacheError;
use crate::kv::KvClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Typed, fail-soft cache operations.
#[derive(Clone)]
pub struct CacheClient {
    kv: Arc<dyn KvClient>,
    health: Arc<ConnectionHealth>,
}

impl CacheClient {
    pub fn new(kv: Arc<dyn KvClient>) -> Self {
        Self::with_health(kv, Arc::new(ConnectionHealth::default()))
    }

    pub fn with_health(kv: Arc<dyn KvClient>, health: Arc<ConnectionHealth>) -> Self {
        Self { kv, health }
    }

    pub fn health(&self) -> &ConnectionHealth {
        &self.health
    }

    pub fn health_snapshot(&self) -> ConnectionHealthSnapshot {
        self.health.snapshot()
    }

    /// Fold a raw KV result into the health side channel, returning the
    /// fallback outcome on error.
    fn absorb<T>(&self, operation: &str, result: Result<T, CacheError>, fallback: T) -> T {
        match result {
            Ok(value) => {
                self.health.record_success();
                value
            }
            Err(err) => {
                self.health.record_failure(operation, &err);
                fallback
            }
        }
    }

    /// Fetch and deserialize a value. Backend errors and undecodable
    /// payloads both read as misses; stale-shaped entries are deleted
    /// best-effort so they do not miss forever.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key).await {
            Ok(raw) => {
                self.health.record_success();
                raw?
            }
            Err(err) => {
                self.health.record_failure("get", &err);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = key, error = %err, "Dropping cache entry that no longer deserializes");
                let _ = self.kv.delete(key).await;
                None
            }
        }
    }

    /// Serialize and store a value with a TTL. Returns `false` when the
    /// value could not be stored for any reason.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = key, error = %err, "Refusing to cache unserializable value");
                return false;
            }
        };
        let result = self.kv.set(key, &raw, Some(ttl)).await.map(|()| true);
        self.absorb("set", result, false)
    }

    /// Atomic set-if-absent. `false` when the key existed or the store failed.
    pub async fn set_if_absent<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = key, error = %err, "Refusing to cache unserializable value");
                return false;
            }
        };
        let result = self.kv.set_if_absent(key, &raw, Some(ttl)).await;
        self.absorb("set_if_absent", result, false)
    }

    pub async fn delete(&self, key: &str) -> bool {
        let result = self.kv.delete(key).await;
        self.absorb("delete", result, false)
    }

    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let result = self.kv.delete_pattern(pattern).await;
        let removed = self.absorb("delete_pattern", result, 0);
        debug!(pattern = pattern, removed = removed, "Pattern invalidation");
        removed
    }

    pub async fn exists(&self, key: &str) -> bool {
        let result = self.kv.exists(key).await;
        self.absorb("exists", result, false)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let result = self.kv.expire(key, ttl).await;
        self.absorb("expire", result, false)
    }

    /// Read-through get: on miss, invoke the supplier, store its result
    /// best-effort, and return it. The cache backend being down does not
    /// change the outcome; supplier errors propagate unchanged.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        supplier: F,
        ttl: Duration,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let value = supplier().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Collection-shaped read-through with the same fail-soft contract.
    pub async fn get_or_set_collection<T, E, F, Fut>(
        &self,
        key: &str,
        supplier: F,
        ttl: Duration,
    ) -> Result<Vec<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        if let Some(cached) = self.get::<Vec<T>>(key).await {
            return Ok(cached);
        }

        let values = supplier().await?;
        self.set(key, &values, ttl).await;
        Ok(values)
    }

    /// Atomic counter add. `None` when the backend was unreachable.
    pub async fn increment(&self, key: &str, delta: i64) -> Option<i64> {
        let result = self.kv.increment(key, delta).await.map(Some);
        self.absorb("increment", result, None)
    }

    pub async fn decrement(&self, key: &str, delta: i64) -> Option<i64> {
        self.increment(key, -delta).await
    }

    pub async fn hash_get(&self, key: &str, field: &str) -> Option<String> {
        let result = self.kv.hash_get(key, field).await;
        self.absorb("hash_get", result, None)
    }

    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> bool {
        let result = self.kv.hash_set(key, field, value).await.map(|()| true);
        self.absorb("hash_set", result, false)
    }

    pub async fn list_push(&self, key: &str, value: &str) -> Option<u64> {
        let result = self.kv.list_push(key, value).await.map(Some);
        self.absorb("list_push", result, None)
    }

    pub async fn list_pop(&self, key: &str) -> Option<String> {
        let result = self.kv.list_pop(key).await;
        self.absorb("list_pop", result, None)
    }

    pub async fn list_range(&self, key: &str, start: i64, stop: i64) -> Vec<String> {
        let result = self.kv.list_range(key, start, stop).await;
        self.absorb("list_range", result, Vec::new())
    }

    pub async fn set_add(&self, key: &str, member: &str) -> bool {
        let result = self.kv.set_add(key, member).await;
        self.absorb("set_add", result, false)
    }

    pub async fn set_members(&self, key: &str) -> Vec<String> {
        let result = self.kv.set_members(key).await;
        self.absorb("set_members", result, Vec::new())
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> bool {
        let result = self.kv.set_remove(key, member).await;
        self.absorb("set_remove", result, false)
    }

    /// Approximate key count for a glob, for health reporting.
    pub async fn key_count(&self, pattern: &str) -> u64 {
        let result = self.kv.key_count(pattern).await;
        self.absorb("key_count", result, 0)
    }
}
