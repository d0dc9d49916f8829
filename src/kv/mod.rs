//! # Key-Value Client Boundary
//!
//! The facade talks to the remote distributed cache through the [`KvClient`]
//! trait. The wire protocol is a black box: implementations wrap whatever
//! cluster client the deployment uses, and the trait deals only in string
//! keys, string values (JSON text at this layer), and millisecond TTLs.
//!
//! [`memory::InMemoryKv`] provides a reference implementation with real TTL
//! expiry and failure injection, used throughout the test suite.

pub mod memory;

use crate::error::CacheError;
use async_trait::async_trait;
use std::time::Duration;

pub use memory::InMemoryKv;

/// Raw operations against the remote key-value cluster.
///
/// All values are opaque strings; the typed serialization boundary lives in
/// [`crate::cache::CacheClient`]. `delete_pattern` and `key_count` accept a
/// glob where only `*` is meaningful, matching the scan restrictions of
/// common cluster deployments.
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Atomic set-if-absent. Returns `false` when the key already existed.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Returns `true` when the key existed and was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Deletes every key matching the glob; returns how many were removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Resets the TTL of an existing key. Returns `false` for missing keys.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Atomically adds `delta` (which may be negative) to a numeric key,
    /// initializing missing keys to zero. Returns the new value.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError>;

    /// Appends to the tail of a list; returns the new length.
    async fn list_push(&self, key: &str, value: &str) -> Result<u64, CacheError>;

    /// Pops from the head of a list.
    async fn list_pop(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Inclusive range over a list; negative indices count from the tail.
    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, CacheError>;

    /// Returns `true` when the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;

    /// Returns `true` when the member existed and was removed.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    /// Approximate count of keys matching the glob. Used for health
    /// reporting only; precision is not required.
    async fn key_count(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Glob matching with `*` as the only wildcard.
///
/// Shared by [`KvClient`] implementations that scan keys client-side.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    fn inner(p: &[u8], k: &[u8]) -> bool {
        match (p.first(), k.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&p[1..], k) || (!k.is_empty() && inner(p, &k[1..]))
            }
            (Some(pc), Some(kc)) if pc == kc => inner(&p[1..], &k[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(glob_match("stockdash:quote:*", "stockdash:quote:AAPL"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("stockdash:*:AAPL", "stockdash:analysis:AAPL"));
        assert!(glob_match("exact", "exact"));

        assert!(!glob_match("stockdash:quote:*", "stockdash:analysis:AAPL"));
        assert!(!glob_match("exact", "exact:longer"));
        assert!(!glob_match("stockdash:*:AAPL", "stockdash:quote:MSFT"));
    }
}
