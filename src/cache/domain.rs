//! # Domain Cache
//!
//! Key namespace and TTL policy for the dashboard's entity types. This layer
//! owns nothing but key composition and TTL selection; all fault tolerance
//! comes from the underlying [`CacheClient`].

use crate::cache::client::CacheClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Entity types the dashboard caches, each with a fixed key prefix and a
/// default TTL matched to how fast the data goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Live quote data; stale within minutes.
    Quote,
    /// Computed analysis results.
    Analysis,
    /// Historical price series.
    History,
    /// Reference lists such as available symbols.
    SymbolList,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Quote,
        EntityKind::Analysis,
        EntityKind::History,
        EntityKind::SymbolList,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Quote => "quote",
            EntityKind::Analysis => "analysis",
            EntityKind::History => "history",
            EntityKind::SymbolList => "symbols",
        }
    }
}

/// Per-entity-type TTLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlPolicy {
    pub quote: Duration,
    pub analysis: Duration,
    pub history: Duration,
    pub symbol_list: Duration,
}

impl TtlPolicy {
    pub fn ttl_for(&self, kind: EntityKind) -> Duration {
        match kind {
            EntityKind::Quote => self.quote,
            EntityKind::Analysis => self.analysis,
            EntityKind::History => self.history,
            EntityKind::SymbolList => self.symbol_list,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            quote: Duration::from_secs(120),
            analysis: Duration::from_secs(15 * 60),
            history: Duration::from_secs(60 * 60),
            symbol_list: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Namespaced, TTL-aware cache for dashboard entities.
#[derive(Clone)]
pub struct DomainCache {
    client: CacheClient,
    namespace: String,
    ttls: TtlPolicy,
}

impl DomainCache {
    pub fn new(client: CacheClient, namespace: impl Into<String>, ttls: TtlPolicy) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            ttls,
        }
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ttl_for(&self, kind: EntityKind) -> Duration {
        self.ttls.ttl_for(kind)
    }

    /// Composes `"<namespace>:<entity>:<id>"`.
    pub fn key(&self, kind: EntityKind, id: &str) -> String {
        format!("{}:{}:{}", self.namespace, kind.prefix(), id)
    }

    /// Composes `"<namespace>:<entity>:<id>:<qualifier>"`, e.g. a history
    /// series keyed by range.
    pub fn qualified_key(&self, kind: EntityKind, id: &str, qualifier: &str) -> String {
        format!("{}:{}:{}:{}", self.namespace, kind.prefix(), id, qualifier)
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: EntityKind, id: &str) -> Option<T> {
        self.client.get(&self.key(kind, id)).await
    }

    pub async fn set<T: Serialize>(&self, kind: EntityKind, id: &str, value: &T) -> bool {
        self.client
            .set(&self.key(kind, id), value, self.ttl_for(kind))
            .await
    }

    pub async fn get_qualified<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        id: &str,
        qualifier: &str,
    ) -> Option<T> {
        self.client.get(&self.qualified_key(kind, id, qualifier)).await
    }

    pub async fn set_qualified<T: Serialize>(
        &self,
        kind: EntityKind,
        id: &str,
        qualifier: &str,
        value: &T,
    ) -> bool {
        self.client
            .set(&self.qualified_key(kind, id, qualifier), value, self.ttl_for(kind))
            .await
    }

    /// Seed an entry only if nothing is cached yet, e.g. warm-up placeholders.
    pub async fn seed_if_absent<T: Serialize>(
        &self,
        kind: EntityKind,
        id: &str,
        value: &T,
    ) -> bool {
        self.client
            .set_if_absent(&self.key(kind, id), value, self.ttl_for(kind))
            .await
    }

    pub async fn exists(&self, kind: EntityKind, id: &str) -> bool {
        self.client.exists(&self.key(kind, id)).await
    }

    /// Remove every cached entry (all entity kinds, plain and qualified
    /// keys) for one id. Returns how many entries were removed.
    pub async fn invalidate(&self, id: &str) -> u64 {
        let mut removed = 0;
        for kind in EntityKind::ALL {
            // Exact key plus qualified variants only; a bare `{id}*` glob
            // would also wipe ids that share a prefix (GOOG vs GOOGL).
            let key = format!("{}:{}:{}", self.namespace, kind.prefix(), id);
            if self.client.delete(&key).await {
                removed += 1;
            }
            removed += self.client.delete_pattern(&format!("{key}:*")).await;
        }
        removed
    }

    /// Remove every cached entity entry in the namespace. Reserved keys
    /// (metrics) are outside the entity prefixes and survive.
    pub async fn invalidate_all(&self) -> u64 {
        let mut removed = 0;
        for kind in EntityKind::ALL {
            removed += self
                .client
                .delete_pattern(&format!("{}:{}:*", self.namespace, kind.prefix()))
                .await;
        }
        removed
    }
}
