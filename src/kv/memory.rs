//! # In-Memory KV Backend
//!
//! Process-local implementation of [`KvClient`] with real TTL expiry, used as
//! the test double for the remote cluster. Supports failure injection (mimic
//! an unreachable backend or a cluster "moved" redirect) and a controllable
//! clock so TTL expiry can be tested without sleeping.

use super::{glob_match, KvClient};
use crate::error::CacheError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

/// What every injected failure looks like to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    None,
    /// Every operation fails as if the backend were unreachable.
    Unavailable,
    /// Every operation fails with a cluster topology redirect.
    Moved,
}

/// A stored value. The remote cluster distinguishes plain strings from
/// hashes, lists, and sets; so do we, and type mismatches are backend errors.
#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Entry>,
    /// Simulated clock offset; `advance_clock` moves it forward.
    skew: Duration,
}

impl Store {
    fn now(&self) -> Instant {
        Instant::now() + self.skew
    }

    /// Drops the entry if expired, then returns a live reference.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = self.now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at.is_some_and(|at| at <= now) {
                self.entries.remove(key);
                return None;
            }
        }
        self.entries.get_mut(key)
    }

    fn prune_expired(&mut self) {
        let now = self.now();
        self.entries
            .retain(|_, entry| !entry.expires_at.is_some_and(|at| at <= now));
    }
}

/// In-memory [`KvClient`] with TTL handling and failure injection.
#[derive(Debug, Default)]
pub struct InMemoryKv {
    store: Mutex<Store>,
    failure: Mutex<FailureMode>,
}

impl Default for FailureMode {
    fn default() -> Self {
        FailureMode::None
    }
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the backend were down.
    pub fn fail_backend(&self, enabled: bool) {
        *self.failure.lock() = if enabled {
            FailureMode::Unavailable
        } else {
            FailureMode::None
        };
    }

    /// Make every subsequent operation fail with a cluster redirect.
    pub fn fail_moved(&self, enabled: bool) {
        *self.failure.lock() = if enabled {
            FailureMode::Moved
        } else {
            FailureMode::None
        };
    }

    /// Advance the simulated clock, expiring entries whose TTL has passed.
    pub fn advance_clock(&self, by: Duration) {
        let mut store = self.store.lock();
        store.skew += by;
        store.prune_expired();
    }

    /// Number of live entries, for test assertions.
    pub fn len(&self) -> usize {
        let mut store = self.store.lock();
        store.prune_expired();
        store.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_failure(&self) -> Result<(), CacheError> {
        match *self.failure.lock() {
            FailureMode::None => Ok(()),
            FailureMode::Unavailable => Err(CacheError::Backend(
                "injected backend failure".to_string(),
            )),
            FailureMode::Moved => Err(CacheError::Moved(
                "injected cluster redirect".to_string(),
            )),
        }
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Backend(format!("key '{key}' holds a value of the wrong type"))
}

#[async_trait]
impl KvClient for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::Text(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        let expires_at = ttl.map(|ttl| store.now() + ttl);
        store.entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        if store.live(key).is_some() {
            return Ok(false);
        }
        let expires_at = ttl.map(|ttl| store.now() + ttl);
        store.entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        store.prune_expired();
        Ok(store.entries.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        store.prune_expired();
        let before = store.entries.len();
        store.entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - store.entries.len()) as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check_failure()?;
        Ok(self.store.lock().live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        let deadline = store.now() + ttl;
        match store.live(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::Text(value),
                ..
            }) => {
                let current: i64 = value.parse().map_err(|_| {
                    CacheError::Backend(format!("key '{key}' is not an integer"))
                })?;
                let next = current + delta;
                *value = next.to_string();
                Ok(next)
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                store.entries.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::Text(delta.to_string()),
                        expires_at: None,
                    },
                );
                Ok(delta)
            }
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::Hash(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::Hash(fields),
                ..
            }) => {
                fields.insert(field.to_string(), value.to_string());
                Ok(())
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                let mut fields = HashMap::new();
                fields.insert(field.to_string(), value.to_string());
                store.entries.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::Hash(fields),
                        expires_at: None,
                    },
                );
                Ok(())
            }
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::List(items),
                ..
            }) => {
                items.push_back(value.to_string());
                Ok(items.len() as u64)
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                let mut items = VecDeque::new();
                items.push_back(value.to_string());
                store.entries.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::List(items),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::List(items),
                ..
            }) => Ok(items.pop_front()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::List(items),
                ..
            }) => {
                let len = items.len() as i64;
                let clamp = |index: i64| -> usize {
                    let resolved = if index < 0 { len + index } else { index };
                    resolved.clamp(0, len) as usize
                };
                let (from, to) = (clamp(start), clamp(stop).saturating_add(1).min(len as usize));
                if from >= to {
                    return Ok(Vec::new());
                }
                Ok(items.iter().skip(from).take(to - from).cloned().collect())
            }
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::Set(members),
                ..
            }) => Ok(members.insert(member.to_string())),
            Some(_) => Err(wrong_type(key)),
            None => {
                let mut members = BTreeSet::new();
                members.insert(member.to_string());
                store.entries.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::Set(members),
                        expires_at: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        match store.live(key) {
            Some(Entry {
                slot: Slot::Set(members),
                ..
            }) => Ok(members.remove(member)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(false),
        }
    }

    async fn key_count(&self, pattern: &str) -> Result<u64, CacheError> {
        self.check_failure()?;
        let mut store = self.store.lock();
        store.prune_expired();
        Ok(store
            .entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip() {
        tokio_test::block_on(async {
            let kv = InMemoryKv::new();
            kv.set("quote:AAPL", "{\"price\":150.0}", None).await.unwrap();
            assert_eq!(
                kv.get("quote:AAPL").await.unwrap(),
                Some("{\"price\":150.0}".to_string())
            );
            assert_eq!(kv.get("quote:MSFT").await.unwrap(), None);
        });
    }

    #[tokio::test]
    async fn ttl_expiry_with_simulated_clock() {
        let kv = InMemoryKv::new();
        kv.set("quote:AAPL", "150", Some(Duration::from_secs(300)))
            .await
            .unwrap();
        assert!(kv.exists("quote:AAPL").await.unwrap());

        kv.advance_clock(Duration::from_secs(360));
        assert!(!kv.exists("quote:AAPL").await.unwrap());
        assert_eq!(kv.get("quote:AAPL").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_respects_existing() {
        let kv = InMemoryKv::new();
        assert!(kv.set_if_absent("lock", "a", None).await.unwrap());
        assert!(!kv.set_if_absent("lock", "b", None).await.unwrap());
        assert_eq!(kv.get("lock").await.unwrap(), Some("a".to_string()));

        // Expired keys count as absent again.
        kv.expire("lock", Duration::from_secs(1)).await.unwrap();
        kv.advance_clock(Duration::from_secs(2));
        assert!(kv.set_if_absent("lock", "c", None).await.unwrap());
    }

    #[tokio::test]
    async fn pattern_delete_and_count() {
        let kv = InMemoryKv::new();
        kv.set("sd:quote:AAPL", "1", None).await.unwrap();
        kv.set("sd:quote:MSFT", "2", None).await.unwrap();
        kv.set("sd:analysis:AAPL", "3", None).await.unwrap();

        assert_eq!(kv.key_count("sd:quote:*").await.unwrap(), 2);
        assert_eq!(kv.delete_pattern("sd:quote:*").await.unwrap(), 2);
        assert_eq!(kv.key_count("sd:*").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn increment_initializes_and_accumulates() {
        let kv = InMemoryKv::new();
        assert_eq!(kv.increment("hits", 1).await.unwrap(), 1);
        assert_eq!(kv.increment("hits", 4).await.unwrap(), 5);
        assert_eq!(kv.increment("hits", -2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn collection_primitives() {
        let kv = InMemoryKv::new();

        kv.hash_set("meta", "last_op", "warm_up").await.unwrap();
        assert_eq!(
            kv.hash_get("meta", "last_op").await.unwrap(),
            Some("warm_up".to_string())
        );

        kv.list_push("recent", "AAPL").await.unwrap();
        kv.list_push("recent", "MSFT").await.unwrap();
        kv.list_push("recent", "NVDA").await.unwrap();
        assert_eq!(
            kv.list_range("recent", 0, -1).await.unwrap(),
            vec!["AAPL", "MSFT", "NVDA"]
        );
        assert_eq!(kv.list_pop("recent").await.unwrap(), Some("AAPL".to_string()));

        assert!(kv.set_add("symbols", "AAPL").await.unwrap());
        assert!(!kv.set_add("symbols", "AAPL").await.unwrap());
        assert!(kv.set_remove("symbols", "AAPL").await.unwrap());
        assert!(kv.set_members("symbols").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_injection() {
        let kv = InMemoryKv::new();
        kv.set("k", "v", None).await.unwrap();

        kv.fail_backend(true);
        assert!(matches!(
            kv.get("k").await,
            Err(CacheError::Backend(_))
        ));

        kv.fail_moved(true);
        assert!(matches!(kv.get("k").await, Err(CacheError::Moved(_))));

        kv.fail_backend(false);
        assert_eq!(kv.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn type_mismatch_is_backend_error() {
        let kv = InMemoryKv::new();
        kv.list_push("items", "a").await.unwrap();
        assert!(kv.get("items").await.is_err());
        assert!(kv.increment("items", 1).await.is_err());
    }
}
