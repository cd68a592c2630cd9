use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use futures::future::BoxFuture;

use crate::dao::{
    cache::{CacheStore, CacheValue},
    storage::StorageResult,
};

/// Process-local [`CacheStore`] backend.
///
/// Offers the same primitives as the Redis backend so tests and cache-less
/// deployments exercise identical code paths. Expiry is enforced lazily on
/// access, matching the self-expiring semantics callers rely on.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<Mutex<HashMap<String, Slot>>>,
}

struct Slot {
    kind: SlotKind,
    expires_at: Option<Instant>,
}

enum SlotKind {
    Scalar(CacheValue),
    Hash(HashMap<String, CacheValue>),
    Sorted(Vec<(String, f64)>),
}

impl Slot {
    fn scalar(value: CacheValue, ttl: Option<Duration>) -> Self {
        Self {
            kind: SlotKind::Scalar(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| deadline <= Instant::now())
    }
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, op: impl FnOnce(&mut HashMap<String, Slot>) -> T) -> T {
        let mut entries = self.inner.lock().unwrap_or_else(|poisoned| {
            // A panicking holder cannot leave slot data half-written; every
            // mutation below completes before the guard drops.
            poisoned.into_inner()
        });
        entries.retain(|_, slot| !slot.expired());
        op(&mut entries)
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<CacheValue>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| match entries.get(&key).map(|slot| &slot.kind) {
                Some(SlotKind::Scalar(value)) => Some(value.clone()),
                _ => None,
            }))
        })
    }

    fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            store.with_entries(|entries| {
                entries.insert(key, Slot::scalar(value, ttl));
            });
            Ok(())
        })
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                if entries.contains_key(&key) {
                    false
                } else {
                    entries.insert(key, Slot::scalar(value, Some(ttl)));
                    true
                }
            }))
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { Ok(store.with_entries(|entries| entries.remove(&key).is_some())) })
    }

    fn increment(&self, key: &str, amount: i64) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                let current = match entries.get(&key).map(|slot| &slot.kind) {
                    Some(SlotKind::Scalar(value)) => value.as_integer().unwrap_or(0),
                    _ => 0,
                };
                let next = current + amount;
                let expires_at = entries.get(&key).and_then(|slot| slot.expires_at);
                entries.insert(
                    key,
                    Slot {
                        kind: SlotKind::Scalar(CacheValue::Json(next.into())),
                        expires_at,
                    },
                );
                next
            }))
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| match entries.get_mut(&key) {
                Some(slot) => {
                    slot.expires_at = Some(Instant::now() + ttl);
                    true
                }
                None => false,
            }))
        })
    }

    fn time_to_live(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Duration>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                entries
                    .get(&key)
                    .and_then(|slot| slot.expires_at)
                    .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            }))
        })
    }

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: CacheValue,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        let field = field.to_owned();
        Box::pin(async move {
            store.with_entries(|entries| {
                let slot = entries.entry(key).or_insert_with(|| Slot {
                    kind: SlotKind::Hash(HashMap::new()),
                    expires_at: None,
                });
                if let SlotKind::Hash(fields) = &mut slot.kind {
                    fields.insert(field, value);
                } else {
                    slot.kind = SlotKind::Hash(HashMap::from([(field, value)]));
                }
            });
            Ok(())
        })
    }

    fn hash_get(
        &self,
        key: &str,
        field: &str,
    ) -> BoxFuture<'static, StorageResult<Option<CacheValue>>> {
        let store = self.clone();
        let key = key.to_owned();
        let field = field.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                match entries.get(&key).map(|slot| &slot.kind) {
                    Some(SlotKind::Hash(fields)) => fields.get(&field).cloned(),
                    _ => None,
                }
            }))
        })
    }

    fn hash_get_all(
        &self,
        key: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, CacheValue)>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                match entries.get(&key).map(|slot| &slot.kind) {
                    Some(SlotKind::Hash(fields)) => fields
                        .iter()
                        .map(|(field, value)| (field.clone(), value.clone()))
                        .collect(),
                    _ => Vec::new(),
                }
            }))
        })
    }

    fn sorted_insert(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        let member = member.to_owned();
        Box::pin(async move {
            store.with_entries(|entries| {
                let slot = entries.entry(key).or_insert_with(|| Slot {
                    kind: SlotKind::Sorted(Vec::new()),
                    expires_at: None,
                });
                if !matches!(slot.kind, SlotKind::Sorted(_)) {
                    slot.kind = SlotKind::Sorted(Vec::new());
                }
                if let SlotKind::Sorted(members) = &mut slot.kind {
                    members.retain(|(existing, _)| *existing != member);
                    members.push((member, score));
                    members.sort_by(|(_, a), (_, b)| a.total_cmp(b));
                }
            });
            Ok(())
        })
    }

    fn sorted_remove_below(
        &self,
        key: &str,
        cutoff: f64,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                match entries.get_mut(&key).map(|slot| &mut slot.kind) {
                    Some(SlotKind::Sorted(members)) => {
                        let before = members.len();
                        members.retain(|(_, score)| *score >= cutoff);
                        (before - members.len()) as u64
                    }
                    _ => 0,
                }
            }))
        })
    }

    fn sorted_count(&self, key: &str) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                match entries.get(&key).map(|slot| &slot.kind) {
                    Some(SlotKind::Sorted(members)) => members.len() as u64,
                    _ => 0,
                }
            }))
        })
    }

    fn sorted_min_score(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<f64>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                match entries.get(&key).map(|slot| &slot.kind) {
                    Some(SlotKind::Sorted(members)) => {
                        members.first().map(|(_, score)| *score)
                    }
                    _ => None,
                }
            }))
        })
    }

    fn sorted_range_desc(
        &self,
        key: &str,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, f64)>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            Ok(store.with_entries(|entries| {
                match entries.get(&key).map(|slot| &slot.kind) {
                    Some(SlotKind::Sorted(members)) => members
                        .iter()
                        .rev()
                        .take(limit)
                        .map(|(member, score)| (member.clone(), *score))
                        .collect(),
                    _ => Vec::new(),
                }
            }))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let store = MemoryCacheStore::new();
        store
            .set("player:a", CacheValue::decode("{\"balance\":10}"), None)
            .await
            .unwrap();

        let value = store.get("player:a").await.unwrap().unwrap();
        assert_eq!(value, CacheValue::Json(serde_json::json!({"balance": 10})));

        assert!(store.delete("player:a").await.unwrap());
        assert!(store.get("player:a").await.unwrap().is_none());
        assert!(!store.delete("player:a").await.unwrap());
    }

    #[tokio::test]
    async fn values_expire_after_ttl() {
        let store = MemoryCacheStore::new();
        store
            .set(
                "ephemeral",
                CacheValue::Raw("x".into()),
                Some(Duration::from_millis(30)),
            )
            .await
            .unwrap();
        assert!(store.get("ephemeral").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get("ephemeral").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_if_absent_only_wins_once() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(5);
        assert!(
            store
                .set_if_absent("lock", CacheValue::Raw("a".into()), ttl)
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_if_absent("lock", CacheValue::Raw("b".into()), ttl)
                .await
                .unwrap()
        );

        let holder = store.get("lock").await.unwrap().unwrap();
        assert_eq!(holder, CacheValue::Raw("a".into()));
    }

    #[tokio::test]
    async fn increment_starts_from_zero_and_accumulates() {
        let store = MemoryCacheStore::new();
        assert_eq!(store.increment("hits", 1).await.unwrap(), 1);
        assert_eq!(store.increment("hits", 2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn sorted_set_prunes_and_counts() {
        let store = MemoryCacheStore::new();
        for (member, score) in [("a", 10.0), ("b", 20.0), ("c", 30.0)] {
            store.sorted_insert("window", score, member).await.unwrap();
        }

        assert_eq!(store.sorted_count("window").await.unwrap(), 3);
        assert_eq!(store.sorted_min_score("window").await.unwrap(), Some(10.0));
        assert_eq!(store.sorted_remove_below("window", 15.0).await.unwrap(), 1);
        assert_eq!(store.sorted_count("window").await.unwrap(), 2);

        let top = store.sorted_range_desc("window", 1).await.unwrap();
        assert_eq!(top, vec![("c".to_string(), 30.0)]);
    }
}
