use std::{sync::Arc, time::Duration};

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    cache::{CacheStore, CacheValue},
    storage::StorageResult,
};

/// Mutual-exclusion guard held in the cache tier.
///
/// Acquisition is a conditional set of a random token under the lock key, so
/// concurrent holders across processes cannot both win. The token is checked
/// again at release time: a holder whose lock expired and was reacquired by
/// someone else must not delete the new holder's lock.
pub struct CacheLock {
    store: Arc<dyn CacheStore>,
    key: String,
    token: String,
}

/// Try to take the lock at `key`, retrying with jittered backoff.
///
/// Returns `Ok(None)` when every attempt found the lock held; transport
/// failures bubble up so callers can decide their fail-open/closed policy.
pub async fn acquire(
    store: Arc<dyn CacheStore>,
    key: &str,
    ttl: Duration,
    retries: u32,
    backoff: Duration,
) -> StorageResult<Option<CacheLock>> {
    let token = Uuid::new_v4().simple().to_string();

    for attempt in 0..=retries {
        let won = store
            .set_if_absent(key, CacheValue::Raw(token.clone()), ttl)
            .await?;
        if won {
            return Ok(Some(CacheLock {
                store,
                key: key.to_owned(),
                token,
            }));
        }

        if attempt < retries {
            let jitter = rand::rng().random_range(0..=backoff.as_millis() as u64 / 2);
            sleep(backoff * (attempt + 1) + Duration::from_millis(jitter)).await;
        }
    }

    Ok(None)
}

impl CacheLock {
    /// Release the lock, deleting the key only while our token still owns it.
    ///
    /// Returns `false` when the lock had already expired and been taken over.
    pub async fn release(self) -> bool {
        let holder = match self.store.get(&self.key).await {
            Ok(holder) => holder,
            Err(err) => {
                warn!(key = %self.key, error = %err, "lock release check failed; leaving key to expire");
                return false;
            }
        };

        match holder {
            Some(CacheValue::Raw(token)) if token == self.token => {
                match self.store.delete(&self.key).await {
                    Ok(removed) => removed,
                    Err(err) => {
                        warn!(key = %self.key, error = %err, "lock delete failed; leaving key to expire");
                        false
                    }
                }
            }
            _ => {
                warn!(key = %self.key, "lock token no longer owned at release; skipping delete");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::cache::memory::MemoryCacheStore;

    fn store() -> Arc<dyn CacheStore> {
        Arc::new(MemoryCacheStore::new())
    }

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let store = store();
        let ttl = Duration::from_secs(5);

        let lock = acquire(store.clone(), "lock:p1", ttl, 0, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(lock.is_some());

        let contender = acquire(store.clone(), "lock:p1", ttl, 1, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(contender.is_none());
    }

    #[tokio::test]
    async fn lock_can_be_reacquired_after_release() {
        let store = store();
        let ttl = Duration::from_secs(5);

        let lock = acquire(store.clone(), "lock:p2", ttl, 0, Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();
        assert!(lock.release().await);

        let again = acquire(store, "lock:p2", ttl, 0, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn release_refuses_foreign_token() {
        let store = store();
        let ttl = Duration::from_secs(5);

        let lock = acquire(store.clone(), "lock:p3", ttl, 0, Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();

        // Simulate expiry-and-reacquire: another holder's token now owns the key.
        store
            .set("lock:p3", CacheValue::Raw("someone-else".into()), Some(ttl))
            .await
            .unwrap();

        assert!(!lock.release().await);
        let holder = store.get("lock:p3").await.unwrap().unwrap();
        assert_eq!(holder, CacheValue::Raw("someone-else".into()));
    }

    #[tokio::test]
    async fn contender_wins_after_ttl_expiry() {
        let store = store();
        let ttl = Duration::from_millis(30);

        let _lock = acquire(store.clone(), "lock:p4", ttl, 0, Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();

        let contender = acquire(
            store.clone(),
            "lock:p4",
            Duration::from_secs(5),
            3,
            Duration::from_millis(25),
        )
        .await
        .unwrap();
        assert!(contender.is_some(), "lock should be free once its TTL lapsed");
    }
}
