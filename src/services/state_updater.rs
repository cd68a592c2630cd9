use std::time::{Duration, SystemTime};

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::{
    dao::{
        cache::{self, lock},
        models::PlayerRecord,
    },
    error::ServiceError,
    state::SharedState,
};

/// Attempts of the whole load-transform-save sequence before failing loudly.
const MAX_ATTEMPTS: u32 = 3;
/// Base delay between attempts; jittered to decorrelate colliding writers.
const RETRY_BACKOFF: Duration = Duration::from_millis(25);
/// Bounded lifetime of the cached copy; expiry forces a durable reload.
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Lifetime of the cross-process lock taken by settlement-style callers.
const LOCK_TTL: Duration = Duration::from_secs(5);
const LOCK_RETRIES: u32 = 5;
const LOCK_BACKOFF: Duration = Duration::from_millis(50);

fn player_cache_key(player_id: &str) -> String {
    format!("player:{player_id}")
}

fn player_lock_key(player_id: &str) -> String {
    format!("lock:player:{player_id}")
}

enum UpdateFailure {
    /// Business rejection from the transform; surfaced as-is, never retried.
    Rejected(ServiceError),
    /// A storage step failed; the whole sequence is retried.
    Infra(ServiceError),
}

/// Read-through load of a player record: cache first, then the durable
/// store (repopulating the cache with a bounded TTL), else a zero-valued
/// record. Cache transport errors are logged and treated as a miss.
pub async fn load_player(
    state: &SharedState,
    player_id: &str,
) -> Result<PlayerRecord, ServiceError> {
    let key = player_cache_key(player_id);

    if let Some(cache_store) = state.cache().await {
        match cache::get_typed::<PlayerRecord>(cache_store.as_ref(), &key).await {
            Ok(Some(record)) => return Ok(record),
            Ok(None) => {}
            Err(err) => {
                warn!(player = %player_id, error = %err, "cache read failed; treating as miss");
            }
        }
    }

    let Some(durable) = state.durable().await else {
        return Ok(PlayerRecord::new(player_id));
    };

    match durable.load_player(player_id).await? {
        Some(record) => {
            if let Some(cache_store) = state.cache().await
                && let Err(err) =
                    cache::set_typed(cache_store.as_ref(), &key, &record, Some(CACHE_TTL)).await
            {
                warn!(player = %player_id, error = %err, "failed to repopulate cache after miss");
            }
            Ok(record)
        }
        None => Ok(PlayerRecord::new(player_id)),
    }
}

/// Apply `transform` to the player's current record as one logical unit:
/// load, transform, persist to both tiers.
///
/// Storage failures retry the whole sequence with jittered backoff; after
/// [`MAX_ATTEMPTS`] the operation fails with [`ServiceError::ConflictExhausted`]
/// rather than being silently dropped. Player-initiated callers are already
/// serialized by the actor queue; this retry loop covers the remaining
/// cross-process race window.
pub async fn update_player<F>(
    state: &SharedState,
    player_id: &str,
    mut transform: F,
) -> Result<PlayerRecord, ServiceError>
where
    F: FnMut(PlayerRecord) -> Result<PlayerRecord, ServiceError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_update(state, player_id, &mut transform).await {
            Ok(record) => return Ok(record),
            Err(UpdateFailure::Rejected(err)) => return Err(err),
            Err(UpdateFailure::Infra(err)) => {
                if attempt >= MAX_ATTEMPTS {
                    warn!(
                        player = %player_id,
                        attempts = attempt,
                        error = %err,
                        "state update retries exhausted"
                    );
                    return Err(ServiceError::ConflictExhausted);
                }
                let jitter = rand::rng().random_range(0..=RETRY_BACKOFF.as_millis() as u64);
                sleep(RETRY_BACKOFF * attempt + Duration::from_millis(jitter)).await;
            }
        }
    }
}

/// [`update_player`] under the distributed lock.
///
/// For call sites outside the actor queue's protection (duel settlement,
/// background jobs) that may race a live player action across processes.
/// When the lock cannot be taken because the cache tier errored, the plain
/// retry path still runs: availability over strict exclusion.
pub async fn update_player_locked<F>(
    state: &SharedState,
    player_id: &str,
    transform: F,
) -> Result<PlayerRecord, ServiceError>
where
    F: FnMut(PlayerRecord) -> Result<PlayerRecord, ServiceError>,
{
    let Some(cache_store) = state.cache().await else {
        return update_player(state, player_id, transform).await;
    };

    match lock::acquire(
        cache_store,
        &player_lock_key(player_id),
        LOCK_TTL,
        LOCK_RETRIES,
        LOCK_BACKOFF,
    )
    .await
    {
        Ok(Some(guard)) => {
            let result = update_player(state, player_id, transform).await;
            guard.release().await;
            result
        }
        Ok(None) => {
            warn!(player = %player_id, "player lock still held after retries");
            Err(ServiceError::ConflictExhausted)
        }
        Err(err) => {
            warn!(player = %player_id, error = %err, "lock acquisition failed; proceeding unlocked");
            update_player(state, player_id, transform).await
        }
    }
}

async fn try_update<F>(
    state: &SharedState,
    player_id: &str,
    transform: &mut F,
) -> Result<PlayerRecord, UpdateFailure>
where
    F: FnMut(PlayerRecord) -> Result<PlayerRecord, ServiceError>,
{
    let cache_store = state.cache().await;
    let durable = state.durable().await;
    if cache_store.is_none() && durable.is_none() {
        return Err(UpdateFailure::Rejected(ServiceError::Degraded));
    }

    let current = load_player(state, player_id)
        .await
        .map_err(UpdateFailure::Infra)?;

    let mut next = transform(current).map_err(UpdateFailure::Rejected)?;
    next.updated_at = SystemTime::now();

    let mut cache_written = false;
    if let Some(cache_store) = &cache_store {
        cache::set_typed(
            cache_store.as_ref(),
            &player_cache_key(player_id),
            &next,
            Some(CACHE_TTL),
        )
        .await
        .map_err(|err| UpdateFailure::Infra(err.into()))?;
        cache_written = true;
    }

    if let Some(durable) = &durable {
        if let Err(err) = durable.save_player(next.clone()).await {
            if cache_written {
                // Cache is ahead of the durable store; accepted as bounded
                // drift, healed when the cache entry expires and reloads.
                warn!(
                    player = %player_id,
                    error = %err,
                    "durable write failed after cache write; cache ahead of durable store"
                );
            } else {
                return Err(UpdateFailure::Infra(err.into()));
            }
        }
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::{
        config::AppConfig,
        dao::{
            cache::{memory::MemoryCacheStore, CacheStore},
            durable::{memory::MemoryDurableStore, DurableStore},
        },
        state::{AppState, SharedState},
    };

    async fn fixture() -> (SharedState, MemoryCacheStore, MemoryDurableStore) {
        let state = AppState::new(AppConfig::default());
        let cache_store = MemoryCacheStore::new();
        let durable = MemoryDurableStore::new();
        state.install_cache(Arc::new(cache_store.clone())).await;
        state.install_durable(Arc::new(durable.clone())).await;
        (state, cache_store, durable)
    }

    fn credit(amount: u64) -> impl FnMut(PlayerRecord) -> Result<PlayerRecord, ServiceError> {
        move |mut record| {
            record.balance += amount;
            Ok(record)
        }
    }

    #[tokio::test]
    async fn update_persists_to_both_tiers() {
        let (state, cache_store, durable) = fixture().await;

        let record = update_player(&state, "p1", credit(50)).await.unwrap();
        assert_eq!(record.balance, 50);

        let cached: PlayerRecord =
            cache::get_typed(&cache_store, "player:p1").await.unwrap().unwrap();
        assert_eq!(cached.balance, 50);

        let stored = durable.load_player("p1").await.unwrap().unwrap();
        assert_eq!(stored.balance, 50);
    }

    #[tokio::test]
    async fn cache_eviction_recovers_last_durable_value() {
        let (state, cache_store, _durable) = fixture().await;

        update_player(&state, "p1", credit(75)).await.unwrap();
        cache_store.delete("player:p1").await.unwrap();

        let reloaded = load_player(&state, "p1").await.unwrap();
        assert_eq!(reloaded.balance, 75, "cache and durable tiers converge");

        // The miss repopulated the cache.
        let cached: PlayerRecord =
            cache::get_typed(&cache_store, "player:p1").await.unwrap().unwrap();
        assert_eq!(cached.balance, 75);
    }

    #[tokio::test]
    async fn transform_rejection_persists_nothing() {
        let (state, _cache_store, durable) = fixture().await;
        update_player(&state, "p1", credit(10)).await.unwrap();

        let result = update_player(&state, "p1", |_record| {
            Err(ServiceError::InvalidState("nope".into()))
        })
        .await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));

        let stored = durable.load_player("p1").await.unwrap().unwrap();
        assert_eq!(stored.balance, 10, "rejected transform left state untouched");
    }

    #[tokio::test]
    async fn unknown_player_starts_zero_valued() {
        let (state, _cache_store, _durable) = fixture().await;
        let record = load_player(&state, "fresh").await.unwrap();
        assert_eq!(record.balance, 0);
        assert_eq!(record.total_taps, 0);
    }

    #[tokio::test]
    async fn no_tiers_at_all_is_degraded() {
        let state = AppState::new(AppConfig::default());
        let result = update_player(&state, "p1", credit(1)).await;
        assert!(matches!(result, Err(ServiceError::Degraded)));
    }

    #[tokio::test]
    async fn locked_updates_from_many_tasks_lose_nothing() {
        let (state, _cache_store, durable) = fixture().await;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                update_player_locked(&state, "p1", credit(1)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = durable.load_player("p1").await.unwrap().unwrap();
        assert_eq!(stored.balance, 6);
    }
}
