use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use futures::future::BoxFuture;
use tracing::warn;
use uuid::Uuid;

use crate::dao::cache::CacheStore;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Actions left in the current window.
    pub remaining: u32,
    /// Seconds until the window admits another action.
    pub reset_seconds: u64,
}

impl RateDecision {
    /// Fail-open decision used when the cache tier is unreachable: the
    /// optimistic updater and actor queue remain as the correctness backstop.
    fn open(limit: u32) -> Self {
        Self {
            allowed: true,
            remaining: limit,
            reset_seconds: 0,
        }
    }
}

/// Interchangeable rate-limiting strategies sharing the cache-backed counter
/// abstraction.
pub trait RateLimitStrategy: Send + Sync {
    /// Check (and consume) one slot for `key` under `limit` per `window`.
    fn is_allowed(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> BoxFuture<'static, RateDecision>;
}

/// Counter with a window-aligned expiry. Cheap (one increment per check) but
/// admits up to twice the limit across a window boundary.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    cache: Arc<dyn CacheStore>,
}

impl FixedWindowLimiter {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    async fn check(&self, key: String, limit: u32, window: Duration) -> RateDecision {
        let count = match self.cache.increment(&key, 1).await {
            Ok(count) => count,
            Err(err) => {
                warn!(%key, error = %err, "rate limit counter unavailable; allowing action");
                return RateDecision::open(limit);
            }
        };

        // Only the increment that opens the window arms the expiry; later
        // increments ride the same deadline.
        if count == 1
            && let Err(err) = self.cache.expire(&key, window).await
        {
            warn!(%key, error = %err, "failed to arm rate limit window expiry");
        }

        let reset_seconds = match self.cache.time_to_live(&key).await {
            Ok(Some(ttl)) => ttl.as_secs(),
            _ => window.as_secs(),
        };

        RateDecision {
            allowed: count <= i64::from(limit),
            remaining: u32::try_from(i64::from(limit) - count).unwrap_or(0),
            reset_seconds,
        }
    }
}

impl RateLimitStrategy for FixedWindowLimiter {
    fn is_allowed(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> BoxFuture<'static, RateDecision> {
        let limiter = self.clone();
        let key = key.to_owned();
        Box::pin(async move { limiter.check(key, limit, window).await })
    }
}

/// Sorted set of timestamped entries pruned to the trailing window. One
/// prune+count+insert per check, in exchange for a smooth boundary.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    cache: Arc<dyn CacheStore>,
}

impl SlidingWindowLimiter {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    async fn check(&self, key: String, limit: u32, window: Duration) -> RateDecision {
        let now_ms = unix_millis();
        let window_ms = window.as_millis() as u64;
        let cutoff = now_ms.saturating_sub(window_ms) as f64;

        let outcome: Result<RateDecision, crate::dao::storage::StorageError> = async {
            self.cache.sorted_remove_below(&key, cutoff).await?;
            let count = self.cache.sorted_count(&key).await?;

            if count >= u64::from(limit) {
                let oldest = self.cache.sorted_min_score(&key).await?;
                let reset_ms = oldest
                    .map(|score| (score as u64 + window_ms).saturating_sub(now_ms))
                    .unwrap_or(window_ms);
                return Ok(RateDecision {
                    allowed: false,
                    remaining: 0,
                    reset_seconds: reset_ms.div_ceil(1_000),
                });
            }

            let member = format!("{now_ms}-{}", Uuid::new_v4().simple());
            self.cache.sorted_insert(&key, now_ms as f64, &member).await?;
            // The window itself self-expires with the cache key.
            self.cache.expire(&key, window).await?;

            Ok(RateDecision {
                allowed: true,
                remaining: limit - count as u32 - 1,
                reset_seconds: 0,
            })
        }
        .await;

        match outcome {
            Ok(decision) => decision,
            Err(err) => {
                warn!(%key, error = %err, "rate limit window unavailable; allowing action");
                RateDecision::open(limit)
            }
        }
    }
}

impl RateLimitStrategy for SlidingWindowLimiter {
    fn is_allowed(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> BoxFuture<'static, RateDecision> {
        let limiter = self.clone();
        let key = key.to_owned();
        Box::pin(async move { limiter.check(key, limit, window).await })
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::cache::memory::MemoryCacheStore;
    use tokio::time::sleep;

    fn cache() -> Arc<dyn CacheStore> {
        Arc::new(MemoryCacheStore::new())
    }

    #[tokio::test]
    async fn fixed_window_rejects_above_limit() {
        let limiter = FixedWindowLimiter::new(cache());
        let window = Duration::from_secs(30);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.is_allowed("rl:taps:p1", 3, window).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let rejected = limiter.is_allowed("rl:taps:p1", 3, window).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert!(rejected.reset_seconds <= 30);
    }

    #[tokio::test]
    async fn fixed_window_resets_after_expiry() {
        let limiter = FixedWindowLimiter::new(cache());
        let window = Duration::from_millis(40);

        assert!(limiter.is_allowed("rl:x:p1", 1, window).await.allowed);
        assert!(!limiter.is_allowed("rl:x:p1", 1, window).await.allowed);

        sleep(Duration::from_millis(80)).await;
        assert!(limiter.is_allowed("rl:x:p1", 1, window).await.allowed);
    }

    #[tokio::test]
    async fn sliding_window_caps_any_trailing_interval() {
        let limiter = SlidingWindowLimiter::new(cache());
        let window = Duration::from_secs(10);

        for _ in 0..5 {
            assert!(limiter.is_allowed("rlw:taps:p1", 5, window).await.allowed);
        }
        let rejected = limiter.is_allowed("rlw:taps:p1", 5, window).await;
        assert!(!rejected.allowed);
        assert!(rejected.reset_seconds >= 1);
    }

    #[tokio::test]
    async fn sliding_window_admits_again_once_entries_age_out() {
        let limiter = SlidingWindowLimiter::new(cache());
        let window = Duration::from_millis(60);

        assert!(limiter.is_allowed("rlw:y:p1", 2, window).await.allowed);
        assert!(limiter.is_allowed("rlw:y:p1", 2, window).await.allowed);
        assert!(!limiter.is_allowed("rlw:y:p1", 2, window).await.allowed);

        sleep(Duration::from_millis(90)).await;
        assert!(limiter.is_allowed("rlw:y:p1", 2, window).await.allowed);
    }

    #[tokio::test]
    async fn strategies_are_interchangeable_behind_the_trait() {
        let strategies: Vec<Box<dyn RateLimitStrategy>> = vec![
            Box::new(FixedWindowLimiter::new(cache())),
            Box::new(SlidingWindowLimiter::new(cache())),
        ];

        for strategy in strategies {
            let decision = strategy
                .is_allowed("rl:any:p1", 1, Duration::from_secs(5))
                .await;
            assert!(decision.allowed);
        }
    }
}
