use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::{
    dao::models::{BoostState, PlayerRecord},
    error::ServiceError,
    services::{
        input_analyzer::{FlagSeverity, InputSample},
        rate_limiter::{RateLimitStrategy, SlidingWindowLimiter},
        state_updater,
    },
    state::SharedState,
};

/// Sorted-set key ranking players by balance.
const LEADERBOARD_KEY: &str = "leaderboard:balance";
/// Leaderboard reads are clamped to this many rows.
const LEADERBOARD_MAX: usize = 100;

/// Result of one accepted tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapOutcome {
    /// Currency granted by this tap, multipliers applied.
    pub reward: u64,
    /// Balance after the tap.
    pub balance: u64,
    /// Lifetime accepted taps.
    pub total_taps: u64,
    /// Streak length after the daily roll.
    pub streak_days: u32,
    /// When the next tap becomes reward-bearing.
    pub cooldown_until: SystemTime,
}

/// Result of settling idle income.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfflineClaimOutcome {
    /// Currency credited by this claim.
    pub credited: u64,
    /// Balance after the claim.
    pub balance: u64,
}

/// Result of activating a boost.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostOutcome {
    /// Balance after the purchase.
    pub balance: u64,
    /// Reward multiplier now active.
    pub magnitude: f64,
    /// When the boost lapses.
    pub expires_at: SystemTime,
}

/// One row of the balance leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub player_id: String,
    pub balance: u64,
}

/// Handle a tap action end to end: serialize it on the player's lane, gate
/// it through input analysis and the rate limiter, then apply the reward
/// inside the optimistic updater.
pub async fn perform_tap(
    state: &SharedState,
    player_id: &str,
    position: Option<(f32, f32)>,
) -> Result<TapOutcome, ServiceError> {
    let queued_state = state.clone();
    let player = player_id.to_owned();
    state
        .queue()
        .enqueue(player_id, move || async move {
            tap_at(&queued_state, &player, position, SystemTime::now()).await
        })
        .await?
}

/// The tap pipeline at a fixed instant. Split from [`perform_tap`] so tests
/// control the clock; production callers always pass `SystemTime::now()`.
pub async fn tap_at(
    state: &SharedState,
    player_id: &str,
    position: Option<(f32, f32)>,
    now: SystemTime,
) -> Result<TapOutcome, ServiceError> {
    let config = state.config();

    // Gate 1: in-session input analysis. Every flagged action is rejected;
    // only the report volume is rate limited.
    let flag = {
        let mut session = state.input_sessions().entry(player_id.to_owned()).or_default();
        session.observe(
            InputSample {
                at_ms: unix_millis(now),
                position,
            },
            &config.analyzer,
        )
    };
    if let Some(flag) = flag {
        if flag.should_report {
            match flag.severity {
                FlagSeverity::Warning => {
                    info!(player = %player_id, reason = ?flag.reason, "input flagged")
                }
                FlagSeverity::Moderate => {
                    warn!(player = %player_id, reason = ?flag.reason, "input flagged")
                }
                FlagSeverity::Severe => {
                    error!(player = %player_id, reason = ?flag.reason, "input flagged")
                }
            }
        }
        return Err(ServiceError::ValidationFailed);
    }

    // Gate 2: sliding-window throttle, the authoritative limiter for taps.
    if let Some(cache_store) = state.cache().await {
        let limiter = SlidingWindowLimiter::new(cache_store);
        let decision = limiter
            .is_allowed(
                &format!("rlw:taps:{player_id}"),
                config.limits.taps_per_window,
                config.limits.tap_window,
            )
            .await;
        if !decision.allowed {
            return Err(ServiceError::RateLimited {
                retry_after_seconds: decision.reset_seconds,
            });
        }
    }

    let economy = config.economy.clone();
    let mut reward = 0u64;
    let record = state_updater::update_player(state, player_id, |mut record| {
        if let Some(until) = record.cooldown_until
            && until > now
        {
            let remaining = until.duration_since(now).unwrap_or_default();
            return Err(ServiceError::CooldownActive {
                remaining_ms: remaining.as_millis() as u64,
            });
        }

        sweep_expired_boosts(&mut record, now);
        roll_streak(&mut record, now);

        let multiplier =
            economy.streak_multiplier(record.streak_days) * boost_multiplier(&record);
        reward = (economy.base_reward as f64 * multiplier).round() as u64;

        record.balance += reward;
        record.total_taps += 1;
        record.last_tap_at = Some(now);
        record.cooldown_until = Some(now + economy.tap_cooldown);
        Ok(record)
    })
    .await?;

    update_leaderboard(state, player_id, record.balance).await;

    Ok(TapOutcome {
        reward,
        balance: record.balance,
        total_taps: record.total_taps,
        streak_days: record.streak_days,
        cooldown_until: record
            .cooldown_until
            .unwrap_or(now + config.economy.tap_cooldown),
    })
}

/// Settle idle income accrued since the last claim.
pub async fn claim_offline(
    state: &SharedState,
    player_id: &str,
) -> Result<OfflineClaimOutcome, ServiceError> {
    let queued_state = state.clone();
    let player = player_id.to_owned();
    state
        .queue()
        .enqueue(player_id, move || async move {
            claim_offline_at(&queued_state, &player, SystemTime::now()).await
        })
        .await?
}

/// Idle-income settlement at a fixed instant.
pub async fn claim_offline_at(
    state: &SharedState,
    player_id: &str,
    now: SystemTime,
) -> Result<OfflineClaimOutcome, ServiceError> {
    let economy = state.config().economy.clone();
    let mut credited = 0u64;
    let record = state_updater::update_player(state, player_id, |mut record| {
        if record.offline.rate_per_hour <= 0.0 {
            record.offline.rate_per_hour = economy.offline_rate_per_hour;
        }
        if record.offline.cap_secs == 0 {
            record.offline.cap_secs = economy.offline_cap.as_secs();
        }

        credited = match record.offline.last_settled_at {
            Some(last) => {
                let away = now
                    .duration_since(last)
                    .unwrap_or_default()
                    .as_secs()
                    .min(record.offline.cap_secs);
                (record.offline.rate_per_hour * away as f64 / 3_600.0).floor() as u64
            }
            // First claim only starts the accrual clock.
            None => 0,
        };

        record.balance += credited;
        record.offline.last_settled_at = Some(now);
        Ok(record)
    })
    .await?;

    update_leaderboard(state, player_id, record.balance).await;

    Ok(OfflineClaimOutcome {
        credited,
        balance: record.balance,
    })
}

/// Purchase and activate a boost from the catalog.
pub async fn activate_boost(
    state: &SharedState,
    player_id: &str,
    boost_id: &str,
) -> Result<BoostOutcome, ServiceError> {
    let queued_state = state.clone();
    let player = player_id.to_owned();
    let boost = boost_id.to_owned();
    state
        .queue()
        .enqueue(player_id, move || async move {
            activate_boost_at(&queued_state, &player, &boost, SystemTime::now()).await
        })
        .await?
}

/// Boost purchase at a fixed instant.
pub async fn activate_boost_at(
    state: &SharedState,
    player_id: &str,
    boost_id: &str,
    now: SystemTime,
) -> Result<BoostOutcome, ServiceError> {
    let Some(definition) = state.config().economy.boost(boost_id).cloned() else {
        return Err(ServiceError::NotFound(format!(
            "boost `{boost_id}` is not in the catalog"
        )));
    };

    let expires_at = now + Duration::from_secs(definition.duration_secs);
    let record = state_updater::update_player(state, player_id, |mut record| {
        sweep_expired_boosts(&mut record, now);

        if record.boosts.contains_key(&definition.id) {
            return Err(ServiceError::InvalidState(format!(
                "boost `{}` is already active",
                definition.id
            )));
        }
        if record.balance < definition.cost {
            return Err(ServiceError::InvalidState(format!(
                "balance too low for boost `{}`",
                definition.id
            )));
        }

        record.balance -= definition.cost;
        record.boosts.insert(
            definition.id.clone(),
            BoostState {
                active: true,
                expires_at: Some(expires_at),
                magnitude: definition.magnitude,
            },
        );
        Ok(record)
    })
    .await?;

    update_leaderboard(state, player_id, record.balance).await;

    Ok(BoostOutcome {
        balance: record.balance,
        magnitude: definition.magnitude,
        expires_at,
    })
}

/// Read a player's current state without creating a durable record.
pub async fn get_player(
    state: &SharedState,
    player_id: &str,
) -> Result<PlayerRecord, ServiceError> {
    state_updater::load_player(state, player_id).await
}

/// Top balances, straight from the cache sorted set.
pub async fn leaderboard(
    state: &SharedState,
    limit: usize,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let Some(cache_store) = state.cache().await else {
        return Ok(Vec::new());
    };

    let rows = cache_store
        .sorted_range_desc(LEADERBOARD_KEY, limit.min(LEADERBOARD_MAX))
        .await?;
    Ok(rows
        .into_iter()
        .map(|(player_id, balance)| LeaderboardEntry {
            player_id,
            balance: balance as u64,
        })
        .collect())
}

/// Rank the player's balance on the leaderboard; logged-and-dropped on cache
/// failure like every other cache-side decoration.
async fn update_leaderboard(state: &SharedState, player_id: &str, balance: u64) {
    let Some(cache_store) = state.cache().await else {
        return;
    };
    if let Err(err) = cache_store
        .sorted_insert(LEADERBOARD_KEY, balance as f64, player_id)
        .await
    {
        warn!(player = %player_id, error = %err, "leaderboard update failed");
    }
}

/// Deactivate and drop boosts whose lifetime lapsed.
fn sweep_expired_boosts(record: &mut PlayerRecord, now: SystemTime) {
    record
        .boosts
        .retain(|_, boost| boost.active && boost.expires_at.is_none_or(|at| at > now));
}

/// Multiplier contributed by the currently active boosts.
fn boost_multiplier(record: &PlayerRecord) -> f64 {
    record
        .boosts
        .values()
        .filter(|boost| boost.active)
        .map(|boost| boost.magnitude)
        .product::<f64>()
        .max(1.0)
}

/// First accepted tap of a new calendar day rolls the streak forward;
/// a missed day resets it to one.
fn roll_streak(record: &mut PlayerRecord, now: SystemTime) {
    let today = calendar_date(now);
    match record.last_streak_at.map(calendar_date) {
        Some(last) if last == today => {}
        Some(last) if last.next_day() == Some(today) => {
            record.streak_days += 1;
            record.last_streak_at = Some(now);
        }
        _ => {
            record.streak_days = 1;
            record.last_streak_at = Some(now);
        }
    }
}

fn calendar_date(at: SystemTime) -> time::Date {
    time::OffsetDateTime::from(at).date()
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::{
        config::AppConfig,
        dao::{cache::memory::MemoryCacheStore, durable::memory::MemoryDurableStore},
        state::{AppState, SharedState},
    };

    async fn fixture_with(config: AppConfig) -> SharedState {
        let state = AppState::new(config);
        state.install_cache(Arc::new(MemoryCacheStore::new())).await;
        state
            .install_durable(Arc::new(MemoryDurableStore::new()))
            .await;
        state
    }

    async fn fixture() -> SharedState {
        fixture_with(AppConfig::default()).await
    }

    /// Seed a record through the updater so both tiers hold it.
    async fn seed(state: &SharedState, player_id: &str, edit: impl Fn(&mut PlayerRecord)) {
        state_updater::update_player(state, player_id, |mut record| {
            edit(&mut record);
            Ok(record)
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn tap_with_streak_multiplier_credits_one_hundred_fifty() {
        let state = fixture().await;
        let now = SystemTime::now();

        // Five streak days at the default 0.1 step give the 1.5x multiplier.
        seed(&state, "p1", |record| {
            record.streak_days = 5;
            record.last_streak_at = Some(now);
        })
        .await;

        let outcome = tap_at(&state, "p1", None, now).await.unwrap();
        assert_eq!(outcome.reward, 150);
        assert_eq!(outcome.balance, 150);
        assert_eq!(outcome.total_taps, 1);
        assert_eq!(outcome.streak_days, 5);
        assert_eq!(
            outcome.cooldown_until,
            now + state.config().economy.tap_cooldown
        );
    }

    #[tokio::test]
    async fn tap_inside_cooldown_is_soft_rejected() {
        let state = fixture().await;
        let now = SystemTime::now();

        tap_at(&state, "p1", None, now).await.unwrap();
        let second = tap_at(&state, "p1", None, now + Duration::from_millis(200)).await;

        assert!(matches!(second, Err(ServiceError::CooldownActive { .. })));
        let record = get_player(&state, "p1").await.unwrap();
        assert_eq!(record.total_taps, 1, "rejected tap must not count");
    }

    #[tokio::test]
    async fn scripted_intervals_are_rejected_with_balance_unchanged() {
        let state = fixture().await;
        let start = SystemTime::now();

        let first = tap_at(&state, "p1", None, start).await;
        assert!(first.is_ok());
        let balance_after_first = first.unwrap().balance;

        // 20ms cadence is under the interval floor; every attempt is flagged.
        for step in 1..6u64 {
            let result =
                tap_at(&state, "p1", None, start + Duration::from_millis(step * 20)).await;
            assert!(matches!(result, Err(ServiceError::ValidationFailed)));
        }

        let record = get_player(&state, "p1").await.unwrap();
        assert_eq!(record.balance, balance_after_first);
    }

    #[tokio::test]
    async fn streak_rolls_forward_and_resets() {
        let state = fixture().await;
        let now = SystemTime::now();
        let day = Duration::from_secs(24 * 3_600);

        seed(&state, "p1", |record| {
            record.streak_days = 3;
            record.last_streak_at = Some(now - day);
        })
        .await;
        let outcome = tap_at(&state, "p1", None, now).await.unwrap();
        assert_eq!(outcome.streak_days, 4, "consecutive day extends the streak");

        seed(&state, "p2", |record| {
            record.streak_days = 9;
            record.last_streak_at = Some(now - day * 3);
        })
        .await;
        let outcome = tap_at(&state, "p2", None, now).await.unwrap();
        assert_eq!(outcome.streak_days, 1, "missed days reset the streak");
    }

    #[tokio::test]
    async fn offline_claim_credits_elapsed_time_up_to_cap() {
        let state = fixture().await;
        let now = SystemTime::now();

        seed(&state, "p1", |record| {
            record.offline.last_settled_at = Some(now - Duration::from_secs(2 * 3_600));
            record.offline.rate_per_hour = 120.0;
        })
        .await;
        let claim = claim_offline_at(&state, "p1", now).await.unwrap();
        assert_eq!(claim.credited, 240);

        seed(&state, "p2", |record| {
            record.offline.last_settled_at = Some(now - Duration::from_secs(20 * 3_600));
            record.offline.rate_per_hour = 120.0;
        })
        .await;
        let claim = claim_offline_at(&state, "p2", now).await.unwrap();
        assert_eq!(claim.credited, 960, "capped at eight hours away");
    }

    #[tokio::test]
    async fn first_offline_claim_only_starts_the_clock() {
        let state = fixture().await;
        let claim = claim_offline_at(&state, "p1", SystemTime::now()).await.unwrap();
        assert_eq!(claim.credited, 0);

        let record = get_player(&state, "p1").await.unwrap();
        assert!(record.offline.last_settled_at.is_some());
    }

    #[tokio::test]
    async fn boost_purchase_applies_to_rewards_until_expiry() {
        let mut config = AppConfig::default();
        // Pin the streak multiplier to 1.0 so only the boost moves rewards.
        config.economy.streak_step = 0.0;
        let state = fixture_with(config).await;
        let now = SystemTime::now();

        seed(&state, "p1", |record| {
            record.balance = 1_000;
        })
        .await;

        let boost = activate_boost_at(&state, "p1", "double_tap", now).await.unwrap();
        assert_eq!(boost.balance, 500);
        assert_eq!(boost.magnitude, 2.0);

        let outcome = tap_at(&state, "p1", None, now).await.unwrap();
        assert_eq!(outcome.reward, 200, "base 100 doubled by the boost");

        // Once expired the boost is swept and the multiplier is gone.
        let after_expiry = now + Duration::from_secs(31 * 60) + Duration::from_secs(3_600);
        let outcome = tap_at(&state, "p1", None, after_expiry).await.unwrap();
        assert_eq!(outcome.reward, 100);
        let record = get_player(&state, "p1").await.unwrap();
        assert!(record.boosts.is_empty());
    }

    #[tokio::test]
    async fn unknown_boost_is_not_found() {
        let state = fixture().await;
        let result = activate_boost_at(&state, "p1", "mystery", SystemTime::now()).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_taps_from_one_player_sum_exactly() {
        let mut config = AppConfig::default();
        // Relax the gates so every concurrent tap is accepted; the queue and
        // updater alone must keep the arithmetic exact.
        config.economy.tap_cooldown = Duration::from_millis(0);
        config.analyzer.min_interval_ms = 0;
        config.analyzer.max_taps_per_second = 10_000;
        config.analyzer.min_interval_cv = 0.0;
        let state = fixture_with(config).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let state = state.clone();
            handles.push(tokio::spawn(
                async move { perform_tap(&state, "p1", None).await },
            ));
        }

        let mut total_rewards = 0u64;
        for handle in handles {
            total_rewards += handle.await.unwrap().unwrap().reward;
        }

        let record = get_player(&state, "p1").await.unwrap();
        assert_eq!(record.balance, total_rewards, "no update may be lost");
        assert_eq!(record.total_taps, 10);
    }

    #[tokio::test]
    async fn leaderboard_ranks_by_balance() {
        let state = fixture().await;
        let now = SystemTime::now();

        seed(&state, "rich", |record| record.balance = 10).await;
        seed(&state, "richer", |record| record.balance = 20).await;
        tap_at(&state, "rich", None, now).await.unwrap();
        tap_at(&state, "richer", None, now).await.unwrap();

        let rows = leaderboard(&state, 10).await.unwrap();
        assert_eq!(rows[0].player_id, "richer");
        assert_eq!(rows[1].player_id, "rich");
    }
}
