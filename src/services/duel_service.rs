use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        cache::CacheValue,
        models::{DuelOutcome, DuelRecord, DuelStatus},
    },
    error::ServiceError,
    services::{
        rate_limiter::{FixedWindowLimiter, RateLimitStrategy},
        state_updater,
    },
    state::{QueueEntry, SharedState},
    state::duel_flow::{self, DuelEvent},
};

/// Payout retry schedule once settlement's inline credit attempt failed.
const PAYOUT_RETRY_ATTEMPTS: u32 = 5;
const PAYOUT_RETRY_DELAY: Duration = Duration::from_millis(200);
const PAYOUT_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Per-player duel tally kept in a cache hash, updated at settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuelStats {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
}

/// What happened when a player joined the matchmaking queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueJoinOutcome {
    /// No eligible opponent yet; the player waits in the queue.
    Queued,
    /// An opponent was waiting; both were removed and this duel created.
    Matched(DuelRecord),
}

/// Join the matchmaking queue, escrowing the configured stake.
///
/// If an eligible opponent is already waiting, both entries are removed
/// atomically and a duel is created in `waiting`; otherwise the player is
/// appended in FIFO order.
pub async fn join_queue(
    state: &SharedState,
    player_id: &str,
) -> Result<QueueJoinOutcome, ServiceError> {
    let config = state.config();
    let stake = config.duel.stake;

    // Coarse fixed-window throttle; queue joins are low-frequency enough
    // that boundary bursts are harmless.
    if let Some(cache_store) = state.cache().await {
        let limiter = FixedWindowLimiter::new(cache_store);
        let decision = limiter
            .is_allowed(
                &format!("rl:queue:{player_id}"),
                config.limits.queue_joins_per_window,
                config.limits.queue_join_window,
            )
            .await;
        if !decision.allowed {
            return Err(ServiceError::RateLimited {
                retry_after_seconds: decision.reset_seconds,
            });
        }
    }

    {
        let queue = state.duel_queue().lock().await;
        if queue.contains_key(player_id) {
            return Ok(QueueJoinOutcome::Queued);
        }
    }

    // Stake is deducted at join time; leaving or being evicted refunds it.
    escrow_stake(state, player_id, stake).await?;

    let (opponent, evicted) = {
        let mut queue = state.duel_queue().lock().await;

        let now = SystemTime::now();
        let ttl = config.duel.queue_entry_ttl;
        let evicted: Vec<String> = queue
            .iter()
            .filter(|(_, entry)| {
                now.duration_since(entry.joined_at)
                    .map(|age| age > ttl)
                    .unwrap_or(false)
            })
            .map(|(queued_id, _)| queued_id.clone())
            .collect();
        for stale in &evicted {
            queue.shift_remove(stale);
        }

        if queue.contains_key(player_id) {
            // Lost a race against a concurrent join by the same player.
            (None, evicted)
        } else {
            match queue.keys().find(|queued_id| *queued_id != player_id).cloned() {
                Some(opponent_id) => {
                    queue.shift_remove(&opponent_id);
                    (Some(opponent_id), evicted)
                }
                None => {
                    queue.insert(
                        player_id.to_owned(),
                        QueueEntry {
                            joined_at: SystemTime::now(),
                        },
                    );
                    (None, evicted)
                }
            }
        }
    };

    for stale in evicted {
        info!(player = %stale, "evicting stale matchmaking entry");
        refund_stake(state, &stale, stake, "queue eviction").await;
    }

    let Some(opponent_id) = opponent else {
        return Ok(QueueJoinOutcome::Queued);
    };

    // The longer-waiting player is recorded as the challenger.
    let duel = DuelRecord::new(&opponent_id, player_id, stake, DuelStatus::Waiting);
    match state.require_durable().await {
        Ok(durable) => {
            if let Err(err) = durable.insert_duel(duel.clone()).await {
                refund_stake(state, player_id, stake, "duel creation failure").await;
                refund_stake(state, &opponent_id, stake, "duel creation failure").await;
                return Err(err.into());
            }
        }
        Err(err) => {
            refund_stake(state, player_id, stake, "degraded mode").await;
            refund_stake(state, &opponent_id, stake, "degraded mode").await;
            return Err(err);
        }
    }

    state.duel_hub().publish(duel.clone());
    Ok(QueueJoinOutcome::Matched(duel))
}

/// Leave the matchmaking queue. Returns whether an entry was removed; the
/// escrowed stake is refunded with it.
pub async fn leave_queue(state: &SharedState, player_id: &str) -> Result<bool, ServiceError> {
    let removed = {
        let mut queue = state.duel_queue().lock().await;
        queue.shift_remove(player_id).is_some()
    };

    if removed {
        refund_stake(state, player_id, state.config().duel.stake, "queue leave").await;
    }
    Ok(removed)
}

/// Issue a direct challenge, escrowing the challenger's stake. The duel
/// stays `pending` until the opponent responds.
pub async fn challenge(
    state: &SharedState,
    challenger_id: &str,
    opponent_id: &str,
) -> Result<DuelRecord, ServiceError> {
    if challenger_id == opponent_id {
        return Err(ServiceError::InvalidInput(
            "cannot challenge yourself".into(),
        ));
    }

    let stake = state.config().duel.stake;
    escrow_stake(state, challenger_id, stake).await?;

    let duel = DuelRecord::new(challenger_id, opponent_id, stake, DuelStatus::Pending);
    match state.require_durable().await {
        Ok(durable) => {
            if let Err(err) = durable.insert_duel(duel.clone()).await {
                refund_stake(state, challenger_id, stake, "duel creation failure").await;
                return Err(err.into());
            }
        }
        Err(err) => {
            refund_stake(state, challenger_id, stake, "degraded mode").await;
            return Err(err);
        }
    }

    state.duel_hub().publish(duel.clone());
    Ok(duel)
}

/// Accept or decline a pending challenge. Only the challenged player may
/// respond; accepting escrows their stake, declining refunds the challenger.
pub async fn respond(
    state: &SharedState,
    duel_id: Uuid,
    player_id: &str,
    accept: bool,
) -> Result<DuelRecord, ServiceError> {
    let mut duel = load_duel(state, duel_id).await?;

    let opponent = duel.opponent().clone();
    if opponent.player_id != player_id {
        return Err(ServiceError::InvalidState(
            "only the challenged player may respond".into(),
        ));
    }

    if accept {
        let next = duel_flow::advance(duel.status, DuelEvent::Accept)?;
        escrow_stake(state, player_id, duel.stake).await?;
        duel.status = next;
    } else {
        duel.status = duel_flow::advance(duel.status, DuelEvent::Decline)?;
        let challenger = duel.challenger().player_id.clone();
        refund_stake(state, &challenger, duel.stake, "challenge declined").await;
    }

    persist_duel(state, &duel).await?;
    state.duel_hub().publish(duel.clone());
    Ok(duel)
}

/// Withdraw from a duel that has not started. Every escrowed stake is refunded.
pub async fn cancel(
    state: &SharedState,
    duel_id: Uuid,
    player_id: &str,
) -> Result<DuelRecord, ServiceError> {
    let mut duel = load_duel(state, duel_id).await?;
    if duel.participant(player_id).is_none() {
        return Err(ServiceError::InvalidState(
            "only a participant may cancel".into(),
        ));
    }

    let escrowed_both = duel.status == DuelStatus::Waiting;
    duel.status = duel_flow::advance(duel.status, DuelEvent::Cancel)?;
    duel.ended_at = Some(SystemTime::now());
    persist_duel(state, &duel).await?;

    let challenger = duel.challenger().player_id.clone();
    refund_stake(state, &challenger, duel.stake, "duel cancelled").await;
    if escrowed_both {
        let opponent = duel.opponent().player_id.clone();
        refund_stake(state, &opponent, duel.stake, "duel cancelled").await;
    }

    state.duel_hub().publish(duel.clone());
    Ok(duel)
}

/// Start the contest. Either participant may start a `waiting` duel; the
/// duel timer is armed and forces settlement when it elapses.
pub async fn start(
    state: &SharedState,
    duel_id: Uuid,
    player_id: &str,
) -> Result<DuelRecord, ServiceError> {
    let mut duel = load_duel(state, duel_id).await?;
    if duel.participant(player_id).is_none() {
        return Err(ServiceError::InvalidState(
            "only a participant may start the duel".into(),
        ));
    }

    duel.status = duel_flow::advance(duel.status, DuelEvent::Start)?;
    duel.started_at = Some(SystemTime::now());
    persist_duel(state, &duel).await?;
    state.duel_hub().publish(duel.clone());

    let timer_state = state.clone();
    let duration = state.config().duel.duration;
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        match settle(&timer_state, duel_id).await {
            Ok(_) => info!(duel = %duel_id, "duel settled by timer"),
            // Already settled through score reports; nothing to do.
            Err(ServiceError::InvalidState(_)) => {
                debug!(duel = %duel_id, "duel timer found contest already settled")
            }
            Err(err) => error!(duel = %duel_id, error = %err, "duel timer settlement failed"),
        }
    });

    Ok(duel)
}

/// Record a participant's terminal score. Once both scores are in, the duel
/// settles immediately instead of waiting out the timer.
pub async fn report_score(
    state: &SharedState,
    duel_id: Uuid,
    player_id: &str,
    score: u64,
) -> Result<DuelRecord, ServiceError> {
    let mut duel = load_duel(state, duel_id).await?;
    if duel.status != DuelStatus::InProgress {
        return Err(ServiceError::InvalidState(
            "scores can only be reported while the duel is in progress".into(),
        ));
    }

    match duel.participant_mut(player_id) {
        Some(participant) => participant.score = Some(score),
        None => {
            return Err(ServiceError::InvalidState(
                "only a participant may report a score".into(),
            ));
        }
    }

    persist_duel(state, &duel).await?;
    state.duel_hub().publish(duel.clone());

    if duel.all_scores_reported() {
        return settle(state, duel_id).await;
    }
    Ok(duel)
}

/// Settle an in-progress duel: mark it completed, compute the outcome, and
/// move the stakes.
///
/// The completed status is persisted before any balance moves; it reflects
/// game-timer truth and is never rolled back. A failed payout is retried
/// independently and logged, never silently lost.
pub async fn settle(state: &SharedState, duel_id: Uuid) -> Result<DuelRecord, ServiceError> {
    let mut duel = load_duel(state, duel_id).await?;
    duel.status = duel_flow::advance(duel.status, DuelEvent::Finish)?;
    duel.ended_at = Some(SystemTime::now());

    let analyzer = &state.config().analyzer;
    let compromised = duel.participants.iter().any(|participant| {
        state
            .input_sessions()
            .get(&participant.player_id)
            .map(|session| session.is_compromised(analyzer))
            .unwrap_or(false)
    });

    let challenger = duel.challenger().clone();
    let opponent = duel.opponent().clone();

    if compromised {
        duel.outcome = Some(DuelOutcome::Voided);
        duel.winner_id = None;
        warn!(duel = %duel_id, "duel result invalidated by input analysis");
    } else {
        let challenger_score = challenger.score.unwrap_or(0);
        let opponent_score = opponent.score.unwrap_or(0);
        if challenger_score == opponent_score {
            duel.outcome = Some(DuelOutcome::Draw);
            duel.winner_id = None;
        } else {
            duel.outcome = Some(DuelOutcome::Decided);
            duel.winner_id = Some(if challenger_score > opponent_score {
                challenger.player_id.clone()
            } else {
                opponent.player_id.clone()
            });
        }
    }

    persist_duel(state, &duel).await?;

    match duel.outcome {
        Some(DuelOutcome::Decided) => {
            let winner = duel.winner_id.clone().unwrap_or_default();
            let loser = if winner == challenger.player_id {
                opponent.player_id.clone()
            } else {
                challenger.player_id.clone()
            };
            let payout = state.config().duel.payout();
            credit_or_retry(state, &winner, payout, duel_id).await;
            bump_stat(state, &winner, "wins").await;
            bump_stat(state, &loser, "losses").await;
        }
        // Draws and voided results return each stake to its owner. A voided
        // duel is surfaced exactly like a draw; the analysis detail stays
        // server-side.
        Some(DuelOutcome::Draw) | Some(DuelOutcome::Voided) => {
            credit_or_retry(state, &challenger.player_id, duel.stake, duel_id).await;
            credit_or_retry(state, &opponent.player_id, duel.stake, duel_id).await;
            bump_stat(state, &challenger.player_id, "draws").await;
            bump_stat(state, &opponent.player_id, "draws").await;
        }
        None => {}
    }

    state.duel_hub().publish(duel.clone());
    Ok(duel)
}

/// Fetch a duel row.
pub async fn get_duel(state: &SharedState, duel_id: Uuid) -> Result<DuelRecord, ServiceError> {
    load_duel(state, duel_id).await
}

/// Read a player's duel tally from the cache hash. Zeroed when the cache
/// tier is absent or the player never settled a duel.
pub async fn duel_stats(state: &SharedState, player_id: &str) -> Result<DuelStats, ServiceError> {
    let Some(cache_store) = state.cache().await else {
        return Ok(DuelStats::default());
    };

    let fields = cache_store.hash_get_all(&stats_key(player_id)).await?;
    let mut stats = DuelStats::default();
    for (field, value) in fields {
        let count = value.as_integer().unwrap_or(0).max(0) as u64;
        match field.as_str() {
            "wins" => stats.wins = count,
            "losses" => stats.losses = count,
            "draws" => stats.draws = count,
            _ => {}
        }
    }
    Ok(stats)
}

fn stats_key(player_id: &str) -> String {
    format!("stats:duels:{player_id}")
}

/// Bump one counter of the player's duel tally; cache-side decoration only,
/// logged and dropped on failure.
async fn bump_stat(state: &SharedState, player_id: &str, field: &str) {
    let Some(cache_store) = state.cache().await else {
        return;
    };
    let key = stats_key(player_id);

    let current = match cache_store.hash_get(&key, field).await {
        Ok(value) => value.and_then(|value| value.as_integer()).unwrap_or(0),
        Err(err) => {
            warn!(player = %player_id, field, error = %err, "duel stat read failed");
            return;
        }
    };
    if let Err(err) = cache_store
        .hash_set(&key, field, CacheValue::Json((current + 1).into()))
        .await
    {
        warn!(player = %player_id, field, error = %err, "duel stat update failed");
    }
}

async fn load_duel(state: &SharedState, duel_id: Uuid) -> Result<DuelRecord, ServiceError> {
    let durable = state.require_durable().await?;
    durable
        .find_duel(duel_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("duel `{duel_id}` not found")))
}

async fn persist_duel(state: &SharedState, duel: &DuelRecord) -> Result<(), ServiceError> {
    let durable = state.require_durable().await?;
    durable.update_duel(duel.clone()).await?;
    Ok(())
}

/// Deduct a stake from the player's balance on their own actor lane, so the
/// deduction serializes with the player's live taps.
async fn escrow_stake(
    state: &SharedState,
    player_id: &str,
    stake: u64,
) -> Result<(), ServiceError> {
    let queued_state = state.clone();
    let player = player_id.to_owned();
    state
        .queue()
        .enqueue(player_id, move || async move {
            state_updater::update_player(&queued_state, &player, |mut record| {
                if record.balance < stake {
                    return Err(ServiceError::InvalidState(
                        "balance too low for the duel stake".into(),
                    ));
                }
                record.balance -= stake;
                Ok(record)
            })
            .await
        })
        .await?
        .map(|_| ())
}

/// Return a stake to a player. Runs on the lock-guarded path because
/// refunds are triggered outside the player's own request flow.
async fn refund_stake(state: &SharedState, player_id: &str, stake: u64, context: &str) {
    let credited = state_updater::update_player_locked(state, player_id, |mut record| {
        record.balance += stake;
        Ok(record)
    })
    .await;
    if let Err(err) = credited {
        error!(player = %player_id, stake, context, error = %err, "stake refund failed");
    }
}

/// Credit a settlement amount, falling back to an independent retry task
/// when the inline attempt fails.
async fn credit_or_retry(state: &SharedState, player_id: &str, amount: u64, duel_id: Uuid) {
    let outcome = state_updater::update_player_locked(state, player_id, |mut record| {
        record.balance += amount;
        Ok(record)
    })
    .await;

    if let Err(err) = outcome {
        error!(
            duel = %duel_id,
            player = %player_id,
            amount,
            error = %err,
            "settlement credit failed; retrying in the background"
        );
        spawn_payout_retry(state.clone(), player_id.to_owned(), amount, duel_id);
    }
}

fn spawn_payout_retry(state: SharedState, player_id: String, amount: u64, duel_id: Uuid) {
    tokio::spawn(async move {
        let mut delay = PAYOUT_RETRY_DELAY;
        for attempt in 1..=PAYOUT_RETRY_ATTEMPTS {
            tokio::time::sleep(delay).await;
            let outcome = state_updater::update_player_locked(&state, &player_id, |mut record| {
                record.balance += amount;
                Ok(record)
            })
            .await;
            match outcome {
                Ok(_) => {
                    info!(duel = %duel_id, player = %player_id, amount, attempt, "settlement credit recovered");
                    return;
                }
                Err(err) => {
                    warn!(duel = %duel_id, player = %player_id, attempt, error = %err, "settlement credit retry failed");
                    delay = (delay * 2).min(PAYOUT_RETRY_MAX_DELAY);
                }
            }
        }
        error!(
            duel = %duel_id,
            player = %player_id,
            amount,
            "settlement credit permanently failed; requires operator attention"
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::{
        config::AppConfig,
        dao::{cache::memory::MemoryCacheStore, durable::memory::MemoryDurableStore},
        services::input_analyzer::InputSample,
        state::AppState,
    };

    async fn fixture() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state.install_cache(Arc::new(MemoryCacheStore::new())).await;
        state
            .install_durable(Arc::new(MemoryDurableStore::new()))
            .await;
        state
    }

    async fn seed_balance(state: &SharedState, player_id: &str, balance: u64) {
        state_updater::update_player(state, player_id, |mut record| {
            record.balance = balance;
            Ok(record)
        })
        .await
        .unwrap();
    }

    async fn balance_of(state: &SharedState, player_id: &str) -> u64 {
        state_updater::load_player(state, player_id).await.unwrap().balance
    }

    async fn matched_pair(state: &SharedState) -> DuelRecord {
        seed_balance(state, "a", 1_000).await;
        seed_balance(state, "b", 1_000).await;
        assert_eq!(
            join_queue(state, "a").await.unwrap(),
            QueueJoinOutcome::Queued
        );
        match join_queue(state, "b").await.unwrap() {
            QueueJoinOutcome::Matched(duel) => duel,
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_without_opponent_waits_in_queue() {
        let state = fixture().await;
        seed_balance(&state, "a", 1_000).await;

        let outcome = join_queue(&state, "a").await.unwrap();
        assert_eq!(outcome, QueueJoinOutcome::Queued);

        let queue = state.duel_queue().lock().await;
        assert!(queue.contains_key("a"));
        drop(queue);

        // Stake escrowed at join time.
        assert_eq!(balance_of(&state, "a").await, 750);
    }

    #[tokio::test]
    async fn join_with_waiting_opponent_creates_waiting_duel() {
        let state = fixture().await;
        let duel = matched_pair(&state).await;

        assert_eq!(duel.status, DuelStatus::Waiting);
        assert_eq!(duel.challenger().player_id, "a", "longer wait challenges");
        assert_eq!(duel.opponent().player_id, "b");

        let queue = state.duel_queue().lock().await;
        assert!(queue.is_empty());
        drop(queue);

        assert_eq!(balance_of(&state, "a").await, 750);
        assert_eq!(balance_of(&state, "b").await, 750);
    }

    #[tokio::test]
    async fn join_without_stake_balance_is_rejected() {
        let state = fixture().await;

        let result = join_queue(&state, "broke").await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));

        let queue = state.duel_queue().lock().await;
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn leaving_the_queue_refunds_the_stake() {
        let state = fixture().await;
        seed_balance(&state, "a", 1_000).await;

        join_queue(&state, "a").await.unwrap();
        assert!(leave_queue(&state, "a").await.unwrap());
        assert!(!leave_queue(&state, "a").await.unwrap());

        assert_eq!(balance_of(&state, "a").await, 1_000);
    }

    #[tokio::test]
    async fn stale_queue_entries_are_evicted_and_refunded() {
        let state = fixture().await;
        seed_balance(&state, "stale", 750).await;
        seed_balance(&state, "fresh", 1_000).await;

        {
            let mut queue = state.duel_queue().lock().await;
            queue.insert(
                "stale".into(),
                QueueEntry {
                    joined_at: SystemTime::now()
                        - state.config().duel.queue_entry_ttl
                        - Duration::from_secs(1),
                },
            );
        }

        let outcome = join_queue(&state, "fresh").await.unwrap();
        assert_eq!(outcome, QueueJoinOutcome::Queued, "stale entry cannot match");

        assert_eq!(balance_of(&state, "stale").await, 1_000, "evicted stake refunded");
        let queue = state.duel_queue().lock().await;
        assert!(!queue.contains_key("stale"));
        assert!(queue.contains_key("fresh"));
    }

    #[tokio::test]
    async fn challenge_and_accept_escrow_both_stakes() {
        let state = fixture().await;
        seed_balance(&state, "a", 1_000).await;
        seed_balance(&state, "b", 1_000).await;

        let duel = challenge(&state, "a", "b").await.unwrap();
        assert_eq!(duel.status, DuelStatus::Pending);
        assert_eq!(balance_of(&state, "a").await, 750);
        assert_eq!(balance_of(&state, "b").await, 1_000);

        let duel = respond(&state, duel.id, "b", true).await.unwrap();
        assert_eq!(duel.status, DuelStatus::Waiting);
        assert_eq!(balance_of(&state, "b").await, 750);
    }

    #[tokio::test]
    async fn declining_refunds_the_challenger() {
        let state = fixture().await;
        seed_balance(&state, "a", 1_000).await;
        seed_balance(&state, "b", 1_000).await;

        let duel = challenge(&state, "a", "b").await.unwrap();
        let duel = respond(&state, duel.id, "b", false).await.unwrap();

        assert_eq!(duel.status, DuelStatus::Declined);
        assert_eq!(balance_of(&state, "a").await, 1_000);
        assert_eq!(balance_of(&state, "b").await, 1_000);
    }

    #[tokio::test]
    async fn only_the_challenged_player_may_respond() {
        let state = fixture().await;
        seed_balance(&state, "a", 1_000).await;

        let duel = challenge(&state, "a", "b").await.unwrap();
        let result = respond(&state, duel.id, "a", true).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn full_contest_pays_the_higher_scorer() {
        let state = fixture().await;
        let duel = matched_pair(&state).await;

        let duel = start(&state, duel.id, "a").await.unwrap();
        assert_eq!(duel.status, DuelStatus::InProgress);
        assert!(duel.started_at.is_some());

        let duel = report_score(&state, duel.id, "a", 10).await.unwrap();
        assert_eq!(duel.status, DuelStatus::InProgress, "one score is not terminal");

        let duel = report_score(&state, duel.id, "b", 7).await.unwrap();
        assert_eq!(duel.status, DuelStatus::Completed);
        assert_eq!(duel.outcome, Some(DuelOutcome::Decided));
        assert_eq!(duel.winner_id.as_deref(), Some("a"));
        assert!(duel.ended_at.is_some());

        // 90% of the combined 500 stake goes to the winner, once.
        assert_eq!(balance_of(&state, "a").await, 750 + 450);
        assert_eq!(balance_of(&state, "b").await, 750);

        let winner_stats = duel_stats(&state, "a").await.unwrap();
        assert_eq!(winner_stats, DuelStats { wins: 1, losses: 0, draws: 0 });
        let loser_stats = duel_stats(&state, "b").await.unwrap();
        assert_eq!(loser_stats, DuelStats { wins: 0, losses: 1, draws: 0 });
    }

    #[tokio::test]
    async fn equal_scores_are_an_explicit_draw() {
        let state = fixture().await;
        let duel = matched_pair(&state).await;
        start(&state, duel.id, "a").await.unwrap();

        report_score(&state, duel.id, "a", 5).await.unwrap();
        let duel = report_score(&state, duel.id, "b", 5).await.unwrap();

        assert_eq!(duel.outcome, Some(DuelOutcome::Draw));
        assert!(duel.winner_id.is_none());
        assert_eq!(balance_of(&state, "a").await, 1_000);
        assert_eq!(balance_of(&state, "b").await, 1_000);
        assert_eq!(duel_stats(&state, "a").await.unwrap().draws, 1);
    }

    #[tokio::test]
    async fn compromised_session_voids_even_a_plausible_score() {
        let state = fixture().await;
        let duel = matched_pair(&state).await;
        start(&state, duel.id, "a").await.unwrap();

        // Accumulate warnings past the invalidation threshold.
        {
            let config = state.config().analyzer.clone();
            let mut session = state.input_sessions().entry("a".to_string()).or_default();
            for index in 0..=config.invalidation_warnings as u64 {
                session.observe(
                    InputSample {
                        at_ms: index * 10,
                        position: None,
                    },
                    &config,
                );
            }
            assert!(session.is_compromised(&config));
        }

        report_score(&state, duel.id, "a", 10).await.unwrap();
        let duel = report_score(&state, duel.id, "b", 7).await.unwrap();

        assert_eq!(duel.outcome, Some(DuelOutcome::Voided));
        assert!(duel.winner_id.is_none());
        // Stakes return to their owners; nobody collects a payout.
        assert_eq!(balance_of(&state, "a").await, 1_000);
        assert_eq!(balance_of(&state, "b").await, 1_000);
    }

    #[tokio::test]
    async fn lifecycle_rejects_out_of_order_operations() {
        let state = fixture().await;
        seed_balance(&state, "a", 1_000).await;
        seed_balance(&state, "b", 1_000).await;

        let duel = challenge(&state, "a", "b").await.unwrap();

        // Cannot start a duel the opponent has not accepted.
        let result = start(&state, duel.id, "a").await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));

        // Cannot report scores before the contest starts.
        let result = report_score(&state, duel.id, "a", 3).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn cancel_before_start_refunds_escrowed_stakes() {
        let state = fixture().await;
        let duel = matched_pair(&state).await;

        let duel = cancel(&state, duel.id, "a").await.unwrap();
        assert_eq!(duel.status, DuelStatus::Cancelled);
        assert_eq!(balance_of(&state, "a").await, 1_000);
        assert_eq!(balance_of(&state, "b").await, 1_000);

        // A settled lifecycle admits no further transitions.
        let result = cancel(&state, duel.id, "a").await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn hub_publishes_snapshots_on_every_change() {
        let state = fixture().await;
        let mut snapshots = state.duel_hub().subscribe();

        let duel = matched_pair(&state).await;
        assert_eq!(snapshots.recv().await.unwrap().status, DuelStatus::Waiting);

        start(&state, duel.id, "b").await.unwrap();
        assert_eq!(
            snapshots.recv().await.unwrap().status,
            DuelStatus::InProgress
        );
    }
}
