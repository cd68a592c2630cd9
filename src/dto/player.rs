use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::PlayerRecord,
    dto::format_system_time,
    services::economy::{BoostOutcome, LeaderboardEntry, OfflineClaimOutcome, TapOutcome},
};

/// Payload for a tap action. The pointer position is optional; when present
/// it feeds the input analyzer's position checks.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct TapRequest {
    #[serde(default)]
    #[validate(nested)]
    pub position: Option<PositionInput>,
}

/// Pointer position sampled by the client at tap time.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PositionInput {
    #[validate(range(min = 0.0, max = 100_000.0))]
    pub x: f32,
    #[validate(range(min = 0.0, max = 100_000.0))]
    pub y: f32,
}

/// Result of an accepted tap.
#[derive(Debug, Serialize, ToSchema)]
pub struct TapResponse {
    pub reward: u64,
    pub balance: u64,
    pub total_taps: u64,
    pub streak_days: u32,
    pub cooldown_until: String,
}

impl From<TapOutcome> for TapResponse {
    fn from(outcome: TapOutcome) -> Self {
        Self {
            reward: outcome.reward,
            balance: outcome.balance,
            total_taps: outcome.total_taps,
            streak_days: outcome.streak_days,
            cooldown_until: format_system_time(outcome.cooldown_until),
        }
    }
}

/// Public projection of a player's state.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerView {
    pub id: String,
    pub balance: u64,
    pub total_taps: u64,
    pub streak_days: u32,
    pub last_tap_at: Option<String>,
    pub cooldown_until: Option<String>,
    pub boosts: Vec<BoostView>,
    pub updated_at: String,
}

/// One active boost on a player.
#[derive(Debug, Serialize, ToSchema)]
pub struct BoostView {
    pub id: String,
    pub magnitude: f64,
    pub expires_at: Option<String>,
}

impl From<PlayerRecord> for PlayerView {
    fn from(record: PlayerRecord) -> Self {
        Self {
            id: record.id,
            balance: record.balance,
            total_taps: record.total_taps,
            streak_days: record.streak_days,
            last_tap_at: record.last_tap_at.map(format_system_time),
            cooldown_until: record.cooldown_until.map(format_system_time),
            boosts: record
                .boosts
                .into_iter()
                .map(|(id, boost)| BoostView {
                    id,
                    magnitude: boost.magnitude,
                    expires_at: boost.expires_at.map(format_system_time),
                })
                .collect(),
            updated_at: format_system_time(record.updated_at),
        }
    }
}

/// Result of settling idle income.
#[derive(Debug, Serialize, ToSchema)]
pub struct OfflineClaimResponse {
    pub credited: u64,
    pub balance: u64,
}

impl From<OfflineClaimOutcome> for OfflineClaimResponse {
    fn from(outcome: OfflineClaimOutcome) -> Self {
        Self {
            credited: outcome.credited,
            balance: outcome.balance,
        }
    }
}

/// Result of activating a boost.
#[derive(Debug, Serialize, ToSchema)]
pub struct BoostActivationResponse {
    pub balance: u64,
    pub magnitude: f64,
    pub expires_at: String,
}

impl From<BoostOutcome> for BoostActivationResponse {
    fn from(outcome: BoostOutcome) -> Self {
        Self {
            balance: outcome.balance,
            magnitude: outcome.magnitude,
            expires_at: format_system_time(outcome.expires_at),
        }
    }
}

/// One row of the balance leaderboard.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardRow {
    pub player_id: String,
    pub balance: u64,
}

impl From<LeaderboardEntry> for LeaderboardRow {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            player_id: entry.player_id,
            balance: entry.balance,
        }
    }
}
