use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authoritative per-player game state, shared between the cache and durable tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    /// Stable player identity resolved by the upstream auth layer.
    pub id: String,
    /// Spendable currency balance.
    pub balance: u64,
    /// Lifetime accepted tap count; never decreases outside an explicit reset.
    pub total_taps: u64,
    /// Timestamp of the last accepted tap.
    pub last_tap_at: Option<SystemTime>,
    /// Rewards are rejected until this instant passes.
    pub cooldown_until: Option<SystemTime>,
    /// Consecutive calendar days with at least one accepted tap.
    pub streak_days: u32,
    /// When the streak was last rolled forward.
    pub last_streak_at: Option<SystemTime>,
    /// Purchased power-ups keyed by boost identifier.
    #[serde(default)]
    pub boosts: BTreeMap<String, BoostState>,
    /// Idle-income bookkeeping.
    #[serde(default)]
    pub offline: OfflineAccrual,
    /// Last time this record was written.
    pub updated_at: SystemTime,
}

impl PlayerRecord {
    /// Zero-valued record created on first access for a player.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            balance: 0,
            total_taps: 0,
            last_tap_at: None,
            cooldown_until: None,
            streak_days: 0,
            last_streak_at: None,
            boosts: BTreeMap::new(),
            offline: OfflineAccrual::default(),
            updated_at: SystemTime::UNIX_EPOCH,
        }
    }
}

/// A purchased power-up and its remaining lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoostState {
    /// Whether the boost currently applies to tap rewards.
    pub active: bool,
    /// Instant after which the boost no longer applies.
    pub expires_at: Option<SystemTime>,
    /// Reward multiplier contributed while active.
    pub magnitude: f64,
}

/// Idle-income accrual state for a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineAccrual {
    /// Last instant up to which idle income has been credited.
    pub last_settled_at: Option<SystemTime>,
    /// Currency earned per hour while away.
    pub rate_per_hour: f64,
    /// Accrual stops counting beyond this many seconds away.
    pub cap_secs: u64,
}

impl Default for OfflineAccrual {
    fn default() -> Self {
        Self {
            last_settled_at: None,
            rate_per_hour: 0.0,
            cap_secs: 8 * 3_600,
        }
    }
}

/// The only duel kind currently offered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuelKind {
    /// Two players, one timed contest.
    OneVsOne,
}

/// Lifecycle status of a duel. Transitions are monotonic and validated by
/// [`crate::state::duel_flow`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuelStatus {
    /// Challenge issued, waiting for the opponent's response.
    Pending,
    /// Both participants committed, contest not yet started.
    Waiting,
    /// Contest running against the duel timer.
    InProgress,
    /// Contest settled; see the outcome.
    Completed,
    /// Opponent refused the challenge.
    Declined,
    /// Withdrawn before the contest started.
    Cancelled,
}

/// How a completed duel resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuelOutcome {
    /// One participant scored strictly higher.
    Decided,
    /// Scores were equal; stakes are returned.
    Draw,
    /// Result invalidated by input analysis; stakes are returned.
    Voided,
}

/// One side of a duel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuelParticipant {
    /// Player identity.
    pub player_id: String,
    /// Terminal score, once reported.
    pub score: Option<u64>,
    /// Whether this participant initiated the duel.
    pub is_challenger: bool,
}

impl DuelParticipant {
    /// Participant entry at duel creation, before any score is reported.
    pub fn new(player_id: impl Into<String>, is_challenger: bool) -> Self {
        Self {
            player_id: player_id.into(),
            score: None,
            is_challenger,
        }
    }
}

/// Persisted duel record. Exactly the two participants present at creation
/// may ever appear in `participants`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuelRecord {
    /// Primary key of the duel.
    pub id: Uuid,
    /// Contest kind.
    pub kind: DuelKind,
    /// Current lifecycle status.
    pub status: DuelStatus,
    /// Stake escrowed per participant.
    pub stake: u64,
    /// Ordered pair of participants; the challenger first.
    pub participants: Vec<DuelParticipant>,
    /// Creation timestamp for auditing.
    pub created_at: SystemTime,
    /// Set when the contest enters `in_progress`.
    pub started_at: Option<SystemTime>,
    /// Set at settlement.
    pub ended_at: Option<SystemTime>,
    /// Winning player; set iff completed with a decided outcome.
    pub winner_id: Option<String>,
    /// Resolution detail for completed duels.
    pub outcome: Option<DuelOutcome>,
}

impl DuelRecord {
    /// Create a duel between two players with the given initial status.
    pub fn new(
        challenger: impl Into<String>,
        opponent: impl Into<String>,
        stake: u64,
        status: DuelStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: DuelKind::OneVsOne,
            status,
            stake,
            participants: vec![
                DuelParticipant::new(challenger, true),
                DuelParticipant::new(opponent, false),
            ],
            created_at: SystemTime::now(),
            started_at: None,
            ended_at: None,
            winner_id: None,
            outcome: None,
        }
    }

    /// Look up a participant by player id.
    pub fn participant(&self, player_id: &str) -> Option<&DuelParticipant> {
        self.participants
            .iter()
            .find(|participant| participant.player_id == player_id)
    }

    /// Mutable participant lookup.
    pub fn participant_mut(&mut self, player_id: &str) -> Option<&mut DuelParticipant> {
        self.participants
            .iter_mut()
            .find(|participant| participant.player_id == player_id)
    }

    /// The participant that issued the challenge.
    pub fn challenger(&self) -> &DuelParticipant {
        self.participants
            .iter()
            .find(|participant| participant.is_challenger)
            .unwrap_or(&self.participants[0])
    }

    /// The participant that accepted the challenge.
    pub fn opponent(&self) -> &DuelParticipant {
        self.participants
            .iter()
            .find(|participant| !participant.is_challenger)
            .unwrap_or(&self.participants[1])
    }

    /// Whether both participants reported a terminal score.
    pub fn all_scores_reported(&self) -> bool {
        self.participants
            .iter()
            .all(|participant| participant.score.is_some())
    }
}
