use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{DuelKind, DuelOutcome, DuelRecord, DuelStatus},
    dto::{format_system_time, validation::validate_player_id},
    services::duel_service::QueueJoinOutcome,
};

fn validate_id_field(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
) {
    if let Err(err) = validate_player_id(value) {
        errors.add(field, err);
    }
}

fn collect(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Payload issuing a direct challenge.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    /// Identity of the challenging player.
    pub challenger_id: String,
    /// Identity of the challenged player.
    pub opponent_id: String,
}

impl Validate for ChallengeRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validate_id_field(&mut errors, "challenger_id", &self.challenger_id);
        validate_id_field(&mut errors, "opponent_id", &self.opponent_id);
        collect(errors)
    }
}

/// Payload accepting or declining a pending challenge.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondRequest {
    pub player_id: String,
    pub accept: bool,
}

impl Validate for RespondRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validate_id_field(&mut errors, "player_id", &self.player_id);
        collect(errors)
    }
}

/// Payload starting a waiting duel.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRequest {
    pub player_id: String,
}

impl Validate for StartRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validate_id_field(&mut errors, "player_id", &self.player_id);
        collect(errors)
    }
}

/// Payload reporting a terminal score.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScoreRequest {
    pub player_id: String,
    pub score: u64,
}

impl Validate for ScoreRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        validate_id_field(&mut errors, "player_id", &self.player_id);
        collect(errors)
    }
}

/// Outcome of a queue join request.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueJoinResponse {
    /// Either "queued" or "matched".
    pub status: String,
    /// The created duel when an opponent was already waiting.
    pub duel: Option<DuelView>,
}

impl From<QueueJoinOutcome> for QueueJoinResponse {
    fn from(outcome: QueueJoinOutcome) -> Self {
        match outcome {
            QueueJoinOutcome::Queued => Self {
                status: "queued".into(),
                duel: None,
            },
            QueueJoinOutcome::Matched(duel) => Self {
                status: "matched".into(),
                duel: Some(duel.into()),
            },
        }
    }
}

/// Outcome of a queue leave request.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueLeaveResponse {
    pub removed: bool,
}

/// Settled-duel tally for one player.
#[derive(Debug, Serialize, ToSchema)]
pub struct DuelStatsResponse {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
}

impl From<crate::services::duel_service::DuelStats> for DuelStatsResponse {
    fn from(stats: crate::services::duel_service::DuelStats) -> Self {
        Self {
            wins: stats.wins,
            losses: stats.losses,
            draws: stats.draws,
        }
    }
}

/// Public projection of a duel.
#[derive(Debug, Serialize, ToSchema)]
pub struct DuelView {
    pub id: Uuid,
    pub kind: String,
    pub status: String,
    pub stake: u64,
    pub participants: Vec<ParticipantView>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub winner_id: Option<String>,
    pub outcome: Option<String>,
}

/// One side of a duel as exposed to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantView {
    pub player_id: String,
    pub score: Option<u64>,
    pub is_challenger: bool,
}

impl From<DuelRecord> for DuelView {
    fn from(record: DuelRecord) -> Self {
        Self {
            id: record.id,
            kind: kind_label(record.kind).into(),
            status: status_label(record.status).into(),
            stake: record.stake,
            participants: record
                .participants
                .into_iter()
                .map(|participant| ParticipantView {
                    player_id: participant.player_id,
                    score: participant.score,
                    is_challenger: participant.is_challenger,
                })
                .collect(),
            created_at: format_system_time(record.created_at),
            started_at: record.started_at.map(format_system_time),
            ended_at: record.ended_at.map(format_system_time),
            winner_id: record.winner_id,
            outcome: record.outcome.map(|outcome| outcome_label(outcome).into()),
        }
    }
}

fn kind_label(kind: DuelKind) -> &'static str {
    match kind {
        DuelKind::OneVsOne => "one_vs_one",
    }
}

fn status_label(status: DuelStatus) -> &'static str {
    match status {
        DuelStatus::Pending => "pending",
        DuelStatus::Waiting => "waiting",
        DuelStatus::InProgress => "in_progress",
        DuelStatus::Completed => "completed",
        DuelStatus::Declined => "declined",
        DuelStatus::Cancelled => "cancelled",
    }
}

fn outcome_label(outcome: DuelOutcome) -> &'static str {
    match outcome {
        DuelOutcome::Decided => "decided",
        DuelOutcome::Draw => "draw",
        DuelOutcome::Voided => "voided",
    }
}
