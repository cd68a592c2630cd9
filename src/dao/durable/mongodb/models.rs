use std::collections::BTreeMap;

use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    BoostState, DuelKind, DuelOutcome, DuelParticipant, DuelRecord, DuelStatus, OfflineAccrual,
    PlayerRecord,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: String,
    balance: i64,
    total_taps: i64,
    last_tap_at: Option<DateTime>,
    cooldown_until: Option<DateTime>,
    streak_days: i32,
    last_streak_at: Option<DateTime>,
    #[serde(default)]
    boosts: BTreeMap<String, MongoBoostDocument>,
    offline: MongoOfflineDocument,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoBoostDocument {
    active: bool,
    expires_at: Option<DateTime>,
    magnitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoOfflineDocument {
    last_settled_at: Option<DateTime>,
    rate_per_hour: f64,
    cap_secs: i64,
}

impl From<PlayerRecord> for MongoPlayerDocument {
    fn from(value: PlayerRecord) -> Self {
        Self {
            id: value.id,
            balance: value.balance as i64,
            total_taps: value.total_taps as i64,
            last_tap_at: value.last_tap_at.map(DateTime::from_system_time),
            cooldown_until: value.cooldown_until.map(DateTime::from_system_time),
            streak_days: value.streak_days as i32,
            last_streak_at: value.last_streak_at.map(DateTime::from_system_time),
            boosts: value
                .boosts
                .into_iter()
                .map(|(id, boost)| {
                    (
                        id,
                        MongoBoostDocument {
                            active: boost.active,
                            expires_at: boost.expires_at.map(DateTime::from_system_time),
                            magnitude: boost.magnitude,
                        },
                    )
                })
                .collect(),
            offline: MongoOfflineDocument {
                last_settled_at: value.offline.last_settled_at.map(DateTime::from_system_time),
                rate_per_hour: value.offline.rate_per_hour,
                cap_secs: value.offline.cap_secs as i64,
            },
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoPlayerDocument> for PlayerRecord {
    fn from(value: MongoPlayerDocument) -> Self {
        Self {
            id: value.id,
            balance: value.balance.max(0) as u64,
            total_taps: value.total_taps.max(0) as u64,
            last_tap_at: value.last_tap_at.map(|at| at.to_system_time()),
            cooldown_until: value.cooldown_until.map(|at| at.to_system_time()),
            streak_days: value.streak_days.max(0) as u32,
            last_streak_at: value.last_streak_at.map(|at| at.to_system_time()),
            boosts: value
                .boosts
                .into_iter()
                .map(|(id, boost)| {
                    (
                        id,
                        BoostState {
                            active: boost.active,
                            expires_at: boost.expires_at.map(|at| at.to_system_time()),
                            magnitude: boost.magnitude,
                        },
                    )
                })
                .collect(),
            offline: OfflineAccrual {
                last_settled_at: value.offline.last_settled_at.map(|at| at.to_system_time()),
                rate_per_hour: value.offline.rate_per_hour,
                cap_secs: value.offline.cap_secs.max(0) as u64,
            },
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDuelDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    kind: DuelKind,
    status: DuelStatus,
    stake: i64,
    participants: Vec<MongoParticipantDocument>,
    created_at: DateTime,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
    winner_id: Option<String>,
    outcome: Option<DuelOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    player_id: String,
    score: Option<i64>,
    is_challenger: bool,
}

impl From<DuelRecord> for MongoDuelDocument {
    fn from(value: DuelRecord) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            status: value.status,
            stake: value.stake as i64,
            participants: value
                .participants
                .into_iter()
                .map(|participant| MongoParticipantDocument {
                    player_id: participant.player_id,
                    score: participant.score.map(|score| score as i64),
                    is_challenger: participant.is_challenger,
                })
                .collect(),
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            winner_id: value.winner_id,
            outcome: value.outcome,
        }
    }
}

impl From<MongoDuelDocument> for DuelRecord {
    fn from(value: MongoDuelDocument) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            status: value.status,
            stake: value.stake.max(0) as u64,
            participants: value
                .participants
                .into_iter()
                .map(|participant| DuelParticipant {
                    player_id: participant.player_id,
                    score: participant.score.map(|score| score.max(0) as u64),
                    is_challenger: participant.is_challenger,
                })
                .collect(),
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(|at| at.to_system_time()),
            ended_at: value.ended_at.map(|at| at.to_system_time()),
            winner_id: value.winner_id,
            outcome: value.outcome,
        }
    }
}

fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
