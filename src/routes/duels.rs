use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::{delete, get, post},
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::duel::{
        ChallengeRequest, DuelStatsResponse, DuelView, QueueJoinResponse, QueueLeaveResponse,
        RespondRequest, ScoreRequest, StartRequest,
    },
    error::AppError,
    routes::ensure_player_id,
    services::{duel_events, duel_service},
    state::SharedState,
};

/// Routes covering matchmaking and the duel lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/duels/queue/{player_id}", post(join_queue))
        .route("/duels/queue/{player_id}", delete(leave_queue))
        .route("/duels/challenges", post(challenge))
        .route("/duels/{id}", get(get_duel))
        .route("/duels/{id}/respond", post(respond))
        .route("/duels/{id}/start", post(start))
        .route("/duels/{id}/scores", post(report_score))
        .route("/duels/{id}/events", get(events))
        .route("/duels/stats/{player_id}", get(stats))
}

/// Join the matchmaking queue, possibly forming a duel immediately.
#[utoipa::path(
    post,
    path = "/duels/queue/{player_id}",
    tag = "duels",
    params(("player_id" = String, Path, description = "Player identity")),
    responses(
        (status = 200, description = "Queued or matched", body = QueueJoinResponse),
        (status = 429, description = "Join throttled")
    )
)]
pub async fn join_queue(
    State(state): State<SharedState>,
    Path(player_id): Path<String>,
) -> Result<Json<QueueJoinResponse>, AppError> {
    ensure_player_id(&player_id)?;
    let outcome = duel_service::join_queue(&state, &player_id).await?;
    Ok(Json(outcome.into()))
}

/// Leave the matchmaking queue.
#[utoipa::path(
    delete,
    path = "/duels/queue/{player_id}",
    tag = "duels",
    params(("player_id" = String, Path, description = "Player identity")),
    responses(
        (status = 200, description = "Queue membership after the call", body = QueueLeaveResponse)
    )
)]
pub async fn leave_queue(
    State(state): State<SharedState>,
    Path(player_id): Path<String>,
) -> Result<Json<QueueLeaveResponse>, AppError> {
    ensure_player_id(&player_id)?;
    let removed = duel_service::leave_queue(&state, &player_id).await?;
    Ok(Json(QueueLeaveResponse { removed }))
}

/// Issue a direct challenge to another player.
#[utoipa::path(
    post,
    path = "/duels/challenges",
    tag = "duels",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge created", body = DuelView)
    )
)]
pub async fn challenge(
    State(state): State<SharedState>,
    Json(payload): Json<ChallengeRequest>,
) -> Result<Json<DuelView>, AppError> {
    payload.validate()?;
    let duel =
        duel_service::challenge(&state, &payload.challenger_id, &payload.opponent_id).await?;
    Ok(Json(duel.into()))
}

/// Fetch one duel.
#[utoipa::path(
    get,
    path = "/duels/{id}",
    tag = "duels",
    params(("id" = Uuid, Path, description = "Duel identifier")),
    responses(
        (status = 200, description = "Duel state", body = DuelView),
        (status = 404, description = "Unknown duel")
    )
)]
pub async fn get_duel(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DuelView>, AppError> {
    let duel = duel_service::get_duel(&state, id).await?;
    Ok(Json(duel.into()))
}

/// Accept or decline a pending challenge.
#[utoipa::path(
    post,
    path = "/duels/{id}/respond",
    tag = "duels",
    params(("id" = Uuid, Path, description = "Duel identifier")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Updated duel", body = DuelView)
    )
)]
pub async fn respond(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<DuelView>, AppError> {
    payload.validate()?;
    let duel = duel_service::respond(&state, id, &payload.player_id, payload.accept).await?;
    Ok(Json(duel.into()))
}

/// Start a waiting duel, arming the contest timer.
#[utoipa::path(
    post,
    path = "/duels/{id}/start",
    tag = "duels",
    params(("id" = Uuid, Path, description = "Duel identifier")),
    request_body = StartRequest,
    responses(
        (status = 200, description = "Duel started", body = DuelView)
    )
)]
pub async fn start(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<DuelView>, AppError> {
    payload.validate()?;
    let duel = duel_service::start(&state, id, &payload.player_id).await?;
    Ok(Json(duel.into()))
}

/// Report a participant's terminal score.
#[utoipa::path(
    post,
    path = "/duels/{id}/scores",
    tag = "duels",
    params(("id" = Uuid, Path, description = "Duel identifier")),
    request_body = ScoreRequest,
    responses(
        (status = 200, description = "Updated (possibly settled) duel", body = DuelView)
    )
)]
pub async fn report_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScoreRequest>,
) -> Result<Json<DuelView>, AppError> {
    payload.validate()?;
    let duel =
        duel_service::report_score(&state, id, &payload.player_id, payload.score).await?;
    Ok(Json(duel.into()))
}

/// Read a player's settled-duel tally.
#[utoipa::path(
    get,
    path = "/duels/stats/{player_id}",
    tag = "duels",
    params(("player_id" = String, Path, description = "Player identity")),
    responses(
        (status = 200, description = "Win/loss/draw counts", body = DuelStatsResponse)
    )
)]
pub async fn stats(
    State(state): State<SharedState>,
    Path(player_id): Path<String>,
) -> Result<Json<DuelStatsResponse>, AppError> {
    ensure_player_id(&player_id)?;
    let stats = duel_service::duel_stats(&state, &player_id).await?;
    Ok(Json(stats.into()))
}

/// Stream snapshots of one duel as server-sent events.
#[utoipa::path(
    get,
    path = "/duels/{id}/events",
    tag = "duels",
    params(("id" = Uuid, Path, description = "Duel identifier")),
    responses(
        (status = 200, description = "Duel snapshot stream", content_type = "text/event-stream", body = String)
    )
)]
pub async fn events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = duel_events::subscribe(&state);
    info!(duel = %id, "new duel SSE connection");
    duel_events::to_sse_stream(receiver, id)
}
