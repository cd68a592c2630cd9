use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::player::{
        BoostActivationResponse, LeaderboardRow, OfflineClaimResponse, PlayerView, TapRequest,
        TapResponse,
    },
    error::AppError,
    routes::ensure_player_id,
    services::economy,
    state::SharedState,
};

/// Rows returned by the leaderboard route.
const LEADERBOARD_LIMIT: usize = 25;

/// Routes serving player state and the tap economy.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/players/{id}", get(get_player))
        .route("/players/{id}/taps", post(tap))
        .route("/players/{id}/offline-claim", post(claim_offline))
        .route("/players/{id}/boosts/{boost_id}", post(activate_boost))
        .route("/leaderboard", get(leaderboard))
}

/// Read a player's current state.
#[utoipa::path(
    get,
    path = "/players/{id}",
    tag = "players",
    params(("id" = String, Path, description = "Player identity")),
    responses(
        (status = 200, description = "Current player state", body = PlayerView)
    )
)]
pub async fn get_player(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PlayerView>, AppError> {
    ensure_player_id(&id)?;
    let record = economy::get_player(&state, &id).await?;
    Ok(Json(record.into()))
}

/// Submit one tap action.
#[utoipa::path(
    post,
    path = "/players/{id}/taps",
    tag = "players",
    params(("id" = String, Path, description = "Player identity")),
    request_body = TapRequest,
    responses(
        (status = 200, description = "Tap accepted", body = TapResponse),
        (status = 422, description = "Tap rejected"),
        (status = 429, description = "Rate limited or cooling down")
    )
)]
pub async fn tap(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<TapRequest>,
) -> Result<Json<TapResponse>, AppError> {
    ensure_player_id(&id)?;
    payload.validate()?;

    let position = payload.position.map(|position| (position.x, position.y));
    let outcome = economy::perform_tap(&state, &id, position).await?;
    Ok(Json(outcome.into()))
}

/// Settle idle income accrued while the player was away.
#[utoipa::path(
    post,
    path = "/players/{id}/offline-claim",
    tag = "players",
    params(("id" = String, Path, description = "Player identity")),
    responses(
        (status = 200, description = "Idle income settled", body = OfflineClaimResponse)
    )
)]
pub async fn claim_offline(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<OfflineClaimResponse>, AppError> {
    ensure_player_id(&id)?;
    let outcome = economy::claim_offline(&state, &id).await?;
    Ok(Json(outcome.into()))
}

/// Purchase and activate a boost from the catalog.
#[utoipa::path(
    post,
    path = "/players/{id}/boosts/{boost_id}",
    tag = "players",
    params(
        ("id" = String, Path, description = "Player identity"),
        ("boost_id" = String, Path, description = "Catalog identifier of the boost")
    ),
    responses(
        (status = 200, description = "Boost activated", body = BoostActivationResponse)
    )
)]
pub async fn activate_boost(
    State(state): State<SharedState>,
    Path((id, boost_id)): Path<(String, String)>,
) -> Result<Json<BoostActivationResponse>, AppError> {
    ensure_player_id(&id)?;
    let outcome = economy::activate_boost(&state, &id, &boost_id).await?;
    Ok(Json(outcome.into()))
}

/// Top balances.
#[utoipa::path(
    get,
    path = "/leaderboard",
    tag = "players",
    responses(
        (status = 200, description = "Highest balances first", body = [LeaderboardRow])
    )
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
) -> Result<Json<Vec<LeaderboardRow>>, AppError> {
    let rows = economy::leaderboard(&state, LEADERBOARD_LIMIT).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
