use axum::Router;

use crate::{dto::validation::validate_player_id, error::AppError, state::SharedState};

pub mod docs;
pub mod duels;
pub mod health;
pub mod players;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(players::router())
        .merge(duels::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

/// Reject malformed player identities arriving as path parameters.
pub(crate) fn ensure_player_id(id: &str) -> Result<(), AppError> {
    validate_player_id(id).map_err(|_| AppError::BadRequest(format!("invalid player id `{id}`")))
}
