use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Tap Rush Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::players::get_player,
        crate::routes::players::tap,
        crate::routes::players::claim_offline,
        crate::routes::players::activate_boost,
        crate::routes::players::leaderboard,
        crate::routes::duels::join_queue,
        crate::routes::duels::leave_queue,
        crate::routes::duels::challenge,
        crate::routes::duels::get_duel,
        crate::routes::duels::respond,
        crate::routes::duels::start,
        crate::routes::duels::report_score,
        crate::routes::duels::events,
        crate::routes::duels::stats,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::player::TapRequest,
            crate::dto::player::TapResponse,
            crate::dto::player::PlayerView,
            crate::dto::player::BoostView,
            crate::dto::player::OfflineClaimResponse,
            crate::dto::player::BoostActivationResponse,
            crate::dto::player::LeaderboardRow,
            crate::dto::duel::ChallengeRequest,
            crate::dto::duel::RespondRequest,
            crate::dto::duel::StartRequest,
            crate::dto::duel::ScoreRequest,
            crate::dto::duel::QueueJoinResponse,
            crate::dto::duel::QueueLeaveResponse,
            crate::dto::duel::DuelStatsResponse,
            crate::dto::duel::DuelView,
            crate::dto::duel::ParticipantView,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "players", description = "Player state and tap economy"),
        (name = "duels", description = "Matchmaking and duel lifecycle"),
    )
)]
pub struct ApiDoc;
