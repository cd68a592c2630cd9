use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Whether the cache tier answered its ping.
    pub cache_ok: bool,
    /// Whether the durable store answered its ping.
    pub durable_ok: bool,
    /// Actors with a live action lane right now.
    pub active_lanes: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(cache_ok: bool, durable_ok: bool, active_lanes: usize) -> Self {
        Self {
            status: "ok".to_string(),
            cache_ok,
            durable_ok,
            active_lanes,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(cache_ok: bool, durable_ok: bool, active_lanes: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            cache_ok,
            durable_ok,
            active_lanes,
        }
    }
}
