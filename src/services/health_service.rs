use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe both storage tiers and report the overall health status.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let cache_ok = match state.cache().await {
        Some(cache_store) => match cache_store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "cache tier health check failed");
                false
            }
        },
        None => false,
    };

    let durable_ok = match state.durable().await {
        Some(durable) => match durable.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "durable store health check failed");
                false
            }
        },
        None => false,
    };

    let active_lanes = state.queue().active_lanes();
    if state.is_degraded().await {
        HealthResponse::degraded(cache_ok, durable_ok, active_lanes)
    } else {
        HealthResponse::ok(cache_ok, durable_ok, active_lanes)
    }
}
