/// Per-actor FIFO serializing mutating player actions.
pub mod action_queue;
/// OpenAPI documentation generation.
pub mod documentation;
/// Duel snapshot streaming over SSE.
pub mod duel_events;
/// Matchmaking queue and duel lifecycle management.
pub mod duel_service;
/// Tap, streak, boost, and offline-income actions.
pub mod economy;
/// Health check service.
pub mod health_service;
/// In-session automated-input detection.
pub mod input_analyzer;
/// Fixed- and sliding-window rate limiting.
pub mod rate_limiter;
/// Optimistic load-transform-save updates against both storage tiers.
pub mod state_updater;
/// Durable store connection supervision with degraded-mode fallback.
pub mod storage_supervisor;
