/// Low-latency cache tier abstraction, backends, and the distributed lock.
pub mod cache;
/// Durable system-of-record abstraction and backends.
pub mod durable;
/// Persisted record definitions shared across layers.
pub mod models;
/// Storage abstraction layer common to both tiers.
pub mod storage;
