/// In-memory durable backend used by tests.
pub mod memory;
#[cfg(feature = "mongo-store")]
/// MongoDB-backed durable store.
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{DuelRecord, PlayerRecord};
use crate::dao::storage::StorageResult;

/// Abstraction over the system of record. Authoritative whenever the cache
/// tier is cold; written synchronously on every accepted mutation.
pub trait DurableStore: Send + Sync {
    /// Point read of a player record.
    fn load_player(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<PlayerRecord>>>;
    /// Upsert a player record.
    fn save_player(&self, player: PlayerRecord) -> BoxFuture<'static, StorageResult<()>>;
    /// Insert a freshly created duel row.
    fn insert_duel(&self, duel: DuelRecord) -> BoxFuture<'static, StorageResult<()>>;
    /// Point read of a duel row.
    fn find_duel(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<DuelRecord>>>;
    /// Replace a duel row with its updated state.
    fn update_duel(&self, duel: DuelRecord) -> BoxFuture<'static, StorageResult<()>>;
    /// Round-trip liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
