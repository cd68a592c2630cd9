use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    durable::DurableStore,
    models::{DuelRecord, PlayerRecord},
    storage::StorageResult,
};

/// Process-local [`DurableStore`], the test double for the MongoDB backend.
#[derive(Clone, Default)]
pub struct MemoryDurableStore {
    inner: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    players: HashMap<String, PlayerRecord>,
    duels: HashMap<Uuid, DuelRecord>,
}

impl MemoryDurableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables<T>(&self, op: impl FnOnce(&mut Tables) -> T) -> T {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        op(&mut guard)
    }
}

impl DurableStore for MemoryDurableStore {
    fn load_player(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<PlayerRecord>>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move { Ok(store.tables(|tables| tables.players.get(&id).cloned())) })
    }

    fn save_player(&self, player: PlayerRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.tables(|tables| {
                tables.players.insert(player.id.clone(), player);
            });
            Ok(())
        })
    }

    fn insert_duel(&self, duel: DuelRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.tables(|tables| {
                tables.duels.insert(duel.id, duel);
            });
            Ok(())
        })
    }

    fn find_duel(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<DuelRecord>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.tables(|tables| tables.duels.get(&id).cloned())) })
    }

    fn update_duel(&self, duel: DuelRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.tables(|tables| {
                tables.duels.insert(duel.id, duel);
            });
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
