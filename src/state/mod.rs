/// Duel lifecycle transition table.
pub mod duel_flow;
/// Broadcast hub for duel snapshots.
pub mod duel_hub;

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::{Mutex, RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{cache::CacheStore, durable::DurableStore},
    error::ServiceError,
    services::{action_queue::ActionQueue, input_analyzer::InputSession},
};

pub use self::duel_hub::DuelHub;

pub type SharedState = Arc<AppState>;

/// Capacity of the duel snapshot broadcast channel.
const DUEL_HUB_CAPACITY: usize = 32;

/// Matchmaking queue membership for one player.
#[derive(Debug, Clone, Copy)]
pub struct QueueEntry {
    /// When the player joined the queue; stale entries are evicted on contact.
    pub joined_at: SystemTime,
}

/// Central application state storing backend handles, the per-actor queue,
/// input-analysis sessions, and the matchmaking queue.
pub struct AppState {
    config: AppConfig,
    cache: RwLock<Option<Arc<dyn CacheStore>>>,
    durable: RwLock<Option<Arc<dyn DurableStore>>>,
    degraded: watch::Sender<bool>,
    queue: ActionQueue,
    input_sessions: DashMap<String, InputSession>,
    duel_queue: Mutex<IndexMap<String, QueueEntry>>,
    duels: DuelHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a durable store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            cache: RwLock::new(None),
            durable: RwLock::new(None),
            degraded: degraded_tx,
            queue: ActionQueue::default(),
            input_sessions: DashMap::new(),
            duel_queue: Mutex::new(IndexMap::new()),
            duels: DuelHub::new(DUEL_HUB_CAPACITY),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the cache tier, if one is installed.
    pub async fn cache(&self) -> Option<Arc<dyn CacheStore>> {
        let guard = self.cache.read().await;
        guard.as_ref().cloned()
    }

    /// Install a cache tier implementation.
    pub async fn install_cache(&self, store: Arc<dyn CacheStore>) {
        let mut guard = self.cache.write().await;
        *guard = Some(store);
    }

    /// Remove the cache tier; reads fall through to the durable store.
    pub async fn clear_cache(&self) {
        let mut guard = self.cache.write().await;
        guard.take();
    }

    /// Obtain a handle to the durable store, if one is installed.
    pub async fn durable(&self) -> Option<Arc<dyn DurableStore>> {
        let guard = self.durable.read().await;
        guard.as_ref().cloned()
    }

    /// Durable store handle, or a degraded-mode failure.
    pub async fn require_durable(&self) -> Result<Arc<dyn DurableStore>, ServiceError> {
        self.durable().await.ok_or(ServiceError::Degraded)
    }

    /// Install a durable store implementation and leave degraded mode.
    pub async fn install_durable(&self, store: Arc<dyn DurableStore>) {
        {
            let mut guard = self.durable.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the durable store and enter degraded mode.
    pub async fn clear_durable(&self) {
        {
            let mut guard = self.durable.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag: set while no durable store is installed.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.durable.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }

    /// Per-actor FIFO serializing every mutating player action.
    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    /// Input-analysis sessions keyed by player identity.
    pub fn input_sessions(&self) -> &DashMap<String, InputSession> {
        &self.input_sessions
    }

    /// Matchmaking queue, FIFO over insertion order.
    pub fn duel_queue(&self) -> &Mutex<IndexMap<String, QueueEntry>> {
        &self.duel_queue
    }

    /// Broadcast hub publishing duel snapshots on every change.
    pub fn duel_hub(&self) -> &DuelHub {
        &self.duels
    }
}
