use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoDuelDocument, MongoPlayerDocument, doc_id},
};
use crate::dao::{
    durable::DurableStore,
    models::{DuelRecord, PlayerRecord},
    storage::StorageResult,
};

const PLAYER_COLLECTION_NAME: &str = "players";
const DUEL_COLLECTION_NAME: &str = "duels";

#[derive(Clone)]
pub struct MongoDurableStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoDurableStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let players = database.collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME);
        let player_index = mongodb::IndexModel::builder()
            .keys(doc! {"updated_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("player_updated_at_idx".to_owned()))
                    .build(),
            )
            .build();
        players
            .create_index(player_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "updated_at",
                source,
            })?;

        let duels = database.collection::<MongoDuelDocument>(DUEL_COLLECTION_NAME);
        let duel_index = mongodb::IndexModel::builder()
            .keys(doc! {"status": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("duel_status_idx".to_owned()))
                    .build(),
            )
            .build();
        duels
            .create_index(duel_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: DUEL_COLLECTION_NAME,
                index: "status,created_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn player_collection(&self) -> Collection<MongoPlayerDocument> {
        self.database()
            .await
            .collection::<MongoPlayerDocument>(PLAYER_COLLECTION_NAME)
    }

    async fn duel_collection(&self) -> Collection<MongoDuelDocument> {
        self.database()
            .await
            .collection::<MongoDuelDocument>(DUEL_COLLECTION_NAME)
    }

    async fn load_player_document(&self, id: String) -> MongoResult<Option<PlayerRecord>> {
        let collection = self.player_collection().await;
        let document = collection
            .find_one(doc! {"_id": &id})
            .await
            .map_err(|source| MongoDaoError::LoadPlayer { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn save_player_document(&self, player: PlayerRecord) -> MongoResult<()> {
        let id = player.id.clone();
        let document: MongoPlayerDocument = player.into();
        let collection = self.player_collection().await;
        collection
            .replace_one(doc! {"_id": &id}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePlayer { id, source })?;
        Ok(())
    }

    async fn insert_duel_document(&self, duel: DuelRecord) -> MongoResult<()> {
        let id = duel.id;
        let document: MongoDuelDocument = duel.into();
        let collection = self.duel_collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveDuel { id, source })?;
        Ok(())
    }

    async fn find_duel_document(&self, id: Uuid) -> MongoResult<Option<DuelRecord>> {
        let collection = self.duel_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadDuel { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn update_duel_document(&self, duel: DuelRecord) -> MongoResult<()> {
        let id = duel.id;
        let document: MongoDuelDocument = duel.into();
        let collection = self.duel_collection().await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveDuel { id, source })?;
        Ok(())
    }
}

impl DurableStore for MongoDurableStore {
    fn load_player(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<PlayerRecord>>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move { store.load_player_document(id).await.map_err(Into::into) })
    }

    fn save_player(&self, player: PlayerRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_player_document(player).await.map_err(Into::into) })
    }

    fn insert_duel(&self, duel: DuelRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_duel_document(duel).await.map_err(Into::into) })
    }

    fn find_duel(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<DuelRecord>>> {
        let store = self.clone();
        Box::pin(async move { store.find_duel_document(id).await.map_err(Into::into) })
    }

    fn update_duel(&self, duel: DuelRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_duel_document(duel).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
