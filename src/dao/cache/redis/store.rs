use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::Mutex;

use super::{
    RedisConfig,
    error::{RedisDaoError, RedisResult},
};
use crate::dao::{
    cache::{CacheStore, CacheValue},
    storage::StorageResult,
};

/// Redis-backed [`CacheStore`].
///
/// The connection manager is established lazily and dropped after a command
/// failure so the next call reconnects, keeping callers on the fail-open
/// path instead of wedging on a dead socket.
#[derive(Clone)]
pub struct RedisCacheStore {
    inner: Arc<RedisInner>,
}

struct RedisInner {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
    config: RedisConfig,
}

impl RedisInner {
    async fn connection(&self) -> RedisResult<ConnectionManager> {
        let mut guard = self.connection.lock().await;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }
        let manager = self
            .client
            .get_connection_manager()
            .await
            .map_err(|source| RedisDaoError::Connect { source })?;
        *guard = Some(manager.clone());
        Ok(manager)
    }

    /// Drop the cached connection and wrap the failure, so the next command
    /// starts from a fresh handshake.
    async fn command_failed(&self, op: &'static str, source: redis::RedisError) -> RedisDaoError {
        self.connection.lock().await.take();
        RedisDaoError::Command { op, source }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }
}

impl RedisCacheStore {
    /// Build a store for the given configuration. No connection is attempted
    /// until the first command.
    pub fn new(config: RedisConfig) -> RedisResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|source| {
            RedisDaoError::InvalidUrl {
                url: config.url.clone(),
                source,
            }
        })?;
        Ok(Self {
            inner: Arc::new(RedisInner {
                client,
                connection: Mutex::new(None),
                config,
            }),
        })
    }

    async fn get_value(&self, key: String) -> RedisResult<Option<CacheValue>> {
        let mut conn = self.inner.connection().await?;
        match conn.get::<_, Option<String>>(self.inner.key(&key)).await {
            Ok(raw) => Ok(raw.map(|raw| CacheValue::decode(&raw))),
            Err(source) => Err(self.inner.command_failed("GET", source).await),
        }
    }

    async fn set_value(
        &self,
        key: String,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> RedisResult<()> {
        let mut conn = self.inner.connection().await?;
        let full = self.inner.key(&key);
        let payload = value.encode();
        let result = match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(full, payload, ttl.as_secs().max(1))
                    .await
            }
            None => conn.set::<_, _, ()>(full, payload).await,
        };
        match result {
            Ok(()) => Ok(()),
            Err(source) => Err(self.inner.command_failed("SET", source).await),
        }
    }

    async fn set_value_if_absent(
        &self,
        key: String,
        value: CacheValue,
        ttl: Duration,
    ) -> RedisResult<bool> {
        let mut conn = self.inner.connection().await?;
        let outcome = redis::cmd("SET")
            .arg(self.inner.key(&key))
            .arg(value.encode())
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<Option<String>>(&mut conn)
            .await;
        match outcome {
            Ok(reply) => Ok(reply.is_some()),
            Err(source) => Err(self.inner.command_failed("SET NX", source).await),
        }
    }

    async fn delete_value(&self, key: String) -> RedisResult<bool> {
        let mut conn = self.inner.connection().await?;
        match conn.del::<_, i64>(self.inner.key(&key)).await {
            Ok(removed) => Ok(removed > 0),
            Err(source) => Err(self.inner.command_failed("DEL", source).await),
        }
    }

    async fn increment_value(&self, key: String, amount: i64) -> RedisResult<i64> {
        let mut conn = self.inner.connection().await?;
        match conn.incr::<_, _, i64>(self.inner.key(&key), amount).await {
            Ok(next) => Ok(next),
            Err(source) => Err(self.inner.command_failed("INCRBY", source).await),
        }
    }

    async fn expire_value(&self, key: String, ttl: Duration) -> RedisResult<bool> {
        let mut conn = self.inner.connection().await?;
        match conn
            .expire::<_, bool>(self.inner.key(&key), ttl.as_secs().max(1) as i64)
            .await
        {
            Ok(armed) => Ok(armed),
            Err(source) => Err(self.inner.command_failed("EXPIRE", source).await),
        }
    }

    async fn remaining_ttl(&self, key: String) -> RedisResult<Option<Duration>> {
        let mut conn = self.inner.connection().await?;
        match conn.ttl::<_, i64>(self.inner.key(&key)).await {
            // -2 means the key is absent, -1 means no expiry is set.
            Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs as u64))),
            Ok(_) => Ok(None),
            Err(source) => Err(self.inner.command_failed("TTL", source).await),
        }
    }

    async fn hash_set_field(
        &self,
        key: String,
        field: String,
        value: CacheValue,
    ) -> RedisResult<()> {
        let mut conn = self.inner.connection().await?;
        match conn
            .hset::<_, _, _, ()>(self.inner.key(&key), field, value.encode())
            .await
        {
            Ok(()) => Ok(()),
            Err(source) => Err(self.inner.command_failed("HSET", source).await),
        }
    }

    async fn hash_get_field(&self, key: String, field: String) -> RedisResult<Option<CacheValue>> {
        let mut conn = self.inner.connection().await?;
        match conn
            .hget::<_, _, Option<String>>(self.inner.key(&key), field)
            .await
        {
            Ok(raw) => Ok(raw.map(|raw| CacheValue::decode(&raw))),
            Err(source) => Err(self.inner.command_failed("HGET", source).await),
        }
    }

    async fn hash_get_fields(&self, key: String) -> RedisResult<Vec<(String, CacheValue)>> {
        let mut conn = self.inner.connection().await?;
        match conn
            .hgetall::<_, Vec<(String, String)>>(self.inner.key(&key))
            .await
        {
            Ok(pairs) => Ok(pairs
                .into_iter()
                .map(|(field, raw)| (field, CacheValue::decode(&raw)))
                .collect()),
            Err(source) => Err(self.inner.command_failed("HGETALL", source).await),
        }
    }

    async fn sorted_insert_member(
        &self,
        key: String,
        score: f64,
        member: String,
    ) -> RedisResult<()> {
        let mut conn = self.inner.connection().await?;
        match conn
            .zadd::<_, _, _, ()>(self.inner.key(&key), member, score)
            .await
        {
            Ok(()) => Ok(()),
            Err(source) => Err(self.inner.command_failed("ZADD", source).await),
        }
    }

    async fn sorted_remove_below_cutoff(&self, key: String, cutoff: f64) -> RedisResult<u64> {
        let mut conn = self.inner.connection().await?;
        match conn
            .zrembyscore::<_, _, _, u64>(self.inner.key(&key), "-inf", format!("({cutoff}"))
            .await
        {
            Ok(removed) => Ok(removed),
            Err(source) => {
                Err(self
                    .inner
                    .command_failed("ZREMRANGEBYSCORE", source)
                    .await)
            }
        }
    }

    async fn sorted_member_count(&self, key: String) -> RedisResult<u64> {
        let mut conn = self.inner.connection().await?;
        match conn.zcard::<_, u64>(self.inner.key(&key)).await {
            Ok(count) => Ok(count),
            Err(source) => Err(self.inner.command_failed("ZCARD", source).await),
        }
    }

    async fn sorted_lowest_score(&self, key: String) -> RedisResult<Option<f64>> {
        let mut conn = self.inner.connection().await?;
        match conn
            .zrange_withscores::<_, Vec<(String, f64)>>(self.inner.key(&key), 0, 0)
            .await
        {
            Ok(entries) => Ok(entries.first().map(|(_, score)| *score)),
            Err(source) => Err(self.inner.command_failed("ZRANGE", source).await),
        }
    }

    async fn sorted_top_members(
        &self,
        key: String,
        limit: usize,
    ) -> RedisResult<Vec<(String, f64)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.inner.connection().await?;
        match conn
            .zrevrange_withscores::<_, Vec<(String, f64)>>(
                self.inner.key(&key),
                0,
                limit as isize - 1,
            )
            .await
        {
            Ok(entries) => Ok(entries),
            Err(source) => Err(self.inner.command_failed("ZREVRANGE", source).await),
        }
    }

    async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.inner.connection().await?;
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(source) => Err(self.inner.command_failed("PING", source).await),
        }
    }
}

impl CacheStore for RedisCacheStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<CacheValue>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.get_value(key).await.map_err(Into::into) })
    }

    fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.set_value(key, value, ttl).await.map_err(Into::into) })
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            store
                .set_value_if_absent(key, value, ttl)
                .await
                .map_err(Into::into)
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.delete_value(key).await.map_err(Into::into) })
    }

    fn increment(&self, key: &str, amount: i64) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.increment_value(key, amount).await.map_err(Into::into) })
    }

    fn expire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.expire_value(key, ttl).await.map_err(Into::into) })
    }

    fn time_to_live(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Duration>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.remaining_ttl(key).await.map_err(Into::into) })
    }

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: CacheValue,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        let field = field.to_owned();
        Box::pin(async move {
            store
                .hash_set_field(key, field, value)
                .await
                .map_err(Into::into)
        })
    }

    fn hash_get(
        &self,
        key: &str,
        field: &str,
    ) -> BoxFuture<'static, StorageResult<Option<CacheValue>>> {
        let store = self.clone();
        let key = key.to_owned();
        let field = field.to_owned();
        Box::pin(async move { store.hash_get_field(key, field).await.map_err(Into::into) })
    }

    fn hash_get_all(
        &self,
        key: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, CacheValue)>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.hash_get_fields(key).await.map_err(Into::into) })
    }

    fn sorted_insert(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        let member = member.to_owned();
        Box::pin(async move {
            store
                .sorted_insert_member(key, score, member)
                .await
                .map_err(Into::into)
        })
    }

    fn sorted_remove_below(
        &self,
        key: &str,
        cutoff: f64,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move {
            store
                .sorted_remove_below_cutoff(key, cutoff)
                .await
                .map_err(Into::into)
        })
    }

    fn sorted_count(&self, key: &str) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.sorted_member_count(key).await.map_err(Into::into) })
    }

    fn sorted_min_score(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<f64>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.sorted_lowest_score(key).await.map_err(Into::into) })
    }

    fn sorted_range_desc(
        &self,
        key: &str,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, f64)>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.sorted_top_members(key, limit).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
