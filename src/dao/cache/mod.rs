/// Distributed lock built on the conditional-set primitive.
pub mod lock;
/// In-memory cache backend used by tests and cache-less deployments.
pub mod memory;
#[cfg(feature = "redis-cache")]
/// Redis-backed cache tier.
pub mod redis;

use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::dao::storage::{StorageError, StorageResult};

/// Payload stored in the cache tier. Everything is written as JSON text;
/// values that fail to parse on read are surfaced as [`CacheValue::Raw`]
/// instead of an error, to stay tolerant of mixed legacy payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// A well-formed JSON document.
    Json(serde_json::Value),
    /// A payload that did not parse as JSON.
    Raw(String),
}

impl CacheValue {
    /// Decode a stored string, falling back to the raw text when it is not JSON.
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => CacheValue::Json(value),
            Err(_) => CacheValue::Raw(raw.to_owned()),
        }
    }

    /// Encode the value back to the stored string form.
    pub fn encode(&self) -> String {
        match self {
            CacheValue::Json(value) => value.to_string(),
            CacheValue::Raw(raw) => raw.clone(),
        }
    }

    /// Serialize any serde value into a cacheable payload.
    pub fn from_serialize<T: Serialize>(value: &T) -> StorageResult<Self> {
        let json = serde_json::to_value(value).map_err(StorageError::encoding)?;
        Ok(CacheValue::Json(json))
    }

    /// Attempt to view the payload as a typed record.
    pub fn into_typed<T: DeserializeOwned>(self) -> Option<T> {
        match self {
            CacheValue::Json(value) => serde_json::from_value(value).ok(),
            CacheValue::Raw(_) => None,
        }
    }

    /// The payload as an integer, when it holds one (counters).
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CacheValue::Json(value) => value.as_i64(),
            CacheValue::Raw(raw) => raw.trim().parse().ok(),
        }
    }
}

/// Abstraction over the low-latency cache tier. Any store offering these
/// primitives (plain values with TTL, a conditional set, counters, hashes,
/// and a sorted set) satisfies the contract.
pub trait CacheStore: Send + Sync {
    /// Fetch a value, `None` on a miss.
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<CacheValue>>>;
    /// Store a value, optionally bounded by a time-to-live.
    fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Store a value only when the key is absent; returns whether the write won.
    fn set_if_absent(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Remove a key; returns whether it existed.
    fn delete(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Atomically add to an integer counter, creating it at zero.
    fn increment(&self, key: &str, amount: i64) -> BoxFuture<'static, StorageResult<i64>>;
    /// (Re)arm a key's time-to-live; returns whether the key existed.
    fn expire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>>;
    /// Remaining time-to-live, `None` when absent or unbounded.
    fn time_to_live(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Duration>>>;
    /// Set one field of a hash.
    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: CacheValue,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch one field of a hash.
    fn hash_get(
        &self,
        key: &str,
        field: &str,
    ) -> BoxFuture<'static, StorageResult<Option<CacheValue>>>;
    /// Fetch every field of a hash.
    fn hash_get_all(
        &self,
        key: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, CacheValue)>>>;
    /// Insert a member into a sorted set (upserting its score).
    fn sorted_insert(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop members with a score strictly below the cutoff; returns the count removed.
    fn sorted_remove_below(&self, key: &str, cutoff: f64)
    -> BoxFuture<'static, StorageResult<u64>>;
    /// Number of members in a sorted set.
    fn sorted_count(&self, key: &str) -> BoxFuture<'static, StorageResult<u64>>;
    /// Lowest score present, `None` when the set is empty.
    fn sorted_min_score(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<f64>>>;
    /// Highest-scored members first, at most `limit` of them.
    fn sorted_range_desc(
        &self,
        key: &str,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<(String, f64)>>>;
    /// Round-trip liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Fetch and decode a typed record from the cache.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> StorageResult<Option<T>> {
    Ok(store.get(key).await?.and_then(CacheValue::into_typed))
}

/// Serialize and store a typed record in the cache.
pub async fn set_typed<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> StorageResult<()> {
    let payload = CacheValue::from_serialize(value)?;
    store.set(key, payload, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_parses_json_payloads() {
        assert_eq!(
            CacheValue::decode("{\"balance\":5}"),
            CacheValue::Json(serde_json::json!({"balance": 5}))
        );
        assert_eq!(
            CacheValue::decode("42").as_integer(),
            Some(42),
            "bare integers decode as JSON numbers"
        );
    }

    #[test]
    fn decode_keeps_legacy_payloads_raw() {
        let value = CacheValue::decode("not-json{");
        assert_eq!(value, CacheValue::Raw("not-json{".into()));
        assert_eq!(value.encode(), "not-json{");
    }

    #[test]
    fn typed_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Sample {
            name: String,
            count: u32,
        }

        let sample = Sample {
            name: "tap".into(),
            count: 3,
        };
        let encoded = CacheValue::from_serialize(&sample).unwrap().encode();
        let decoded: Sample = CacheValue::decode(&encoded).into_typed().unwrap();
        assert_eq!(decoded, sample);
    }
}
