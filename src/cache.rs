//! Result cache abstraction and its Redis implementation.
//!
//! Values are opaque strings (the pipeline stores JSON). Writes use a single
//! atomic `SET .. EX` so a value can never exist without a TTL.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::CacheUnavailable;

/// Key prefix for extraction results in Redis.
const KEY_PREFIX: &str = "docai:result:";

/// Key-value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheUnavailable>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheUnavailable>;
}

/// Redis-backed cache. The `ConnectionManager` is created once at startup and
/// shared; clones are cheap handles onto the same multiplexed connection.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    /// Connect to Redis and return a reusable store handle.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheUnavailable> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheUnavailable(format!("invalid redis url: {}", e)))?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }

    fn result_key(&self, key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheUnavailable> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.result_key(key)).await?;
        debug!(
            "Cache {} for '{}'",
            if value.is_some() { "hit" } else { "miss" },
            key
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheUnavailable> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.result_key(key), value, ttl.as_secs())
            .await?;
        Ok(())
    }
}
