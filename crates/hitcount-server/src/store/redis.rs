//! Redis-backed counter store.
//!
//! Each counter is a Redis hash named `<prefix><partition key>` with a single
//! `hits` field. `HINCRBY` creates both the hash and the field at zero when they
//! are missing and adds in one step, which gives the atomic increment-with-default
//! the service relies on.
//!
//! The synchronous client is pooled with r2d2; calls hop onto the blocking pool so
//! they never stall the async workers.

use super::{CounterKey, CounterStore, StoreError};
use crate::config::RedisConfig;
use async_trait::async_trait;
use redis::{Commands, ErrorKind, RedisError};
use std::time::Duration;
use tracing::{debug, error, info};

const HITS_FIELD: &str = "hits";

pub struct RedisCounterStore {
    pool: r2d2::Pool<redis::Client>,
    key_prefix: String,
}

impl RedisCounterStore {
    /// Connect to Redis and fill the pool. Fails fast when the server is unreachable.
    pub fn connect(config: &RedisConfig, connect_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(format!("invalid Redis URL: {e}")))?;
        let pool = r2d2::Pool::builder()
            .max_size(config.pool_size as u32)
            .connection_timeout(connect_timeout)
            .build(client)
            .map_err(|e| StoreError::Unavailable(format!("failed to connect to Redis: {e}")))?;

        info!(
            "Redis counter store ready (pool_size={}, prefix={:?})",
            config.pool_size, config.key_prefix
        );

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn redis_key(&self, key: &CounterKey) -> String {
        format!("{}{}", self.key_prefix, key.storage_key())
    }

    async fn run<T, F>(&self, key: &CounterKey, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection, &str) -> Result<T, RedisError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let redis_key = self.redis_key(key);
        let display_key = key.to_string();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(format!("no Redis connection: {e}")))?;
            op(&mut *conn, &redis_key).map_err(|e| classify(&display_key, e))
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("Redis task failed: {e}")))?;

        if let Err(ref e) = outcome {
            error!("Redis operation on {} failed: {}", key, e);
        }
        outcome
    }
}

fn classify(key: &str, err: RedisError) -> StoreError {
    match err.kind() {
        ErrorKind::TypeError => StoreError::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        },
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn to_count(key: &CounterKey, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("negative hit count {value}"),
    })
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let value: Option<i64> = self
            .run(key, |conn, redis_key| conn.hget(redis_key, HITS_FIELD))
            .await?;
        debug!("HGET {} -> {:?}", key, value);
        value.map_or(Ok(0), |v| to_count(key, v))
    }

    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let value: i64 = self
            .run(key, |conn, redis_key| conn.hincr(redis_key, HITS_FIELD, 1))
            .await?;
        debug!("HINCRBY {} -> {}", key, value);
        to_count(key, value)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
