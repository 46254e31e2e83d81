//! Counter storage.
//!
//! A counter is identified by a [`CounterKey`] and holds a single non-negative
//! hit count. Backends must provide an atomic "create at zero if absent, then add
//! one" primitive; callers never read-modify-write.

pub mod inmemory;

#[cfg(feature = "redis-backend")]
pub mod redis;

mod timeout;

pub use inmemory::InMemoryCounterStore;
pub use timeout::TimeoutStore;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisCounterStore;

use crate::config::{StoreBackend, StoreConfig};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Literal id of the site-wide counter.
pub const TOTAL_MARKER: &str = "TOTAL";

const ARTICLE_PREFIX: &str = "ARTICLE#";

/// Counter namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Site-wide running total
    Total,
    /// One counter per article slug
    Article,
}

/// Composite identity of a counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    scope: Scope,
    id: String,
}

impl CounterKey {
    pub fn total() -> Self {
        Self {
            scope: Scope::Total,
            id: TOTAL_MARKER.to_string(),
        }
    }

    /// Key for an article counter. The slug is opaque and stored as given.
    pub fn article(slug: impl Into<String>) -> Self {
        Self {
            scope: Scope::Article,
            id: slug.into(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Partition key as laid out in the backing table: `TOTAL` for the site
    /// counter, `ARTICLE#<slug>` for an article. The sort key is identical.
    pub fn storage_key(&self) -> String {
        match self.scope {
            Scope::Total => TOTAL_MARKER.to_string(),
            Scope::Article => format!("{ARTICLE_PREFIX}{}", self.id),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Errors surfaced by a counter store. Stores never retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("counter {key} holds an unreadable value: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Durable, concurrency-safe storage for hit counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current count for `key`; `0` when the counter was never incremented.
    async fn get(&self, key: &CounterKey) -> Result<u64, StoreError>;

    /// Atomically materialize `key` at zero if absent, add one, and return the
    /// new count.
    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, StoreError>;

    /// Backend name, used in logs and the health probe.
    fn name(&self) -> &'static str;
}

/// Open the configured backend, bounded by the configured per-operation timeout.
///
/// The Redis backend connects eagerly, so this blocks until the pool is filled
/// or the timeout elapses.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn CounterStore>, StoreError> {
    match config.backend {
        StoreBackend::InMemory => Ok(Arc::new(TimeoutStore::new(
            InMemoryCounterStore::new(),
            config.timeout(),
        ))),
        #[cfg(feature = "redis-backend")]
        StoreBackend::Redis => {
            let redis = config.redis.as_ref().ok_or_else(|| {
                StoreError::Unavailable("redis backend selected without settings".to_string())
            })?;
            let store = RedisCounterStore::connect(redis, config.timeout())?;
            Ok(Arc::new(TimeoutStore::new(store, config.timeout())))
        }
        #[cfg(not(feature = "redis-backend"))]
        StoreBackend::Redis => Err(StoreError::Unavailable(
            "redis backend not compiled in".to_string(),
        )),
    }
}
