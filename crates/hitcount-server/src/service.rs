//! Domain logic mapping site and article hit counters onto the counter store.
//!
//! `record_hit` bumps the site total first and the article second, as two
//! independent atomic increments. If the article increment fails after the
//! total succeeded, the total stays ahead of the sum of article counters and
//! nothing is rolled back: the total is advisory, article counts are authoritative.

use crate::store::{CounterKey, CounterStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dependency failure: {0}")]
    DependencyFailure(#[from] StoreError),
}

/// Counter operations over an injected store handle.
#[derive(Clone)]
pub struct CounterService {
    store: Arc<dyn CounterStore>,
}

impl CounterService {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub async fn total_hits(&self) -> Result<u64, ServiceError> {
        Ok(self.store.get(&CounterKey::total()).await?)
    }

    pub async fn article_hits(&self, slug: &str) -> Result<u64, ServiceError> {
        let key = article_key(slug)?;
        Ok(self.store.get(&key).await?)
    }

    /// Count one view of `slug` and return the article's new count.
    pub async fn record_hit(&self, slug: &str) -> Result<u64, ServiceError> {
        let article = article_key(slug)?;
        let total = CounterKey::total();

        let total_hits = self.store.increment_and_get(&total).await?;
        let article_hits = match self.store.increment_and_get(&article).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    "{} incremented to {} but {} failed, total now overstated: {}",
                    total, total_hits, article, e
                );
                return Err(e.into());
            }
        };

        debug!(
            "recorded hit for {} (article={}, total={})",
            slug, article_hits, total_hits
        );
        Ok(article_hits)
    }
}

fn article_key(slug: &str) -> Result<CounterKey, ServiceError> {
    if slug.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "article slug must not be empty".to_string(),
        ));
    }
    Ok(CounterKey::article(slug))
}
