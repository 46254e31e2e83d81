use super::{CounterKey, CounterStore, StoreError};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounds every store call with a deadline. An expired call becomes
/// [`StoreError::Timeout`]; the inner operation may still complete on the backend.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: CounterStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<F>(&self, op: &str, key: &CounterKey, fut: F) -> Result<u64, StoreError>
    where
        F: Future<Output = Result<u64, StoreError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} on {} exceeded {:?} against {} store",
                    op,
                    key,
                    self.timeout,
                    self.inner.name()
                );
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<S: CounterStore> CounterStore for TimeoutStore<S> {
    async fn get(&self, key: &CounterKey) -> Result<u64, StoreError> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, StoreError> {
        self.bounded("increment", key, self.inner.increment_and_get(key))
            .await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
