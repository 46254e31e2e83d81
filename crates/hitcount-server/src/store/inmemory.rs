use super::{CounterKey, CounterStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-local counter store.
///
/// Each counter is an [`AtomicU64`] cell. Absent cells are materialized under the
/// write lock, so concurrent first increments on the same key share one cell and
/// none of them is lost.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<CounterKey, Arc<AtomicU64>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized counters.
    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }

    fn cell(&self, key: &CounterKey) -> Arc<AtomicU64> {
        if let Some(cell) = self.counters.read().get(key) {
            return Arc::clone(cell);
        }
        let mut counters = self.counters.write();
        Arc::clone(counters.entry(key.clone()).or_default())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &CounterKey) -> Result<u64, StoreError> {
        Ok(self
            .counters
            .read()
            .get(key)
            .map(|cell| cell.load(Ordering::Acquire))
            .unwrap_or(0))
    }

    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let previous = self.cell(key).fetch_add(1, Ordering::AcqRel);
        Ok(previous + 1)
    }

    fn name(&self) -> &'static str {
        "inmemory"
    }
}
