//! Runs against a throwaway Redis container. Needs Docker:
//! `cargo test --test redis_store -- --ignored`

#![cfg(feature = "redis-backend")]

use hitcount_server::config::RedisConfig;
use hitcount_server::store::RedisCounterStore;
use hitcount_server::{CounterKey, CounterService, CounterStore};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_redis_counters() {
    let node = Redis::default().start().await.unwrap();
    let port = node.get_host_port_ipv4(6379).await.unwrap();

    let config = RedisConfig::new(format!("redis://127.0.0.1:{port}"));
    let store = Arc::new(RedisCounterStore::connect(&config, Duration::from_secs(5)).unwrap());

    let fresh = CounterKey::article("never-visited");
    assert_eq!(store.get(&fresh).await.unwrap(), 0);

    let key = CounterKey::article("contended");
    let n = 200u64;
    let tasks: Vec<_> = (0..n)
        .map(|_| {
            let store = Arc::clone(&store);
            let key = key.clone();
            tokio::spawn(async move { store.increment_and_get(&key).await.unwrap() })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(store.get(&key).await.unwrap(), n);

    let service = CounterService::new(store);
    for _ in 0..3 {
        service.record_hit("hello-world").await.unwrap();
    }
    assert_eq!(service.article_hits("hello-world").await.unwrap(), 3);
    assert_eq!(service.total_hits().await.unwrap(), 3);
}
