//! Hitcount: page-view counters for a static blog.
//!
//! One site-wide total plus one counter per article, kept in a [`store::CounterStore`]
//! and served over HTTP by [`server::HitsServer`].

pub mod api;
pub mod config;
pub mod cors;
pub mod metrics;
pub mod server;
pub mod service;
pub mod store;

pub use api::{Api, HitsResponse};
pub use config::Config;
pub use cors::CorsPolicy;
pub use server::HitsServer;
pub use service::{CounterService, ServiceError};
pub use store::{CounterKey, CounterStore, Scope, StoreError};
