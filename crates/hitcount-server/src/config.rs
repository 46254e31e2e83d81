use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Counter store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local counters, lost on restart
    #[default]
    InMemory,
    /// Redis (or Valkey) hashes
    Redis,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::InMemory => "inmemory",
            StoreBackend::Redis => "redis",
        }
    }
}

/// What to answer when a request's `Origin` is not allow-listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Send the first allow-listed origin anyway (browser will refuse the read)
    #[default]
    Fallback,
    /// Send no `Access-Control-Allow-Origin` header at all
    Omit,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
    /// Number of worker threads (0 = auto-detect CPU count)
    #[serde(default)]
    pub workers: usize,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
            workers: 0,
        }
    }
}

impl ListenConfig {
    pub fn worker_threads(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Deadline for each store operation in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
}

fn default_store_timeout_ms() -> u64 {
    2000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            timeout_ms: default_store_timeout_ms(),
            redis: None,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_key_prefix() -> String {
    "hitcount:".to_string()
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: default_redis_pool_size(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Front-end origins allowed to read responses. The first entry is the fallback.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub on_mismatch: MismatchPolicy,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://www.benoitpaul.com".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            on_mismatch: MismatchPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Point the store at Redis, keeping any pool settings already configured.
    pub fn use_redis(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.store.backend = StoreBackend::Redis;
        match self.store.redis {
            Some(ref mut redis) => redis.url = url,
            None => self.store.redis = Some(RedisConfig::new(url)),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.store.timeout_ms == 0 {
            anyhow::bail!("'store.timeout_ms' must be greater than zero");
        }

        if self.store.backend == StoreBackend::Redis {
            match self.store.redis {
                None => anyhow::bail!(
                    "Store backend 'redis' requires a 'store.redis' section with at least 'url'"
                ),
                Some(ref redis) if redis.pool_size == 0 => {
                    anyhow::bail!("'store.redis.pool_size' must be greater than zero")
                }
                Some(_) => {}
            }
            #[cfg(not(feature = "redis-backend"))]
            anyhow::bail!("Redis store specified but 'redis-backend' feature is not enabled");
        }

        if self.cors.allowed_origins.is_empty() {
            anyhow::bail!("'cors.allowed_origins' must list at least one origin");
        }

        if self.metrics.enabled && self.metrics.port == self.listen.port {
            anyhow::bail!(
                "Metrics port {} collides with the listen port",
                self.metrics.port
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.store.backend, StoreBackend::InMemory);
        assert_eq!(config.store.timeout(), Duration::from_secs(2));
        assert_eq!(
            config.cors.allowed_origins[0],
            "https://www.benoitpaul.com"
        );
        assert_eq!(config.cors.on_mismatch, MismatchPolicy::Fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_redis_config() {
        let yaml = r#"
listen:
  port: 3001
  workers: 2
store:
  backend: redis
  timeout_ms: 500
  redis:
    url: redis://127.0.0.1:6379
cors:
  allowed_origins: ["https://blog.example"]
  on_mismatch: omit
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen.port, 3001);
        assert_eq!(config.listen.host, "0.0.0.0");
        assert_eq!(config.listen.worker_threads(), 2);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.timeout_ms, 500);
        let redis = config.store.redis.as_ref().unwrap();
        assert_eq!(redis.pool_size, 10);
        assert_eq!(redis.key_prefix, "hitcount:");
        assert_eq!(config.cors.on_mismatch, MismatchPolicy::Omit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_backend_requires_section() {
        let yaml = r#"
store:
  backend: redis
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.redis"));
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let yaml = r#"
cors:
  allowed_origins: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.store.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_collision_rejected() {
        let mut config = Config::default();
        config.metrics.port = config.listen.port;
        assert!(config.validate().is_err());

        config.metrics.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_use_redis_overrides_url() {
        let mut config = Config::default();
        config.use_redis("redis://cache:6379");
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis.as_ref().unwrap().url, "redis://cache:6379");

        config.store.redis.as_mut().unwrap().pool_size = 4;
        config.use_redis("redis://other:6379");
        let redis = config.store.redis.as_ref().unwrap();
        assert_eq!(redis.url, "redis://other:6379");
        assert_eq!(redis.pool_size, 4);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen:\n  port: 9000\nmetrics:\n  enabled: false").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.listen.port, 9000);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "store:\n  backend: redis").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }
}
