//! Cross-origin policy for the statistics API.

use crate::config::{CorsConfig, MismatchPolicy};
use hyper::header::HeaderValue;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    on_mismatch: MismatchPolicy,
}

impl CorsPolicy {
    /// Build a policy. `allowed_origins` must not be empty; the first entry is the
    /// fallback answer for unknown origins.
    pub fn new(allowed_origins: Vec<String>, on_mismatch: MismatchPolicy) -> Self {
        debug_assert!(!allowed_origins.is_empty());
        Self {
            allowed_origins,
            on_mismatch,
        }
    }

    pub fn from_config(config: &CorsConfig) -> Self {
        Self::new(config.allowed_origins.clone(), config.on_mismatch)
    }

    /// Value for `Access-Control-Allow-Origin` given the request's `Origin`, or
    /// `None` when the header should be left out.
    pub fn allow_origin(&self, origin: Option<&str>) -> Option<HeaderValue> {
        match origin {
            Some(origin) => {
                if let Some(allowed) = self.allowed_origins.iter().find(|o| o.as_str() == origin) {
                    return HeaderValue::from_str(allowed).ok();
                }
                info!("invalid origin: {}", origin);
            }
            None => debug!("request without Origin header"),
        }

        match self.on_mismatch {
            MismatchPolicy::Fallback => self
                .allowed_origins
                .first()
                .and_then(|o| HeaderValue::from_str(o).ok()),
            MismatchPolicy::Omit => None,
        }
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::from_config(&CorsConfig::default())
    }
}
