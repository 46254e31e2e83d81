use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

lazy_static::lazy_static! {
    pub static ref METRICS: Metrics = Metrics::new();
}

pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    store_errors_total: IntCounterVec,
    request_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("hitcount_requests_total", "Total API requests"),
            &["route", "status"],
        )
        .expect("valid requests_total metric");
        let store_errors_total = IntCounterVec::new(
            Opts::new(
                "hitcount_store_errors_total",
                "Counter store operations that failed",
            ),
            &["operation"],
        )
        .expect("valid store_errors_total metric");
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "hitcount_request_duration_seconds",
                "API request latency in seconds",
            ),
            &["route"],
        )
        .expect("valid request_duration metric");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("register requests_total");
        registry
            .register(Box::new(store_errors_total.clone()))
            .expect("register store_errors_total");
        registry
            .register(Box::new(request_duration.clone()))
            .expect("register request_duration");

        Self {
            registry,
            requests_total,
            store_errors_total,
            request_duration,
        }
    }

    pub fn record_request(&self, route: &str, status: u16, elapsed: Duration) {
        self.requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
        self.request_duration
            .with_label_values(&[route])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_store_error(&self, operation: &str) {
        self.store_errors_total.with_label_values(&[operation]).inc();
    }

    pub fn collect(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
