//! HTTP façade over the counter service.
//!
//! | Method | Path                      | Body               |
//! |--------|---------------------------|--------------------|
//! | GET    | `/statistics`             | `{"hits": <int>}`  |
//! | GET    | `/statistics/{slug}`      | `{"hits": <int>}`  |
//! | POST   | `/statistics/{slug}/hits` | `{"hits": <int>}`  |
//! | GET    | `/health`                 | `{"status": ...}`  |
//!
//! Every response is JSON and carries the CORS header chosen by [`CorsPolicy`].
//! Failures below this layer become a fixed `{"error": "Internal error"}` body.

use crate::cors::CorsPolicy;
use crate::metrics::METRICS;
use crate::service::{CounterService, ServiceError};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONTENT_TYPE, ORIGIN,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error};

const INTERNAL_ERROR: &str = "Internal error";
const INVALID_ARGUMENT: &str = "Invalid argument";

/// Body of every counter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitsResponse {
    pub hits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Health,
    Total,
    Article,
    ArticleHits,
}

const PREFLIGHT_METHODS: &str = "GET, POST, OPTIONS";

impl Route {
    fn allowed_methods(self) -> &'static str {
        match self {
            Route::Health => "GET",
            Route::Total | Route::Article => "GET, OPTIONS",
            Route::ArticleHits => "POST, OPTIONS",
        }
    }
}

pub struct Api {
    service: CounterService,
    cors: CorsPolicy,
    router: matchit::Router<Route>,
}

impl Api {
    pub fn new(service: CounterService, cors: CorsPolicy) -> Result<Self, matchit::InsertError> {
        let mut router = matchit::Router::new();
        router.insert("/health", Route::Health)?;
        router.insert("/statistics", Route::Total)?;
        router.insert("/statistics/{slug}", Route::Article)?;
        router.insert("/statistics/{slug}/hits", Route::ArticleHits)?;

        Ok(Self {
            service,
            cors,
            router,
        })
    }

    /// Handle one request. The request body is never read.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let started = Instant::now();
        debug!("{} {}", req.method(), req.uri());

        let allow_origin = self
            .cors
            .allow_origin(req.headers().get(ORIGIN).and_then(|v| v.to_str().ok()));

        let (label, mut response) = self.dispatch(req.method(), req.uri().path()).await;

        if let Some(origin) = allow_origin {
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }

        METRICS.record_request(label, response.status().as_u16(), started.elapsed());
        response
    }

    async fn dispatch(&self, method: &Method, path: &str) -> (&'static str, Response<Full<Bytes>>) {
        let matched = match self.router.at(path) {
            Ok(matched) => matched,
            Err(_) => {
                return (
                    "not_found",
                    error_response(StatusCode::NOT_FOUND, "Not found"),
                )
            }
        };
        let route = *matched.value;
        let raw_slug = matched.params.get("slug");

        if *method == Method::OPTIONS && route != Route::Health {
            return ("preflight", preflight_response());
        }

        match (route, method) {
            (Route::Health, &Method::GET) => ("health", self.health()),
            (Route::Total, &Method::GET) => {
                let result = self.service.total_hits().await;
                ("read_total", hits_or_error("read_total", result))
            }
            (Route::Article, &Method::GET) => {
                let result = match decode_slug(raw_slug) {
                    Ok(slug) => self.service.article_hits(&slug).await,
                    Err(e) => Err(e),
                };
                ("read_article", hits_or_error("read_article", result))
            }
            (Route::ArticleHits, &Method::POST) => {
                let result = match decode_slug(raw_slug) {
                    Ok(slug) => self.service.record_hit(&slug).await,
                    Err(e) => Err(e),
                };
                ("record_hit", hits_or_error("record_hit", result))
            }
            (route, _) => {
                let mut response =
                    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
                response.headers_mut().insert(
                    ALLOW,
                    HeaderValue::from_static(route.allowed_methods()),
                );
                ("method_not_allowed", response)
            }
        }
    }

    fn health(&self) -> Response<Full<Bytes>> {
        json_response(
            StatusCode::OK,
            &HealthResponse {
                status: "healthy".to_string(),
                store: self.service.store_name().to_string(),
            },
        )
    }
}

fn decode_slug(raw: Option<&str>) -> Result<String, ServiceError> {
    let raw = raw.ok_or_else(|| ServiceError::InvalidArgument("slug not provided".to_string()))?;
    urlencoding::decode(raw)
        .map(|slug| slug.into_owned())
        .map_err(|e| ServiceError::InvalidArgument(format!("slug is not valid UTF-8: {e}")))
}

fn hits_or_error(operation: &str, result: Result<u64, ServiceError>) -> Response<Full<Bytes>> {
    match result {
        Ok(hits) => json_response(StatusCode::OK, &HitsResponse { hits }),
        Err(ServiceError::InvalidArgument(reason)) => {
            debug!("{} rejected: {}", operation, reason);
            error_response(StatusCode::BAD_REQUEST, INVALID_ARGUMENT)
        }
        Err(ServiceError::DependencyFailure(e)) => {
            error!("{} failed: {}", operation, e);
            METRICS.record_store_error(operation);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorResponse {
            error: message.to_string(),
        },
    )
}

fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(PREFLIGHT_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, Bytes::from(bytes)),
        Err(e) => {
            error!("Failed to serialize response body: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"error":"Internal error"}"#),
            )
        }
    };
    let mut response = Response::new(Full::new(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
