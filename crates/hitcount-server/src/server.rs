use crate::api::Api;
use crate::metrics::METRICS;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Statistics API server: one task per accepted connection, no shared state
/// besides the counter store behind [`Api`].
pub struct HitsServer {
    listener: TcpListener,
    api: Arc<Api>,
}

impl HitsServer {
    pub async fn bind(addr: SocketAddr, api: Api) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            api: Arc::new(api),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves. In-flight connections finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = &mut shutdown => {
                    info!("Shutting down API listener");
                    return Ok(());
                }
            };
            let Some(stream) = accepted_stream(accepted, "API").await else {
                continue;
            };
            let io = TokioIo::new(stream);
            let api = Arc::clone(&self.api);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let api = Arc::clone(&api);
                    async move { Ok::<_, Infallible>(api.handle(req).await) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Prometheus scrape endpoint on its own listener.
pub async fn serve_metrics<F>(listener: TcpListener, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    info!("Metrics listening on {}", listener.local_addr()?);
    tokio::pin!(shutdown);

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = &mut shutdown => return Ok(()),
        };
        let Some(stream) = accepted_stream(accepted, "metrics").await else {
            continue;
        };
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_metrics))
                .await
            {
                error!("Metrics connection error: {}", e);
            }
        });
    }
}

/// Unwrap an accept result. Failures are logged and skipped; the listener keeps going.
async fn accepted_stream<T>(
    accepted: std::io::Result<(T, SocketAddr)>,
    listener: &str,
) -> Option<T> {
    match accepted {
        Ok((stream, _)) => Some(stream),
        Err(e) => {
            error!("Failed to accept {} connection: {}", listener, e);
            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            None
        }
    }
}

async fn handle_metrics(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(metrics_response(req.method(), req.uri().path()))
}

fn metrics_response(method: &Method, path: &str) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => {
            let mut response = Response::new(Full::new(Bytes::from(METRICS.collect())));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        _ => {
            let mut response = Response::new(Full::new(Bytes::from_static(b"Not found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_error_is_skipped() {
        let failed: std::io::Result<((), SocketAddr)> = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "Too many open files",
        ));
        assert!(accepted_stream(failed, "API").await.is_none());

        let ok: std::io::Result<(u8, SocketAddr)> = Ok((7, "127.0.0.1:1".parse().unwrap()));
        assert_eq!(accepted_stream(ok, "API").await, Some(7));
    }

    #[test]
    fn test_metrics_route() {
        METRICS.record_store_error("read_total");
        let resp = metrics_response(&Method::GET, "/metrics");
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let resp = metrics_response(&Method::GET, "/statistics");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
