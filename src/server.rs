//! HTTP entrypoints — the client-facing listener and the admin listener
//!
//! Each accepted connection is served on its own task; the proxy executes
//! the failover walk sequentially within that task. The admin listener
//! exposes `/healthz` and `/metrics`.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::health::HealthcheckManager;
use crate::observability::ProxyMetrics;
use crate::proxy::FailoverProxy;

/// Accept loop for the client-facing listener. Returns when the token is
/// cancelled.
pub async fn run(
    listener: TcpListener,
    proxy: Arc<FailoverProxy>,
    token: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Gateway listening");

    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("Gateway listener stopped");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    continue;
                }
            }
        };

        let proxy = proxy.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let proxy = proxy.clone();
                async move { handle_client(req, proxy).await }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, remote = %remote_addr, "Connection ended");
            }
        });
    }
}

/// Collect the client body and hand the request to the proxy
async fn handle_client(
    req: hyper::Request<Incoming>,
    proxy: Arc<FailoverProxy>,
) -> std::result::Result<hyper::Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let response = proxy
        .serve(hyper::Request::from_parts(parts, body_bytes))
        .await;
    let (parts, body) = response.into_parts();
    Ok(hyper::Response::from_parts(parts, Full::new(body)))
}

/// Admin API — serves gateway health and metrics
pub struct AdminApi {
    manager: Arc<HealthcheckManager>,
    metrics: Arc<ProxyMetrics>,
}

impl AdminApi {
    /// Create a new admin API
    pub fn new(manager: Arc<HealthcheckManager>, metrics: Arc<ProxyMetrics>) -> Self {
        Self { manager, metrics }
    }

    /// Handle one admin request path
    pub fn handle(&self, path: &str) -> AdminResponse {
        match path {
            "/healthz" | "/healthz/" => {
                let view = self.manager.health_view();
                let any_usable = view.values().any(|state| state.is_usable());
                let body = serde_json::to_string_pretty(&view).unwrap_or_default();
                AdminResponse {
                    status: if any_usable { 200 } else { 503 },
                    content_type: "application/json".to_string(),
                    body,
                }
            }
            "/metrics" | "/metrics/" => AdminResponse {
                status: 200,
                content_type: "text/plain; version=0.0.4".to_string(),
                body: self.metrics.render_prometheus(),
            },
            _ => AdminResponse {
                status: 404,
                content_type: "application/json".to_string(),
                body: r#"{"error":"Not found"}"#.to_string(),
            },
        }
    }
}

/// Response from the admin API
#[derive(Debug, Clone)]
pub struct AdminResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Type header
    pub content_type: String,
    /// Response body
    pub body: String,
}

/// Accept loop for the admin listener
pub async fn run_admin(
    listener: TcpListener,
    api: Arc<AdminApi>,
    token: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin listening");

    loop {
        let (stream, _remote_addr) = tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("Admin listener stopped");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept admin connection");
                    continue;
                }
            }
        };

        let api = api.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req: hyper::Request<Incoming>| {
                let api = api.clone();
                async move {
                    let response = api.handle(req.uri().path());
                    Ok::<_, hyper::Error>(
                        hyper::Response::builder()
                            .status(response.status)
                            .header("Content-Type", response.content_type)
                            .body(Full::new(Bytes::from(response.body)))
                            .unwrap(),
                    )
                }
            });
            let _ = http1::Builder::new().serve_connection(io, service).await;
        });
    }
}
