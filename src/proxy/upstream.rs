//! Upstream dispatch — the injected HTTP round-trip
//!
//! The round trip is the one seam the proxy abstracts over, so upstream
//! behavior can be scripted in tests. The production implementation wraps
//! a process-wide pooled client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{GatewayError, Result};

/// A prepared request for one upstream attempt
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// HTTP method copied from the client request
    pub method: http::Method,
    /// Fully resolved upstream URL
    pub url: String,
    /// Headers to send, already filtered and rewritten
    pub headers: http::HeaderMap,
    /// Body bytes for this attempt
    pub body: Bytes,
    /// Per-attempt deadline, None for no deadline
    pub timeout: Option<Duration>,
}

/// A buffered response from an upstream target
#[derive(Debug)]
pub struct UpstreamResponse {
    /// HTTP status
    pub status: http::StatusCode,
    /// Response headers as received
    pub headers: http::HeaderMap,
    /// Full response body
    pub body: Bytes,
}

/// One HTTP round trip to an upstream. Errors mean the transport failed
/// before producing a status.
#[async_trait]
pub trait RoundTrip: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// Pooled reqwest-backed round-tripper, shared process-wide
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client with connection pooling
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoundTrip for HttpClient {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let mut builder = self.client.request(request.method, &request.url);
        for (key, value) in request.headers.iter() {
            builder = builder.header(key, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.body(request.body).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout(
                    request.timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
                )
            } else {
                GatewayError::Http(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(GatewayError::Http)?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("connection"));
        assert!(is_hop_by_hop("Keep-Alive"));
        assert!(is_hop_by_hop("Trailer"));
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("Upgrade"));
        assert!(is_hop_by_hop("Proxy-Authorization"));

        assert!(!is_hop_by_hop("Content-Type"));
        assert!(!is_hop_by_hop("Authorization"));
        assert!(!is_hop_by_hop("X-Custom-Header"));
        assert!(!is_hop_by_hop("Host"));
    }

    #[test]
    fn test_upstream_request_clone() {
        let request = UpstreamRequest {
            method: http::Method::POST,
            url: "http://127.0.0.1:8001/".to_string(),
            headers: http::HeaderMap::new(),
            body: Bytes::from_static(b"payload"),
            timeout: Some(Duration::from_secs(5)),
        };
        let cloned = request.clone();
        assert_eq!(cloned.method, request.method);
        assert_eq!(cloned.url, request.url);
        assert_eq!(cloned.body, request.body);
        assert_eq!(cloned.timeout, request.timeout);
    }

    #[test]
    fn test_http_client_default() {
        let _client = HttpClient::default();
    }
}
