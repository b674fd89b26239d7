//! Failover proxy — replays one client request across targets in order
//!
//! The per-request state machine: materialize a replayable body, walk the
//! configured targets in declared order (skipping targets the health
//! manager reports unusable), and mirror the first usable response back
//! to the client. A request never fails because one upstream did.

mod body;
mod upstream;

pub use body::ReplayableBody;
pub use upstream::{is_hop_by_hop, HttpClient, RoundTrip, UpstreamRequest, UpstreamResponse};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};

use crate::config::Config;
use crate::error::GatewayError;
use crate::health::HealthcheckManager;
use crate::observability::ProxyMetrics;
use crate::target::Target;

/// Result of one upstream attempt
enum AttemptOutcome {
    /// Transport succeeded with status < 500
    Success(UpstreamResponse),
    /// Transport succeeded but the upstream answered 5xx
    BadStatus(StatusCode),
    /// The round trip failed before producing a status
    Transport(GatewayError),
}

/// The failover proxy. One instance serves all requests; per-request
/// state lives on the serving task.
pub struct FailoverProxy {
    targets: Vec<Target>,
    manager: Arc<HealthcheckManager>,
    client: Arc<dyn RoundTrip>,
    metrics: Arc<ProxyMetrics>,
    upstream_timeout: Option<Duration>,
}

impl FailoverProxy {
    /// Create a proxy with the shared pooled HTTP client
    pub fn new(config: &Config, manager: Arc<HealthcheckManager>) -> Self {
        Self::with_round_trip(config, manager, Arc::new(HttpClient::new()))
    }

    /// Create a proxy with an injected round-tripper
    pub fn with_round_trip(
        config: &Config,
        manager: Arc<HealthcheckManager>,
        client: Arc<dyn RoundTrip>,
    ) -> Self {
        let targets = config.targets.iter().map(Target::from_config).collect();
        Self {
            targets,
            manager,
            client,
            metrics: Arc::new(ProxyMetrics::new()),
            upstream_timeout: config.proxy.upstream_deadline(),
        }
    }

    /// Shared metrics collector
    pub fn metrics(&self) -> Arc<ProxyMetrics> {
        self.metrics.clone()
    }

    /// Handle one client request end to end. Never returns an error; every
    /// failure mode maps to an HTTP response.
    pub async fn serve(&self, req: Request<Bytes>) -> Response<Bytes> {
        let response = self.dispatch(req).await;
        self.metrics.record_request(response.status().as_u16());
        response
    }

    async fn dispatch(&self, req: Request<Bytes>) -> Response<Bytes> {
        let (parts, raw_body) = req.into_parts();

        let content_encoding = parts
            .headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        let replayable = match ReplayableBody::materialize(raw_body, content_encoding) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting request with unreadable body");
                return status_response(StatusCode::BAD_REQUEST);
            }
        };

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let candidates = self.candidates();
        let attempts = candidates.len();

        for target in candidates {
            match self
                .attempt(target, &parts, path_and_query, &replayable)
                .await
            {
                AttemptOutcome::Success(response) => {
                    tracing::debug!(
                        target = target.name,
                        status = response.status.as_u16(),
                        "Upstream attempt succeeded"
                    );
                    self.metrics.record_success(&target.name);
                    return upstream_to_client(response);
                }
                AttemptOutcome::BadStatus(status) => {
                    tracing::warn!(
                        target = target.name,
                        status = status.as_u16(),
                        "Upstream returned server error, trying next target"
                    );
                    self.record_failed_attempt(&target.name);
                }
                AttemptOutcome::Transport(e) => {
                    tracing::warn!(
                        target = target.name,
                        error = %e,
                        "Upstream transport failed, trying next target"
                    );
                    self.record_failed_attempt(&target.name);
                }
            }
        }

        tracing::error!(attempts, "All targets exhausted");
        status_response(StatusCode::SERVICE_UNAVAILABLE)
    }

    /// Targets to try, in declared order. When no target is usable yet
    /// (cold start, manager never started) every target is a candidate.
    fn candidates(&self) -> Vec<&Target> {
        let usable: Vec<&Target> = self
            .targets
            .iter()
            .filter(|t| self.manager.is_healthy(&t.name))
            .collect();
        if usable.is_empty() {
            self.targets.iter().collect()
        } else {
            usable
        }
    }

    /// Build and dispatch the upstream request for one target
    async fn attempt(
        &self,
        target: &Target,
        parts: &http::request::Parts,
        path_and_query: &str,
        body: &ReplayableBody,
    ) -> AttemptOutcome {
        let (body_bytes, encoding) = body.for_target(target);

        // Copy client headers minus hop-by-hop ones. Content-Encoding and
        // Content-Length are rewritten per target; Host comes from the
        // upstream URL.
        let mut headers = HeaderMap::new();
        for (key, value) in parts.headers.iter() {
            let name = key.as_str();
            if is_hop_by_hop(name)
                || name == "content-encoding"
                || name == "content-length"
                || name == "host"
            {
                continue;
            }
            headers.append(key.clone(), value.clone());
        }
        if let Some(enc) = encoding {
            if let Ok(value) = HeaderValue::from_str(enc) {
                headers.insert(CONTENT_ENCODING, value);
            }
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body_bytes.len()));

        let request = UpstreamRequest {
            method: parts.method.clone(),
            url: target.upstream_url(path_and_query),
            headers,
            body: body_bytes,
            timeout: self.upstream_timeout,
        };

        match self.client.send(request).await {
            Ok(response) if response.status.as_u16() < 500 => AttemptOutcome::Success(response),
            Ok(response) => AttemptOutcome::BadStatus(response.status),
            Err(e) => AttemptOutcome::Transport(e),
        }
    }

    fn record_failed_attempt(&self, target: &str) {
        self.metrics.record_failure(target);
        self.manager.taint(target);
        self.metrics.record_taint(target);
    }
}

/// Mirror an upstream response to the client, minus hop-by-hop headers
fn upstream_to_client(response: UpstreamResponse) -> Response<Bytes> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers.iter() {
        if is_hop_by_hop(key.as_str()) {
            continue;
        }
        builder = builder.header(key, value);
    }
    builder.body(response.body).unwrap()
}

fn status_response(status: StatusCode) -> Response<Bytes> {
    Response::builder().status(status).body(Bytes::new()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ConnectionConfig, HealthCheckConfig, HttpConnectionConfig, ProxyConfig, TargetConfig,
    };
    use async_trait::async_trait;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::Mutex;

    /// Round-tripper that pops scripted outcomes and records every request
    struct ScriptedRoundTrip {
        outcomes: Mutex<VecDeque<crate::error::Result<UpstreamResponse>>>,
        calls: Mutex<Vec<UpstreamRequest>>,
    }

    impl ScriptedRoundTrip {
        fn new(outcomes: Vec<crate::error::Result<UpstreamResponse>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<UpstreamRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RoundTrip for ScriptedRoundTrip {
        async fn send(&self, request: UpstreamRequest) -> crate::error::Result<UpstreamResponse> {
            self.calls.lock().unwrap().push(request);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Other("script exhausted".into())))
        }
    }

    fn ok_response(body: &'static [u8]) -> crate::error::Result<UpstreamResponse> {
        Ok(UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body),
        })
    }

    fn status_only(status: u16) -> crate::error::Result<UpstreamResponse> {
        Ok(UpstreamResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    fn transport_error() -> crate::error::Result<UpstreamResponse> {
        Err(GatewayError::Other("connection refused".into()))
    }

    fn target_config(name: &str, url: &str, compression: bool) -> TargetConfig {
        TargetConfig {
            name: name.to_string(),
            connection: ConnectionConfig {
                http: HttpConnectionConfig {
                    url: url.to_string(),
                    compression,
                },
            },
        }
    }

    fn make_config(targets: Vec<TargetConfig>) -> Config {
        Config {
            proxy: ProxyConfig::default(),
            health_checks: HealthCheckConfig::default(),
            targets,
        }
    }

    fn make_proxy(
        config: &Config,
        client: Arc<ScriptedRoundTrip>,
    ) -> (FailoverProxy, Arc<HealthcheckManager>) {
        let targets = config.targets.iter().map(Target::from_config).collect();
        let manager = Arc::new(HealthcheckManager::new(
            targets,
            config.health_checks.clone(),
        ));
        let proxy = FailoverProxy::with_round_trip(config, manager.clone(), client);
        (proxy, manager)
    }

    fn post(body: &'static [u8]) -> Request<Bytes> {
        Request::builder()
            .method("POST")
            .uri("/")
            .body(Bytes::from_static(body))
            .unwrap()
    }

    fn gzip(data: &[u8]) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    #[tokio::test]
    async fn test_first_target_success() {
        let client = ScriptedRoundTrip::new(vec![ok_response(b"pong")]);
        let config = make_config(vec![target_config("t1", "http://t1:8001", false)]);
        let (proxy, _) = make_proxy(&config, client.clone());

        let response = proxy.serve(post(b"ping")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"pong");
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failover_in_declared_order() {
        let client = ScriptedRoundTrip::new(vec![
            status_only(500),
            transport_error(),
            ok_response(b"third"),
        ]);
        let config = make_config(vec![
            target_config("t1", "http://t1:8001", false),
            target_config("t2", "http://t2:8002", false),
            target_config("t3", "http://t3:8003", false),
        ]);
        let (proxy, _) = make_proxy(&config, client.clone());

        let response = proxy.serve(post(b"ping")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"third");

        let calls = client.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].url.starts_with("http://t1:8001"));
        assert!(calls[1].url.starts_with("http://t2:8002"));
        assert!(calls[2].url.starts_with("http://t3:8003"));
    }

    #[tokio::test]
    async fn test_bootstrap_pass_through_without_probes() {
        // Manager never started: no target is reachable, yet all targets
        // must still be attempted in order.
        let client = ScriptedRoundTrip::new(vec![status_only(500), ok_response(b"ok")]);
        let config = make_config(vec![
            target_config("t1", "http://t1:8001", false),
            target_config("t2", "http://t2:8002", false),
        ]);
        let (proxy, _) = make_proxy(&config, client.clone());

        let response = proxy.serve(post(b"ping")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unusable_targets_are_skipped() {
        let client = ScriptedRoundTrip::new(vec![ok_response(b"ok")]);
        let config = make_config(vec![
            target_config("t1", "http://t1:8001", false),
            target_config("t2", "http://t2:8002", false),
        ]);
        let (proxy, manager) = make_proxy(&config, client.clone());

        // Only t2 is usable; t1 must not be attempted.
        manager.store().update("t2", |s| s.reachable = true);

        let response = proxy.serve(post(b"ping")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].url.starts_with("http://t2:8002"));
    }

    #[tokio::test]
    async fn test_all_targets_exhausted_returns_503() {
        let client = ScriptedRoundTrip::new(vec![status_only(500), transport_error()]);
        let config = make_config(vec![
            target_config("t1", "http://t1:8001", false),
            target_config("t2", "http://t2:8002", false),
        ]);
        let (proxy, manager) = make_proxy(&config, client.clone());

        let response = proxy.serve(post(b"ping")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.body().is_empty());

        let mut tainted = manager.tainted_targets();
        tainted.sort();
        assert_eq!(tainted, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_attempt_taints_target() {
        let client = ScriptedRoundTrip::new(vec![status_only(502), ok_response(b"ok")]);
        let config = make_config(vec![
            target_config("t1", "http://t1:8001", false),
            target_config("t2", "http://t2:8002", false),
        ]);
        let (proxy, manager) = make_proxy(&config, client.clone());

        proxy.serve(post(b"ping")).await;
        assert_eq!(manager.tainted_targets(), vec!["t1".to_string()]);

        let snap = proxy.metrics().snapshot();
        assert_eq!(snap.target_outcomes["t1"].failure, 1);
        assert_eq!(snap.target_outcomes["t1"].tainted, 1);
        assert_eq!(snap.target_outcomes["t2"].success, 1);
    }

    #[tokio::test]
    async fn test_4xx_is_returned_as_is() {
        let client = ScriptedRoundTrip::new(vec![status_only(404)]);
        let config = make_config(vec![
            target_config("t1", "http://t1:8001", false),
            target_config("t2", "http://t2:8002", false),
        ]);
        let (proxy, manager) = make_proxy(&config, client.clone());

        let response = proxy.serve(post(b"ping")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(client.calls().len(), 1);
        assert!(manager.tainted_targets().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_gzip_returns_400_without_attempts() {
        let client = ScriptedRoundTrip::new(vec![ok_response(b"never")]);
        let config = make_config(vec![target_config("t1", "http://t1:8001", false)]);
        let (proxy, _) = make_proxy(&config, client.clone());

        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header("Content-Encoding", "gzip")
            .body(Bytes::from_static(b"not gzip at all"))
            .unwrap();

        let response = proxy.serve(req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_request_headers_rewritten() {
        let client = ScriptedRoundTrip::new(vec![ok_response(b"ok")]);
        let config = make_config(vec![target_config("t1", "http://t1:8001", false)]);
        let (proxy, _) = make_proxy(&config, client.clone());

        let payload = br#"{"body": "content"}"#;
        let req = Request::builder()
            .method("POST")
            .uri("/rpc?chain=main")
            .header("Content-Encoding", "gzip")
            .header("Content-Length", "999")
            .header("Connection", "keep-alive")
            .header("TE", "trailers")
            .header("Host", "gateway.local")
            .header("X-Request-Id", "abc123")
            .body(gzip(payload))
            .unwrap();

        proxy.serve(req).await;

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.url, "http://t1:8001/rpc?chain=main");
        assert_eq!(call.method, http::Method::POST);

        // Decompressed for a non-compression target: no Content-Encoding,
        // recomputed Content-Length, body is the plain payload.
        assert!(call.headers.get("content-encoding").is_none());
        assert_eq!(
            call.headers.get("content-length").unwrap(),
            &payload.len().to_string()
        );
        assert_eq!(call.body.as_ref(), payload);

        // Hop-by-hop and Host dropped, end-to-end headers preserved.
        assert!(call.headers.get("connection").is_none());
        assert!(call.headers.get("te").is_none());
        assert!(call.headers.get("host").is_none());
        assert_eq!(call.headers.get("x-request-id").unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_gzip_passthrough_for_compressing_target() {
        let client = ScriptedRoundTrip::new(vec![ok_response(b"ok")]);
        let config = make_config(vec![target_config("t1", "http://t1:8001", true)]);
        let (proxy, _) = make_proxy(&config, client.clone());

        let compressed = gzip(br#"{"body": "content"}"#);
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header("Content-Encoding", "gzip")
            .body(compressed.clone())
            .unwrap();

        proxy.serve(req).await;

        let calls = client.calls();
        let call = &calls[0];
        assert_eq!(call.headers.get("content-encoding").unwrap(), "gzip");
        assert_eq!(
            call.headers.get("content-length").unwrap(),
            &compressed.len().to_string()
        );
        assert_eq!(call.body, compressed);
    }

    #[tokio::test]
    async fn test_replay_is_byte_identical_across_attempts() {
        let client = ScriptedRoundTrip::new(vec![status_only(500), ok_response(b"ok")]);
        let config = make_config(vec![
            target_config("t1", "http://t1:8001", false),
            target_config("t2", "http://t2:8002", false),
        ]);
        let (proxy, _) = make_proxy(&config, client.clone());

        proxy.serve(post(b"{\"this_is\": \"body\"}")).await;

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].body, calls[1].body);
        assert_eq!(
            calls[0].headers.get("content-length"),
            calls[1].headers.get("content-length")
        );
    }

    #[tokio::test]
    async fn test_response_hop_by_hop_headers_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("close"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let client = ScriptedRoundTrip::new(vec![Ok(UpstreamResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"{}"),
        })]);
        let config = make_config(vec![target_config("t1", "http://t1:8001", false)]);
        let (proxy, _) = make_proxy(&config, client);

        let response = proxy.serve(post(b"ping")).await;
        assert!(response.headers().get("connection").is_none());
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_metrics_record_client_status() {
        let client = ScriptedRoundTrip::new(vec![ok_response(b"ok")]);
        let config = make_config(vec![target_config("t1", "http://t1:8001", false)]);
        let (proxy, _) = make_proxy(&config, client);

        proxy.serve(post(b"ping")).await;

        let snap = proxy.metrics().snapshot();
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.status_classes["2xx"], 1);
    }
}
