//! Configuration types for the RPC gateway
//!
//! Defines the proxy, health-check, and target configuration model.
//! Loaded from TOML; durations are human-readable strings like
//! "500ms", "10s", or "1m".

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{GatewayError, Result};

/// Top-level gateway configuration
///
/// # Example
///
/// ```toml
/// [proxy]
/// listen = "0.0.0.0:3000"
/// upstream_timeout = "10s"
///
/// [health_checks]
/// interval = "5s"
/// timeout = "1s"
/// failure_threshold = 2
/// success_threshold = 1
///
/// [[targets]]
/// name = "primary"
/// [targets.connection.http]
/// url = "https://rpc.example.com"
/// compression = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Proxy listener and forwarding settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Health check scheduling and thresholds
    #[serde(default)]
    pub health_checks: HealthCheckConfig,

    /// Upstream targets, tried in declared order
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(GatewayError::Config(
                "At least one target must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                return Err(GatewayError::Config(
                    "Target name must not be empty".to_string(),
                ));
            }
            if !names.insert(target.name.as_str()) {
                return Err(GatewayError::Config(format!(
                    "Duplicate target name '{}'",
                    target.name
                )));
            }
            let uri: http::Uri = target.connection.http.url.parse().map_err(|e| {
                GatewayError::Config(format!(
                    "Target '{}' has invalid URL '{}': {}",
                    target.name, target.connection.http.url, e
                ))
            })?;
            if uri.scheme().is_none() || uri.authority().is_none() {
                return Err(GatewayError::Config(format!(
                    "Target '{}' URL '{}' must be absolute",
                    target.name, target.connection.http.url
                )));
            }
        }

        if self.proxy.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(GatewayError::Config(format!(
                "Invalid listen address '{}'",
                self.proxy.listen
            )));
        }

        for (field, value) in [
            ("proxy.upstream_timeout", &self.proxy.upstream_timeout),
            ("health_checks.interval", &self.health_checks.interval),
            ("health_checks.timeout", &self.health_checks.timeout),
        ] {
            if parse_duration(value).is_none() {
                return Err(GatewayError::Config(format!(
                    "Invalid duration '{}' for {}",
                    value, field
                )));
            }
        }

        if self.health_checks.failure_threshold == 0 || self.health_checks.success_threshold == 0 {
            return Err(GatewayError::Config(
                "Health check thresholds must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Proxy listener and forwarding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the proxy listens on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Per-attempt upstream deadline; "0s" disables the deadline
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: String,
}

impl ProxyConfig {
    /// Parsed upstream deadline, None when disabled
    pub fn upstream_deadline(&self) -> Option<Duration> {
        parse_duration(&self.upstream_timeout).filter(|d| !d.is_zero())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstream_timeout: default_upstream_timeout(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_upstream_timeout() -> String {
    "0s".to_string()
}

/// Health check scheduling and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Interval between probes of one target (e.g. "5s")
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Timeout for a single probe request
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Consecutive failures before marking a target unreachable
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive successes before marking a target reachable
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_interval() -> String {
    "5s".to_string()
}

fn default_timeout() -> String {
    "1s".to_string()
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_success_threshold() -> u32 {
    1
}

/// One upstream target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique short identifier, used as health-store key and metric label
    pub name: String,

    /// Connection settings
    pub connection: ConnectionConfig,
}

/// Target connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// HTTP transport settings
    pub http: HttpConnectionConfig,
}

/// HTTP transport settings for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConnectionConfig {
    /// Absolute upstream URL (scheme, host, port, optional base path)
    pub url: String,

    /// Whether the target accepts gzip-compressed request bodies
    #[serde(default)]
    pub compression: bool,
}

/// Parse a duration string like "10s", "500ms", "1m"
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse().ok().map(Duration::from_secs)
    }
}
