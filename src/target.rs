//! Target — immutable descriptor of one upstream RPC endpoint

use crate::config::TargetConfig;

/// One configured upstream. Plain data, shared read-only across the
/// proxy and the health checker. Equality is by name.
#[derive(Debug, Clone)]
pub struct Target {
    /// Unique short identifier within a configuration
    pub name: String,
    /// Absolute upstream URL
    pub url: String,
    /// Whether the target accepts gzip-compressed request bodies
    pub supports_compression: bool,
}

impl Target {
    /// Create a target directly
    pub fn new(name: impl Into<String>, url: impl Into<String>, supports_compression: bool) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            supports_compression,
        }
    }

    /// Build a target from its configuration entry
    pub fn from_config(config: &TargetConfig) -> Self {
        Self {
            name: config.name.clone(),
            url: config.connection.http.url.clone(),
            supports_compression: config.connection.http.compression,
        }
    }

    /// Join the client's path and query onto the target base URL
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path_and_query)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Target {}
