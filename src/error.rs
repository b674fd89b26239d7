//! Centralized error types for the RPC gateway

use thiserror::Error;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration parsing or validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Client request body could not be materialized (e.g. malformed gzip)
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Request to upstream timed out
    #[error("Upstream timeout after {0}ms")]
    UpstreamTimeout(u64),

    /// Every candidate target was tried without a usable response
    #[error("All targets exhausted after {0} attempts")]
    TargetsExhausted(usize),

    /// HTTP request or response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;
