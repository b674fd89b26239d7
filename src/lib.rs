//! # rpc-gateway
//!
//! A failover HTTP reverse proxy for RPC endpoints. A client sends one
//! request; the gateway forwards it to the first usable target and
//! transparently retries the next target when the current one is
//! unreachable, answers 5xx, or is known-unhealthy.
//!
//! ## Architecture
//!
//! ```text
//! Client → FailoverProxy → [Target 1, Target 2, …]   (declared order)
//!                ↑ consults
//!        HealthcheckManager ← Probers (one per target)
//! ```
//!
//! ## Core behavior
//!
//! - **Body replay**: the client body is buffered once and replayed
//!   byte-identically on every attempt.
//! - **Per-target compression**: a gzip request body is forwarded as-is to
//!   targets that accept it and decompressed for targets that do not, with
//!   `Content-Length` always matching the bytes actually sent.
//! - **Health view**: background probers flip targets between reachable
//!   and unreachable across configurable thresholds; the proxy taints a
//!   target itself when it observes an error.
//! - **Bootstrap rule**: before any probe has succeeded, all targets are
//!   candidates, so cold starts never fail every request.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rpc_gateway::{config::Config, FailoverProxy, HealthcheckManager};
//!
//! #[tokio::main]
//! async fn main() -> rpc_gateway::Result<()> {
//!     let config = Config::from_file("gateway.toml").await?;
//!     config.validate()?;
//!     // build the manager and proxy, start probers, serve
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod observability;
pub mod proxy;
pub mod server;
pub mod target;

pub use error::{GatewayError, Result};
pub use health::{HealthcheckManager, HealthState, HealthStore};
pub use proxy::FailoverProxy;
pub use target::Target;
