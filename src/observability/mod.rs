//! Observability — request and per-target outcome metrics

pub mod metrics;

pub use metrics::{MetricsSnapshot, ProxyMetrics, TargetOutcomes};
