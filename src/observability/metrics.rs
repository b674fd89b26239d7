//! Gateway metrics — lightweight counters for request outcomes
//!
//! In-process metrics without external dependencies, exportable as JSON
//! or rendered as Prometheus text format. Attempt counters are labelled
//! by target name and outcome.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Per-target attempt outcome counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TargetOutcomes {
    /// Attempts that returned a usable response (status < 500)
    pub success: u64,
    /// Attempts that failed in transport or returned 5xx
    pub failure: u64,
    /// Times the proxy tainted the target after a failure
    pub tainted: u64,
}

/// Metrics snapshot — a point-in-time view of all counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total client requests received
    pub total_requests: u64,
    /// Client responses by status class (2xx, 3xx, 4xx, 5xx)
    pub status_classes: HashMap<String, u64>,
    /// Per-target attempt outcomes
    pub target_outcomes: HashMap<String, TargetOutcomes>,
}

/// Gateway metrics collector
pub struct ProxyMetrics {
    total_requests: AtomicU64,
    status_2xx: AtomicU64,
    status_3xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    target_outcomes: RwLock<HashMap<String, TargetOutcomes>>,
}

impl ProxyMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            status_2xx: AtomicU64::new(0),
            status_3xx: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            target_outcomes: RwLock::new(HashMap::new()),
        }
    }

    /// Record a completed client request
    pub fn record_request(&self, status: u16) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match status / 100 {
            2 => {
                self.status_2xx.fetch_add(1, Ordering::Relaxed);
            }
            3 => {
                self.status_3xx.fetch_add(1, Ordering::Relaxed);
            }
            4 => {
                self.status_4xx.fetch_add(1, Ordering::Relaxed);
            }
            5 => {
                self.status_5xx.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Record a successful attempt against a target
    pub fn record_success(&self, target: &str) {
        let mut map = self.target_outcomes.write().unwrap();
        map.entry(target.to_string()).or_default().success += 1;
    }

    /// Record a failed attempt against a target
    pub fn record_failure(&self, target: &str) {
        let mut map = self.target_outcomes.write().unwrap();
        map.entry(target.to_string()).or_default().failure += 1;
    }

    /// Record that the proxy tainted a target
    pub fn record_taint(&self, target: &str) {
        let mut map = self.target_outcomes.write().unwrap();
        map.entry(target.to_string()).or_default().tainted += 1;
    }

    /// Get total client requests
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut status_classes = HashMap::new();
        status_classes.insert("2xx".to_string(), self.status_2xx.load(Ordering::Relaxed));
        status_classes.insert("3xx".to_string(), self.status_3xx.load(Ordering::Relaxed));
        status_classes.insert("4xx".to_string(), self.status_4xx.load(Ordering::Relaxed));
        status_classes.insert("5xx".to_string(), self.status_5xx.load(Ordering::Relaxed));

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            status_classes,
            target_outcomes: self.target_outcomes.read().unwrap().clone(),
        }
    }

    /// Render metrics in Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let snap = self.snapshot();
        let mut output = String::new();

        output.push_str("# HELP gateway_requests_total Total number of client requests\n");
        output.push_str("# TYPE gateway_requests_total counter\n");
        output.push_str(&format!("gateway_requests_total {}\n", snap.total_requests));

        output.push_str("# HELP gateway_responses_total Client responses by status class\n");
        output.push_str("# TYPE gateway_responses_total counter\n");
        for class in ["2xx", "3xx", "4xx", "5xx"] {
            let count = snap.status_classes.get(class).unwrap_or(&0);
            output.push_str(&format!(
                "gateway_responses_total{{status_class=\"{}\"}} {}\n",
                class, count
            ));
        }

        if !snap.target_outcomes.is_empty() {
            output.push_str("# HELP gateway_target_attempts_total Upstream attempts by target and outcome\n");
            output.push_str("# TYPE gateway_target_attempts_total counter\n");
            for (target, outcomes) in &snap.target_outcomes {
                for (outcome, count) in [
                    ("success", outcomes.success),
                    ("failure", outcomes.failure),
                    ("tainted", outcomes.tainted),
                ] {
                    output.push_str(&format!(
                        "gateway_target_attempts_total{{target=\"{}\",outcome=\"{}\"}} {}\n",
                        target, outcome, count
                    ));
                }
            }
        }

        output
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.status_2xx.store(0, Ordering::Relaxed);
        self.status_3xx.store(0, Ordering::Relaxed);
        self.status_4xx.store(0, Ordering::Relaxed);
        self.status_5xx.store(0, Ordering::Relaxed);
        self.target_outcomes.write().unwrap().clear();
    }
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}
