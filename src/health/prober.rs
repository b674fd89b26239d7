//! Prober — periodic liveness checks for one upstream target

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{parse_duration, HealthCheckConfig};
use crate::health::HealthStore;
use crate::target::Target;

/// Background task that probes a single target on a fixed interval and
/// drives its reachability transitions in the shared store.
pub struct Prober {
    target: Target,
    store: Arc<HealthStore>,
    client: reqwest::Client,
    interval: Duration,
    failure_threshold: u32,
    success_threshold: u32,
}

impl Prober {
    /// Create a prober with a dedicated probe client
    pub fn new(target: Target, store: Arc<HealthStore>, config: &HealthCheckConfig) -> Self {
        let timeout = parse_duration(&config.timeout).unwrap_or(Duration::from_secs(1));
        let interval = parse_duration(&config.interval).unwrap_or(Duration::from_secs(5));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            target,
            store,
            client,
            interval,
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
        }
    }

    /// Run the probe loop until the token is cancelled. Probe errors are
    /// never propagated; they only advance the failure counter.
    pub async fn run(self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(target = self.target.name, "Prober stopped");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            // A probe interrupted by shutdown records no outcome.
            let success = tokio::select! {
                _ = token.cancelled() => return,
                outcome = self.probe() => outcome,
            };

            self.record(success);
        }
    }

    /// One liveness call: success iff transport succeeded and status < 500
    async fn probe(&self) -> bool {
        match self.client.get(&self.target.url).send().await {
            Ok(response) => {
                let status = response.status();
                let ok = status.as_u16() < 500;
                tracing::debug!(
                    target = self.target.name,
                    status = status.as_u16(),
                    ok,
                    "Probe completed"
                );
                ok
            }
            Err(e) => {
                tracing::debug!(target = self.target.name, error = %e, "Probe failed");
                false
            }
        }
    }

    /// Apply one probe outcome to the shared state
    fn record(&self, success: bool) {
        self.store.update(&self.target.name, |state| {
            if success {
                state.consecutive_successes += 1;
                state.consecutive_failures = 0;
                if !state.reachable && state.consecutive_successes >= self.success_threshold {
                    state.reachable = true;
                    state.tainted = false;
                    tracing::info!(target = self.target.name, "Target marked reachable");
                }
            } else {
                state.consecutive_failures += 1;
                state.consecutive_successes = 0;
                if state.reachable && state.consecutive_failures >= self.failure_threshold {
                    state.reachable = false;
                    tracing::warn!(
                        target = self.target.name,
                        failures = state.consecutive_failures,
                        "Target marked unreachable"
                    );
                }
            }
        });
    }
}
