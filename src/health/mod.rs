//! Health checking — background probers and the shared health view
//!
//! The manager owns one prober per configured target and the store the
//! proxy consults on every request. Targets start out unreachable; the
//! proxy's bootstrap rule keeps requests flowing before the first probe
//! completes.

mod prober;
mod store;

pub use prober::Prober;
pub use store::{HealthState, HealthStore};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::HealthCheckConfig;
use crate::target::Target;

/// Owns the probers and exposes the per-target usability view
pub struct HealthcheckManager {
    targets: Vec<Target>,
    config: HealthCheckConfig,
    store: Arc<HealthStore>,
    started: AtomicBool,
}

impl HealthcheckManager {
    /// Create a manager for the configured targets; no tasks run until
    /// `start` is called.
    pub fn new(targets: Vec<Target>, config: HealthCheckConfig) -> Self {
        let store = Arc::new(HealthStore::new(targets.iter().map(|t| t.name.clone())));
        Self {
            targets,
            config,
            store,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn one prober task per target. Later calls are no-ops; the
    /// token cancels every prober on shutdown.
    pub fn start(&self, token: CancellationToken) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        for target in &self.targets {
            let prober = Prober::new(target.clone(), self.store.clone(), &self.config);
            let token = token.clone();
            tokio::spawn(async move {
                prober.run(token).await;
            });
            tracing::info!(target = target.name, url = target.url, "Started prober");
        }
    }

    /// Whether the target is currently usable (reachable and not tainted)
    pub fn is_healthy(&self, name: &str) -> bool {
        self.store.is_usable(name)
    }

    /// Blacklist a target until its next successful probe run
    pub fn taint(&self, name: &str) {
        self.store.taint(name);
        tracing::warn!(target = name, "Target tainted");
    }

    /// Clear a taint administratively
    pub fn untaint(&self, name: &str) {
        self.store.untaint(name);
        tracing::info!(target = name, "Target untainted");
    }

    /// Names of all currently tainted targets
    pub fn tainted_targets(&self) -> Vec<String> {
        self.store.tainted_targets()
    }

    /// Snapshot of every target's health state
    pub fn health_view(&self) -> HashMap<String, HealthState> {
        self.store.all()
    }

    /// Shared store handle, for probers and tests
    pub fn store(&self) -> &Arc<HealthStore> {
        &self.store
    }
}
