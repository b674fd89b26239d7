//! Shared health view — per-target state with atomic per-key updates

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Health state of one target
///
/// `reachable` is driven by the prober crossing its thresholds; `tainted`
/// is set by the proxy when it observes an upstream error and cleared on
/// the next successful probe run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    /// Probes have crossed the success threshold
    pub reachable: bool,
    /// Blacklisted by the proxy until the next successful probe run
    pub tainted: bool,
    /// Length of the current success run
    pub consecutive_successes: u32,
    /// Length of the current failure run
    pub consecutive_failures: u32,
}

impl HealthState {
    /// A target is usable iff reachable and not tainted
    pub fn is_usable(&self) -> bool {
        self.reachable && !self.tainted
    }
}

/// Concurrency-safe map from target name to health state
///
/// Every entry is seeded at construction; reads copy the state out so the
/// request path never holds the lock across an await point.
pub struct HealthStore {
    entries: RwLock<HashMap<String, HealthState>>,
}

impl HealthStore {
    /// Seed the store with one default entry per target name
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let entries = names
            .into_iter()
            .map(|name| (name, HealthState::default()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Snapshot the state of one target; unknown names read as default
    pub fn get(&self, name: &str) -> HealthState {
        let entries = self.entries.read().unwrap();
        entries.get(name).copied().unwrap_or_default()
    }

    /// Atomically read-modify-write one entry, returning the new state
    pub fn update(&self, name: &str, f: impl FnOnce(&mut HealthState)) -> HealthState {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(name.to_string()).or_default();
        f(entry);
        *entry
    }

    /// Blacklist a target until its next successful probe run
    pub fn taint(&self, name: &str) {
        self.update(name, |state| state.tainted = true);
    }

    /// Clear the taint flag
    pub fn untaint(&self, name: &str) {
        self.update(name, |state| state.tainted = false);
    }

    /// Whether the target is reachable and not tainted
    pub fn is_usable(&self, name: &str) -> bool {
        self.get(name).is_usable()
    }

    /// Names of all currently tainted targets
    pub fn tainted_targets(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter(|(_, state)| state.tainted)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Snapshot of every entry, for the health endpoint
    pub fn all(&self) -> HashMap<String, HealthState> {
        self.entries.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(names: &[&str]) -> HealthStore {
        HealthStore::new(names.iter().map(|n| n.to_string()))
    }

    #[test]
    fn test_initial_state_not_usable() {
        let store = store_with(&["primary"]);
        let state = store.get("primary");
        assert!(!state.reachable);
        assert!(!state.tainted);
        assert_eq!(state.consecutive_successes, 0);
        assert_eq!(state.consecutive_failures, 0);
        assert!(!store.is_usable("primary"));
    }

    #[test]
    fn test_unknown_target_reads_default() {
        let store = store_with(&[]);
        assert_eq!(store.get("ghost"), HealthState::default());
        assert!(!store.is_usable("ghost"));
    }

    #[test]
    fn test_update_returns_new_state() {
        let store = store_with(&["primary"]);
        let state = store.update("primary", |s| {
            s.reachable = true;
            s.consecutive_successes = 3;
        });
        assert!(state.reachable);
        assert_eq!(state.consecutive_successes, 3);
        assert_eq!(store.get("primary"), state);
    }

    #[test]
    fn test_taint_and_untaint() {
        let store = store_with(&["primary"]);
        store.update("primary", |s| s.reachable = true);
        assert!(store.is_usable("primary"));

        store.taint("primary");
        assert!(!store.is_usable("primary"));
        assert!(store.get("primary").reachable);

        store.untaint("primary");
        assert!(store.is_usable("primary"));
    }

    #[test]
    fn test_keys_are_independent() {
        let store = store_with(&["a", "b"]);
        store.update("a", |s| s.reachable = true);
        store.taint("b");

        assert!(store.is_usable("a"));
        assert!(!store.get("a").tainted);
        assert!(store.get("b").tainted);
        assert!(!store.get("b").reachable);
    }

    #[test]
    fn test_tainted_targets() {
        let store = store_with(&["a", "b", "c"]);
        store.taint("a");
        store.taint("c");

        let mut tainted = store.tainted_targets();
        tainted.sort();
        assert_eq!(tainted, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_all_snapshot() {
        let store = store_with(&["a", "b"]);
        store.update("a", |s| s.reachable = true);
        let all = store.all();
        assert_eq!(all.len(), 2);
        assert!(all["a"].reachable);
        assert!(!all["b"].reachable);
    }
}
