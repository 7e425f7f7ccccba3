//! Local-only tracking
//!
//! Keeps the latest id sets seen from the cloud collection and from the local
//! cache of the active user. Each snapshot replaces its set wholesale; the
//! local-only set is always recomputed as `local - cloud`.

use std::collections::BTreeSet;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

#[derive(Default)]
struct IdSets {
    cloud: BTreeSet<String>,
    local: BTreeSet<String>,
}

impl IdSets {
    fn local_only(&self) -> BTreeSet<String> {
        self.local.difference(&self.cloud).cloned().collect()
    }
}

pub struct ReconciliationState {
    sets: Mutex<IdSets>,
    has_local_only: watch::Sender<bool>,
}

impl Default for ReconciliationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationState {
    pub fn new() -> Self {
        let (has_local_only, _) = watch::channel(false);
        Self {
            sets: Mutex::new(IdSets::default()),
            has_local_only,
        }
    }

    /// Replace the cloud id set. Returns the new local-only count.
    pub fn apply_cloud_snapshot<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.update(|sets| sets.cloud = ids.into_iter().collect())
    }

    /// Replace the local id set. Returns the new local-only count.
    pub fn apply_local_snapshot<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.update(|sets| sets.local = ids.into_iter().collect())
    }

    /// Cached ids with no cloud counterpart, in id order.
    pub fn local_only_ids(&self) -> Vec<String> {
        self.lock().local_only().into_iter().collect()
    }

    pub fn has_local_only(&self) -> bool {
        *self.has_local_only.borrow()
    }

    /// Receiver that always holds whether local-only books exist.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.has_local_only.subscribe()
    }

    /// Forget both sets.
    pub fn clear(&self) {
        self.update(|sets| *sets = IdSets::default());
    }

    fn update(&self, apply: impl FnOnce(&mut IdSets)) -> usize {
        let count = {
            let mut sets = self.lock();
            apply(&mut sets);
            sets.local_only().len()
        };

        let exists = count > 0;
        self.has_local_only.send_if_modified(|current| {
            if *current == exists {
                false
            } else {
                *current = exists;
                true
            }
        });

        debug!(local_only = count, "Reconciliation state updated");
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IdSets> {
        self.sets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_local_only_is_set_difference() {
        let state = ReconciliationState::new();
        state.apply_local_snapshot(ids(&["a", "b", "c"]));
        let count = state.apply_cloud_snapshot(ids(&["b", "z"]));

        assert_eq!(count, 2);
        assert_eq!(state.local_only_ids(), ids(&["a", "c"]));
        assert!(state.has_local_only());
    }

    #[test]
    fn test_snapshots_replace_sets() {
        let state = ReconciliationState::new();
        state.apply_local_snapshot(ids(&["a", "b"]));
        state.apply_local_snapshot(ids(&["b"]));
        state.apply_cloud_snapshot(ids(&["b"]));

        assert!(state.local_only_ids().is_empty());
        assert!(!state.has_local_only());

        state.apply_cloud_snapshot(Vec::new());
        assert_eq!(state.local_only_ids(), ids(&["b"]));
    }

    #[test]
    fn test_watch_only_fires_on_transition() {
        let state = ReconciliationState::new();
        let mut receiver = state.subscribe();
        assert!(!*receiver.borrow_and_update());

        state.apply_local_snapshot(ids(&["a"]));
        assert!(receiver.has_changed().unwrap());
        assert!(*receiver.borrow_and_update());

        state.apply_local_snapshot(ids(&["a", "b"]));
        assert!(!receiver.has_changed().unwrap());

        state.clear();
        assert!(receiver.has_changed().unwrap());
        assert!(!*receiver.borrow_and_update());
        assert!(state.local_only_ids().is_empty());
    }
}
