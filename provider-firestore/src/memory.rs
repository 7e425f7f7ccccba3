//! In-memory cloud store
//!
//! Holds per-user collections in process memory and pushes snapshots to
//! listeners on every write, the way a real-time document store would.
//! Failures can be injected per operation for exercising offline paths.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::{
    CloudBookDocument, CloudBookStore, EngagementUpdate, SnapshotStream,
};
use futures::stream;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

type Collection = BTreeMap<String, CloudBookDocument>;

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Collection>,
    listeners: HashMap<String, watch::Sender<Vec<CloudBookDocument>>>,
    offline: bool,
    failing_writes: HashSet<String>,
    fail_watch: bool,
}

impl MemoryState {
    fn snapshot(&self, user_id: &str) -> Vec<CloudBookDocument> {
        self.collections
            .get(user_id)
            .map(|books| books.values().cloned().collect())
            .unwrap_or_default()
    }

    fn publish(&self, user_id: &str) {
        if let Some(sender) = self.listeners.get(user_id) {
            sender.send_replace(self.snapshot(user_id));
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            Err(BridgeError::ConnectionFailed(
                "cloud store is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn check_write(&self, book_id: &str) -> Result<()> {
        self.check_online()?;
        if self.failing_writes.contains(book_id) {
            return Err(BridgeError::OperationFailed(format!(
                "write rejected for {}",
                book_id
            )));
        }
        Ok(())
    }
}

/// Process-local [`CloudBookStore`].
#[derive(Default)]
pub struct InMemoryCloudStore {
    state: Mutex<MemoryState>,
    calls: AtomicUsize,
}

impl InMemoryCloudStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a document without counting as a call or checking failures.
    pub fn insert(&self, user_id: &str, document: CloudBookDocument) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .collections
            .entry(user_id.to_string())
            .or_default()
            .insert(document.id.clone(), document);
        state.publish(user_id);
    }

    /// Every operation fails with a connectivity error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).offline = offline;
    }

    /// Writes touching `book_id` fail until cleared.
    pub fn fail_writes_for(&self, book_id: impl Into<String>) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .failing_writes
            .insert(book_id.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.offline = false;
        state.fail_watch = false;
        state.failing_writes.clear();
    }

    /// Make listener subscription fail.
    pub fn set_fail_watch(&self, fail: bool) {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).fail_watch = fail;
    }

    /// Snapshot of a user's collection, without counting as a call.
    pub fn documents(&self, user_id: &str) -> Vec<CloudBookDocument> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .snapshot(user_id)
    }

    /// Number of trait operations invoked so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Live listeners on a user's collection.
    pub fn active_listeners(&self, user_id: &str) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .listeners
            .get(user_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CloudBookStore for InMemoryCloudStore {
    async fn upsert(&self, user_id: &str, document: CloudBookDocument) -> Result<()> {
        document.validate().map_err(BridgeError::OperationFailed)?;

        let mut state = self.lock();
        state.check_write(&document.id)?;
        debug!(user_id, book_id = %document.id, "Upserting in-memory document");
        state
            .collections
            .entry(user_id.to_string())
            .or_default()
            .insert(document.id.clone(), document);
        state.publish(user_id);
        Ok(())
    }

    async fn get(&self, user_id: &str, book_id: &str) -> Result<Option<CloudBookDocument>> {
        let state = self.lock();
        state.check_online()?;
        Ok(state
            .collections
            .get(user_id)
            .and_then(|books| books.get(book_id))
            .cloned())
    }

    async fn delete(&self, user_id: &str, book_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.check_write(book_id)?;
        let removed = state
            .collections
            .get_mut(user_id)
            .and_then(|books| books.remove(book_id))
            .is_some();
        if removed {
            state.publish(user_id);
        }
        Ok(())
    }

    async fn update_engagement(
        &self,
        user_id: &str,
        book_id: &str,
        update: EngagementUpdate,
    ) -> Result<()> {
        let mut state = self.lock();
        state.check_write(book_id)?;

        let document = state
            .collections
            .get_mut(user_id)
            .and_then(|books| books.get_mut(book_id))
            .ok_or_else(|| {
                BridgeError::OperationFailed(format!("document {} does not exist", book_id))
            })?;

        let mut updated = document.clone();
        update.apply(&mut updated);
        updated.validate().map_err(BridgeError::OperationFailed)?;
        *document = updated;

        state.publish(user_id);
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<CloudBookDocument>> {
        let state = self.lock();
        state.check_online()?;
        Ok(state.snapshot(user_id))
    }

    async fn watch_collection(&self, user_id: &str) -> Result<SnapshotStream> {
        let mut state = self.lock();
        state.check_online()?;
        if state.fail_watch {
            return Err(BridgeError::OperationFailed(
                "listener registration rejected".to_string(),
            ));
        }

        let current = state.snapshot(user_id);
        let receiver = state
            .listeners
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe();
        drop(state);

        let stream = stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let snapshot = receiver.borrow_and_update().clone();
            Some((Ok(snapshot), (receiver, false)))
        });

        Ok(Box::pin(stream))
    }
}
