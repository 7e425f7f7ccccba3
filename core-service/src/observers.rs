//! Snapshot observers
//!
//! Background tasks that keep the [`ReconciliationState`] of the signed-in
//! user current. One task follows the cloud collection, the other follows the
//! local cache. Both replace their id set on every emission and report the
//! resulting local-only count on the event bus.

use bridge_traits::storage::SnapshotStream;
use core_library::BookListStream;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_sync::ReconciliationState;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handles of the running observer tasks.
#[derive(Default)]
pub(crate) struct ObserverSet {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ObserverSet {
    pub(crate) fn replace(&self, tasks: Vec<JoinHandle<()>>) {
        let previous = std::mem::replace(&mut *self.lock(), tasks);
        abort_all(previous);
    }

    pub(crate) fn stop(&self) -> usize {
        let previous = std::mem::take(&mut *self.lock());
        let stopped = previous.len();
        abort_all(previous);
        stopped
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().iter().any(|task| !task.is_finished())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ObserverSet {
    fn drop(&mut self) {
        self.stop();
    }
}

fn abort_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        task.abort();
    }
}

fn publish_count(event_bus: &EventBus, count: usize) {
    let _ = event_bus.emit(CoreEvent::Library(LibraryEvent::LocalOnlyChanged { count }));
}

/// Follow the cloud collection. A failed emission keeps the last known set.
pub(crate) fn spawn_cloud_observer(
    user_id: String,
    mut snapshots: SnapshotStream,
    state: Arc<ReconciliationState>,
    event_bus: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(snapshot) = snapshots.next().await {
            match snapshot {
                Ok(documents) => {
                    debug!(user_id = %user_id, books = documents.len(), "Cloud snapshot");
                    let count =
                        state.apply_cloud_snapshot(documents.into_iter().map(|doc| doc.id));
                    publish_count(&event_bus, count);
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Cloud snapshot failed; keeping last known ids");
                }
            }
        }
        debug!(user_id = %user_id, "Cloud observer finished");
    })
}

/// Follow the local cache of one user. A failed read keeps the last known set.
pub(crate) fn spawn_local_observer(
    user_id: String,
    mut books: BookListStream,
    state: Arc<ReconciliationState>,
    event_bus: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(snapshot) = books.next().await {
            match snapshot {
                Ok(books) => {
                    debug!(user_id = %user_id, books = books.len(), "Local snapshot");
                    let count = state.apply_local_snapshot(books.into_iter().map(|book| book.id));
                    publish_count(&event_bus, count);
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Local snapshot failed; keeping last known ids");
                }
            }
        }
        debug!(user_id = %user_id, "Local observer finished");
    })
}
