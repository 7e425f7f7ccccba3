//! # Sync Reconciler
//!
//! Keeps the local saved-book cache and the cloud collection of the signed-in
//! user in step.
//!
//! ## Workflow
//!
//! ### Save
//! 1. Resolve the current user (no user: fail before any I/O)
//! 2. Insert-or-replace the local row (failure: no cloud call)
//! 3. Upsert the cloud document (failure: local row is kept)
//!
//! ### Pull
//! 1. Subscribe to the cloud collection and take the first snapshot
//! 2. Release the subscription
//! 3. Upsert every document into the local cache
//!
//! ### Migration
//! 1. Upload each local-only book to the cloud, one at a time
//! 2. Run a pull so the cache matches the cloud
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncReconciler};
//!
//! let reconciler = SyncReconciler::new(local, cloud, identity, event_bus, SyncConfig::default());
//! reconciler.save_book(&book).await?;
//! let report = reconciler.sync_with_cloud().await?;
//! ```

use crate::{Result, SyncError};
use bridge_traits::error::BridgeError;
use bridge_traits::identity::IdentityProvider;
use bridge_traits::storage::{CloudBookStore, EngagementUpdate, MAX_READING_PROGRESS};
use bridge_traits::time::{Clock, SystemClock};
use core_library::{Book, BookListStream, LibraryError, SavedBookRepository};
use core_runtime::config::{MigrationPolicy, PullFailurePolicy, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent, SyncKind};
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Reconciler configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// What a pull does when one record cannot be cached
    pub pull_failure_policy: PullFailurePolicy,

    /// What a migration does when one upload fails
    pub migration_policy: MigrationPolicy,
}

impl From<SyncSettings> for SyncConfig {
    fn from(settings: SyncSettings) -> Self {
        Self {
            pull_failure_policy: settings.pull_failure_policy,
            migration_policy: settings.migration_policy,
        }
    }
}

/// Outcome of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Documents written to the local cache
    pub synced: usize,
    /// Ids that could not be cached (`SkipAndContinue` only)
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFailure {
    pub book_id: String,
    pub message: String,
}

/// Outcome of a local-only migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub failed: Vec<MigrationFailure>,
    /// Pull run after the uploads; `None` when nothing was attempted
    pub pull: Option<PullReport>,
}

impl MigrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SyncReconciler {
    local: Arc<dyn SavedBookRepository>,
    cloud: Arc<dyn CloudBookStore>,
    identity: Arc<dyn IdentityProvider>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl SyncReconciler {
    pub fn new(
        local: Arc<dyn SavedBookRepository>,
        cloud: Arc<dyn CloudBookStore>,
        identity: Arc<dyn IdentityProvider>,
        event_bus: EventBus,
        config: SyncConfig,
    ) -> Self {
        Self {
            local,
            cloud,
            identity,
            event_bus,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Clock used for the cloud `savedDate`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> SyncConfig {
        self.config
    }

    fn current_user_id(&self) -> Result<String> {
        self.identity
            .current_user()
            .map(|user| user.uid)
            .ok_or(SyncError::Authentication)
    }

    fn emit(&self, event: CoreEvent) {
        let _ = self.event_bus.emit(event);
    }

    fn defer_cloud_write(&self, book_id: &str, error: &BridgeError) {
        self.emit(CoreEvent::Sync(SyncEvent::CloudWriteDeferred {
            book_id: book_id.to_string(),
            message: error.to_string(),
        }));
    }

    /// Save a book for the current user, local cache first.
    #[instrument(skip(self, book), fields(book_id = %book.id))]
    pub async fn save_book(&self, book: &Book) -> Result<()> {
        let user_id = self.current_user_id()?;

        self.local.upsert(book, &user_id).await?;
        debug!(user_id = %user_id, "Book cached locally");

        let document = book.to_cloud_document(self.clock.unix_timestamp_millis());
        if let Err(e) = self.cloud.upsert(&user_id, document).await {
            warn!(user_id = %user_id, error = %e, "Cloud save failed; local copy kept");
            self.defer_cloud_write(&book.id, &e);
            return Err(e.into());
        }

        info!(user_id = %user_id, "Book saved");
        self.emit(CoreEvent::Library(LibraryEvent::BookSaved {
            book_id: book.id.clone(),
            title: book.title.clone(),
        }));
        Ok(())
    }

    /// Delete a book for the current user.
    ///
    /// Unknown ids succeed. A failed cloud delete is logged and reported as a
    /// deferred write; the call still succeeds.
    #[instrument(skip(self))]
    pub async fn delete_book(&self, book_id: &str) -> Result<()> {
        let user_id = self.current_user_id()?;

        let removed = self.local.delete(book_id, &user_id).await?;
        debug!(user_id = %user_id, removed, "Local row deleted");

        if let Err(e) = self.cloud.delete(&user_id, book_id).await {
            warn!(user_id = %user_id, error = %e, "Cloud delete failed; local row already removed");
            self.defer_cloud_write(book_id, &e);
        }

        self.emit(CoreEvent::Library(LibraryEvent::BookDeleted {
            book_id: book_id.to_string(),
        }));
        Ok(())
    }

    /// Pull the cloud collection into the local cache.
    #[instrument(skip(self))]
    pub async fn sync_with_cloud(&self) -> Result<PullReport> {
        let user_id = self.current_user_id()?;
        let started = Instant::now();

        self.emit(CoreEvent::Sync(SyncEvent::Started {
            user_id: user_id.clone(),
            kind: SyncKind::Pull,
        }));

        let documents = match self.first_cloud_snapshot(&user_id).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Cloud snapshot unavailable");
                self.emit_failed(&user_id, SyncKind::Pull, &e);
                return Err(e.into());
            }
        };

        let mut report = PullReport::default();
        for document in &documents {
            let book = Book::from_cloud_document(document);
            match self.local.upsert(&book, &user_id).await {
                Ok(()) => report.synced += 1,
                Err(source) => match self.config.pull_failure_policy {
                    PullFailurePolicy::AbortBatch => {
                        warn!(user_id = %user_id, book_id = %book.id, error = %source, "Pull aborted");
                        let error = SyncError::Conflict {
                            item_id: book.id.clone(),
                            source,
                        };
                        self.emit_failed(&user_id, SyncKind::Pull, &error);
                        return Err(error);
                    }
                    PullFailurePolicy::SkipAndContinue => {
                        warn!(user_id = %user_id, book_id = %book.id, error = %source, "Skipping record");
                        report.skipped.push(book.id.clone());
                    }
                },
            }
        }

        info!(
            user_id = %user_id,
            synced = report.synced,
            skipped = report.skipped.len(),
            "Pull completed"
        );
        self.emit(CoreEvent::Sync(SyncEvent::Completed {
            user_id,
            kind: SyncKind::Pull,
            items_synced: report.synced as u64,
            items_skipped: report.skipped.len() as u64,
            duration_ms: started.elapsed().as_millis() as u64,
        }));
        Ok(report)
    }

    async fn first_cloud_snapshot(
        &self,
        user_id: &str,
    ) -> std::result::Result<Vec<bridge_traits::storage::CloudBookDocument>, BridgeError> {
        let mut snapshots = self.cloud.watch_collection(user_id).await?;
        let first = snapshots.next().await;
        drop(snapshots);

        match first {
            Some(snapshot) => snapshot,
            None => Err(BridgeError::OperationFailed(
                "cloud subscription closed before the first snapshot".to_string(),
            )),
        }
    }

    fn emit_failed(&self, user_id: &str, kind: SyncKind, error: &dyn std::fmt::Display) {
        self.emit(CoreEvent::Sync(SyncEvent::Failed {
            user_id: user_id.to_string(),
            kind,
            message: error.to_string(),
        }));
    }

    /// Live list of the current user's cached books, ordered by title.
    ///
    /// Never yields an error: failed reads become empty lists and the stream
    /// keeps going. Without a signed-in user it yields one empty list.
    pub fn saved_books(&self) -> BookListStream {
        let user_id = match self.current_user_id() {
            Ok(user_id) => user_id,
            Err(_) => {
                debug!("No user; saved books stream is empty");
                return Box::pin(stream::once(async { Ok::<_, LibraryError>(Vec::new()) }));
            }
        };

        Box::pin(self.local.watch_user_books(&user_id).map(move |snapshot| {
            Ok::<_, LibraryError>(snapshot.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read saved books");
                Vec::new()
            }))
        }))
    }

    /// Whether the current user has cached the book.
    pub async fn is_book_saved(&self, book_id: &str) -> Result<bool> {
        let user_id = self.current_user_id()?;
        Ok(self.local.exists(book_id, &user_id).await?)
    }

    /// Cached copy of a book for the current user.
    pub async fn cached_book(&self, book_id: &str) -> Result<Option<Book>> {
        let user_id = self.current_user_id()?;
        Ok(self.local.find(book_id, &user_id).await?)
    }

    /// Upload local-only books to the cloud, then pull.
    #[instrument(skip(self, books), fields(count = books.len()))]
    pub async fn migrate_local_only(&self, books: Vec<Book>) -> Result<MigrationReport> {
        let user_id = self.current_user_id()?;
        if books.is_empty() {
            debug!("Nothing to migrate");
            return Ok(MigrationReport::default());
        }

        let started = Instant::now();
        self.emit(CoreEvent::Sync(SyncEvent::Started {
            user_id: user_id.clone(),
            kind: SyncKind::Migration,
        }));

        let mut report = MigrationReport::default();
        for book in &books {
            let document = book.to_cloud_document(self.clock.unix_timestamp_millis());
            match self.cloud.upsert(&user_id, document).await {
                Ok(()) => report.migrated += 1,
                Err(e) => {
                    warn!(user_id = %user_id, book_id = %book.id, error = %e, "Migration upload failed");
                    report.failed.push(MigrationFailure {
                        book_id: book.id.clone(),
                        message: e.to_string(),
                    });
                    if self.config.migration_policy == MigrationPolicy::StopOnFirstError {
                        break;
                    }
                }
            }
        }

        info!(
            user_id = %user_id,
            migrated = report.migrated,
            failed = report.failed.len(),
            "Local-only books uploaded"
        );
        self.emit(CoreEvent::Library(LibraryEvent::BooksMigrated {
            migrated: report.migrated,
            failed: report.failed.len(),
        }));
        self.emit(CoreEvent::Sync(SyncEvent::Completed {
            user_id,
            kind: SyncKind::Migration,
            items_synced: report.migrated as u64,
            items_skipped: report.failed.len() as u64,
            duration_ms: started.elapsed().as_millis() as u64,
        }));

        report.pull = Some(self.sync_with_cloud().await?);
        Ok(report)
    }

    pub async fn update_reading_progress(&self, book_id: &str, progress: u8) -> Result<()> {
        if progress > MAX_READING_PROGRESS {
            return Err(SyncError::InvalidInput(format!(
                "reading progress must be between 0 and {}, got {}",
                MAX_READING_PROGRESS, progress
            )));
        }
        self.update_engagement(book_id, EngagementUpdate::ReadingProgress(progress))
            .await
    }

    pub async fn set_liked(&self, book_id: &str, liked: bool) -> Result<()> {
        self.update_engagement(book_id, EngagementUpdate::Liked(liked))
            .await
    }

    pub async fn update_notes(&self, book_id: &str, notes: impl Into<String>) -> Result<()> {
        self.update_engagement(book_id, EngagementUpdate::Notes(notes.into()))
            .await
    }

    #[instrument(skip(self, update), fields(field = update.field_name()))]
    async fn update_engagement(&self, book_id: &str, update: EngagementUpdate) -> Result<()> {
        let user_id = self.current_user_id()?;
        let field = update.field_name();

        self.cloud
            .update_engagement(&user_id, book_id, update)
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, book_id, error = %e, "Engagement update failed");
                SyncError::from(e)
            })?;

        self.emit(CoreEvent::Library(LibraryEvent::EngagementUpdated {
            book_id: book_id.to_string(),
            field: field.to_string(),
        }));
        Ok(())
    }

    /// Remove every cached row of the current user.
    #[instrument(skip(self))]
    pub async fn clear_local_library(&self) -> Result<u64> {
        let user_id = self.current_user_id()?;
        let removed = self.local.delete_all_for_user(&user_id).await?;

        info!(user_id = %user_id, removed, "Local library cleared");
        self.emit(CoreEvent::Library(LibraryEvent::LibraryCleared { user_id, removed }));
        Ok(removed)
    }
}
