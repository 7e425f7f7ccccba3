//! # Core Service
//!
//! Primary façade exposed to host applications. Combines catalog search, the
//! sync reconciler, authentication and local-only tracking behind plain async
//! operations.
//!
//! ## Session lifecycle
//!
//! 1. `sign_in` / `register` starts the snapshot observers (when
//!    `sync_on_sign_in` is set) and runs an initial pull
//! 2. The observers keep the local-only flag current while the user is
//!    signed in
//! 3. `sign_out` stops the observers, removes the user's cached rows and
//!    forgets the tracked ids before signing out of the provider

use crate::observers::{spawn_cloud_observer, spawn_local_observer, ObserverSet};
use crate::{CoreDependencies, Result};
use bridge_traits::identity::{AuthUser, IdentityProvider};
use bridge_traits::storage::CloudBookStore;
use core_auth::AuthManager;
use core_catalog::BookCatalog;
use core_library::{Book, BookListStream, ReadingStatus, SavedBookRepository};
use core_runtime::config::{CoreConfig, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus, EventStream, LibraryEvent, Receiver};
use core_sync::{
    MigrationReport, PullReport, ReconciliationState, SyncConfig, SyncError, SyncReconciler,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// What a save did to the user's library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The book was added, or re-saved without a status change.
    Saved,
    /// An already saved book moved to another reading-status group.
    StatusUpdated(ReadingStatus),
}

struct Inner {
    reconciler: SyncReconciler,
    auth: AuthManager,
    catalog: Arc<dyn BookCatalog>,
    local: Arc<dyn SavedBookRepository>,
    cloud: Arc<dyn CloudBookStore>,
    identity: Arc<dyn IdentityProvider>,
    state: Arc<ReconciliationState>,
    observers: ObserverSet,
    event_bus: EventBus,
    settings: SyncSettings,
    catalog_max_results: u32,
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<Inner>,
}

impl CoreService {
    /// Create a new service from the provided dependencies.
    pub fn new(deps: CoreDependencies) -> Self {
        let event_bus = EventBus::new(deps.event_buffer_size);
        let reconciler = SyncReconciler::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.cloud_store),
            Arc::clone(&deps.identity_provider),
            event_bus.clone(),
            SyncConfig::from(deps.sync),
        )
        .with_clock(deps.clock);
        let auth = AuthManager::new(Arc::clone(&deps.identity_provider), event_bus.clone());

        Self {
            inner: Arc::new(Inner {
                reconciler,
                auth,
                catalog: deps.catalog,
                local: deps.repository,
                cloud: deps.cloud_store,
                identity: deps.identity_provider,
                state: Arc::new(ReconciliationState::new()),
                observers: ObserverSet::default(),
                event_bus,
                settings: deps.sync,
                catalog_max_results: deps.catalog_max_results,
            }),
        }
    }

    /// Open the local cache and build the default connectors.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let deps = CoreDependencies::from_config(config).await?;
        info!("Core service initialized");
        Ok(Self::new(deps))
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.auth.current_user()
    }

    /// Subscribe to core events.
    pub fn events(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn event_stream(&self) -> EventStream {
        self.inner.event_bus.stream()
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Search the catalog.
    ///
    /// Saved books without a thumbnail pick one up from matching results.
    #[instrument(skip(self))]
    pub async fn search_books(&self, query: &str) -> Result<Vec<Book>> {
        let results = self
            .inner
            .catalog
            .search(query, self.inner.catalog_max_results)
            .await?;

        if !results.is_empty() && self.inner.identity.current_user().is_some() {
            self.recover_thumbnails(&results).await;
        }

        Ok(results)
    }

    async fn recover_thumbnails(&self, results: &[Book]) {
        let user_id = match self.inner.identity.current_user() {
            Some(user) => user.uid,
            None => return,
        };

        let saved = match self.inner.local.list_for_user(&user_id).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "Cannot read saved books for thumbnail recovery");
                return;
            }
        };

        let thumbnails: HashMap<&str, &str> = results
            .iter()
            .filter(|book| book.has_thumbnail())
            .map(|book| (book.id.as_str(), book.thumbnail_url.as_str()))
            .collect();

        for book in saved.into_iter().filter(|book| !book.has_thumbnail()) {
            let Some(thumbnail) = thumbnails.get(book.id.as_str()) else {
                continue;
            };
            debug!(book_id = %book.id, "Recovering missing thumbnail");
            let updated = book.with_thumbnail(*thumbnail);
            if let Err(e) = self.inner.reconciler.save_book(&updated).await {
                warn!(book_id = %updated.id, error = %e, "Thumbnail recovery failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Library
    // ------------------------------------------------------------------

    /// Save a book for the current user.
    ///
    /// An already saved book keeps its cached record: only the reading status
    /// changes, and the thumbnail is replaced when the new one is non-blank.
    #[instrument(skip(self, book), fields(book_id = %book.id))]
    pub async fn save_book(&self, book: Book) -> Result<SaveOutcome> {
        let existing = self.inner.reconciler.cached_book(&book.id).await?;

        let (to_save, outcome) = match existing {
            Some(existing) => {
                let outcome = if existing.status != book.status {
                    SaveOutcome::StatusUpdated(book.status)
                } else {
                    SaveOutcome::Saved
                };
                let thumbnail = if book.has_thumbnail() {
                    book.thumbnail_url
                } else {
                    existing.thumbnail_url.clone()
                };
                let merged = existing.with_status(book.status).with_thumbnail(thumbnail);
                (merged, outcome)
            }
            None => (book, SaveOutcome::Saved),
        };

        self.inner.reconciler.save_book(&to_save).await?;

        if let SaveOutcome::StatusUpdated(status) = outcome {
            info!(status = status.as_str(), "Reading status updated");
            let _ = self
                .inner
                .event_bus
                .emit(CoreEvent::Library(LibraryEvent::ReadingStatusChanged {
                    book_id: to_save.id.clone(),
                    status: status.as_str().to_string(),
                }));
        }

        Ok(outcome)
    }

    pub async fn delete_book(&self, book_id: &str) -> Result<()> {
        Ok(self.inner.reconciler.delete_book(book_id).await?)
    }

    /// Live list of the current user's saved books, ordered by title.
    pub fn saved_books(&self) -> BookListStream {
        self.inner.reconciler.saved_books()
    }

    pub async fn is_book_saved(&self, book_id: &str) -> Result<bool> {
        Ok(self.inner.reconciler.is_book_saved(book_id).await?)
    }

    pub async fn update_reading_progress(&self, book_id: &str, progress: u8) -> Result<()> {
        Ok(self
            .inner
            .reconciler
            .update_reading_progress(book_id, progress)
            .await?)
    }

    pub async fn set_liked(&self, book_id: &str, liked: bool) -> Result<()> {
        Ok(self.inner.reconciler.set_liked(book_id, liked).await?)
    }

    pub async fn update_notes(&self, book_id: &str, notes: impl Into<String>) -> Result<()> {
        Ok(self.inner.reconciler.update_notes(book_id, notes).await?)
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Pull the cloud collection into the local cache.
    pub async fn sync_now(&self) -> Result<PullReport> {
        Ok(self.inner.reconciler.sync_with_cloud().await?)
    }

    /// Receiver that always holds whether local-only books exist.
    pub fn local_books_exist(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    /// Ids cached locally with no cloud counterpart, in id order.
    pub fn local_only_ids(&self) -> Vec<String> {
        self.inner.state.local_only_ids()
    }

    /// Read both stores once and replace the tracked id sets.
    ///
    /// Returns the local-only count.
    #[instrument(skip(self))]
    pub async fn refresh_local_only(&self) -> Result<usize> {
        let user_id = self.require_user()?;

        let local = self
            .inner
            .local
            .list_for_user(&user_id)
            .await
            .map_err(SyncError::from)?;
        let cloud = self
            .inner
            .cloud
            .list(&user_id)
            .await
            .map_err(SyncError::from)?;

        self.inner
            .state
            .apply_local_snapshot(local.into_iter().map(|book| book.id));
        let count = self
            .inner
            .state
            .apply_cloud_snapshot(cloud.into_iter().map(|doc| doc.id));

        let _ = self
            .inner
            .event_bus
            .emit(CoreEvent::Library(LibraryEvent::LocalOnlyChanged { count }));
        Ok(count)
    }

    /// Upload every tracked local-only book, then pull.
    #[instrument(skip(self))]
    pub async fn migrate_local_books(&self) -> Result<MigrationReport> {
        let ids = self.inner.state.local_only_ids();
        if ids.is_empty() {
            debug!("No local-only books to migrate");
            return Ok(MigrationReport::default());
        }

        let mut books = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.inner.reconciler.cached_book(id).await? {
                Some(book) => books.push(book),
                None => debug!(book_id = %id, "Local-only book no longer cached"),
            }
        }

        let report = self.inner.reconciler.migrate_local_only(books).await?;
        if !self.inner.observers.is_running() {
            self.refresh_local_only().await?;
        }
        Ok(report)
    }

    /// Start following both stores for the current user, then pull.
    ///
    /// Replaces observers started earlier.
    #[instrument(skip(self))]
    pub async fn start_observers(&self) -> Result<PullReport> {
        let user_id = self.require_user()?;

        let snapshots = self
            .inner
            .cloud
            .watch_collection(&user_id)
            .await
            .map_err(SyncError::from)?;
        let books = self.inner.local.watch_user_books(&user_id);

        self.inner.state.clear();
        self.inner.observers.replace(vec![
            spawn_cloud_observer(
                user_id.clone(),
                snapshots,
                Arc::clone(&self.inner.state),
                self.inner.event_bus.clone(),
            ),
            spawn_local_observer(
                user_id.clone(),
                books,
                Arc::clone(&self.inner.state),
                self.inner.event_bus.clone(),
            ),
        ]);
        info!(user_id = %user_id, "Snapshot observers started");

        self.sync_now().await
    }

    pub fn stop_observers(&self) {
        let stopped = self.inner.observers.stop();
        if stopped > 0 {
            debug!(stopped, "Snapshot observers stopped");
        }
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let user = self.inner.auth.sign_in(email, password).await?;
        self.after_sign_in().await;
        Ok(user)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<AuthUser> {
        let user = self.inner.auth.register(email, password).await?;
        self.after_sign_in().await;
        Ok(user)
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        Ok(self.inner.auth.send_password_reset(email).await?)
    }

    /// Stop the observers, drop the user's cached rows and sign out.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<Option<AuthUser>> {
        self.stop_observers();

        if self.inner.identity.current_user().is_some() {
            if let Err(e) = self.inner.reconciler.clear_local_library().await {
                warn!(error = %e, "Failed to clear local library on sign-out");
            }
        }
        self.inner.state.clear();

        Ok(self.inner.auth.sign_out().await?)
    }

    /// Stop background work. The service stays usable.
    pub fn shutdown(&self) {
        self.stop_observers();
    }

    async fn after_sign_in(&self) {
        if !self.inner.settings.sync_on_sign_in {
            return;
        }
        if let Err(e) = self.start_observers().await {
            warn!(error = %e, "Initial sync after sign-in failed");
        }
    }

    fn require_user(&self) -> std::result::Result<String, SyncError> {
        self.inner
            .identity
            .current_user()
            .map(|user| user.uid)
            .ok_or(SyncError::Authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::identity::IdentityError;
    use core_catalog::Result as CatalogResult;
    use core_library::db::create_test_pool;
    use core_library::SqliteSavedBookRepository;
    use futures::StreamExt;
    use mockall::mock;
    use provider_firestore::InMemoryCloudStore;
    use std::sync::Mutex;

    mock! {
        Catalog {}

        #[async_trait]
        impl BookCatalog for Catalog {
            async fn search(&self, query: &str, max_results: u32) -> CatalogResult<Vec<Book>>;
        }
    }

    #[derive(Default)]
    struct FakeIdentity {
        user: Mutex<Option<AuthUser>>,
    }

    impl FakeIdentity {
        fn signed_in(uid: &str) -> Self {
            Self {
                user: Mutex::new(Some(AuthUser::new(uid))),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        fn current_user(&self) -> Option<AuthUser> {
            self.user.lock().unwrap().clone()
        }

        async fn id_token(&self) -> std::result::Result<String, IdentityError> {
            Ok("token".to_string())
        }

        async fn sign_in(
            &self,
            email: &str,
            _password: &str,
        ) -> std::result::Result<AuthUser, IdentityError> {
            let user = AuthUser::new("u1").with_email(email);
            *self.user.lock().unwrap() = Some(user.clone());
            Ok(user)
        }

        async fn register(
            &self,
            _email: &str,
            _password: &str,
        ) -> std::result::Result<AuthUser, IdentityError> {
            Err(IdentityError::EmailAlreadyInUse)
        }

        async fn sign_out(&self) -> std::result::Result<(), IdentityError> {
            *self.user.lock().unwrap() = None;
            Ok(())
        }

        async fn send_password_reset(&self, _email: &str) -> std::result::Result<(), IdentityError> {
            Ok(())
        }
    }

    struct Fixture {
        service: CoreService,
        local: Arc<SqliteSavedBookRepository>,
        cloud: Arc<InMemoryCloudStore>,
    }

    async fn fixture(identity: FakeIdentity, catalog: MockCatalog, settings: SyncSettings) -> Fixture {
        let pool = create_test_pool().await.unwrap();
        let local = Arc::new(SqliteSavedBookRepository::new(pool));
        let cloud = Arc::new(InMemoryCloudStore::new());
        let deps = CoreDependencies::new(
            local.clone(),
            cloud.clone(),
            Arc::new(identity),
            Arc::new(catalog),
        )
        .with_sync_settings(settings);

        Fixture {
            service: CoreService::new(deps),
            local,
            cloud,
        }
    }

    async fn signed_in_fixture() -> Fixture {
        fixture(
            FakeIdentity::signed_in("u1"),
            MockCatalog::new(),
            SyncSettings::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_save_existing_book_updates_status_only() {
        let f = signed_in_fixture().await;
        let original = Book::new("b1", "Kindred", "Octavia E. Butler")
            .with_description("Time travel")
            .with_thumbnail("https://img/1.jpg");
        assert_eq!(
            f.service.save_book(original).await.unwrap(),
            SaveOutcome::Saved
        );

        let mut events = f.service.events();
        let update = Book::new("b1", "Kindred (search copy)", "Butler")
            .with_status(ReadingStatus::Finished);
        assert_eq!(
            f.service.save_book(update).await.unwrap(),
            SaveOutcome::StatusUpdated(ReadingStatus::Finished)
        );

        let cached = f.local.find("b1", "u1").await.unwrap().unwrap();
        assert_eq!(cached.title, "Kindred");
        assert_eq!(cached.description, "Time travel");
        assert_eq!(cached.thumbnail_url, "https://img/1.jpg");
        assert_eq!(cached.status, ReadingStatus::Finished);

        let mut saw_status_change = false;
        while let Ok(event) = events.try_recv() {
            if let CoreEvent::Library(LibraryEvent::ReadingStatusChanged { status, .. }) = event {
                assert_eq!(status, "FINISHED");
                saw_status_change = true;
            }
        }
        assert!(saw_status_change);
    }

    #[tokio::test]
    async fn test_search_recovers_missing_thumbnails() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_search()
            .withf(|query, max| query.to_string() == "butler" && *max == 40)
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    Book::new("b1", "Kindred", "Octavia E. Butler").with_thumbnail("https://img/k.jpg"),
                    Book::new("b2", "Dawn", "Octavia E. Butler"),
                ])
            });
        let f = fixture(FakeIdentity::signed_in("u1"), catalog, SyncSettings::new()).await;
        f.service
            .save_book(Book::new("b1", "Kindred", "Octavia E. Butler"))
            .await
            .unwrap();

        let results = f.service.search_books("butler").await.unwrap();
        assert_eq!(results.len(), 2);

        let cached = f.local.find("b1", "u1").await.unwrap().unwrap();
        assert_eq!(cached.thumbnail_url, "https://img/k.jpg");
        assert_eq!(f.cloud.documents("u1")[0].thumbnail_url, "https://img/k.jpg");
    }

    #[tokio::test]
    async fn test_search_signed_out_skips_recovery() {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_search()
            .returning(|_, _| Ok(vec![Book::new("b1", "Kindred", "Butler").with_thumbnail("t")]));
        let f = fixture(FakeIdentity::default(), catalog, SyncSettings::new()).await;

        assert_eq!(f.service.search_books("kindred").await.unwrap().len(), 1);
        assert_eq!(f.cloud.call_count(), 0);
    }

    #[tokio::test]
    async fn test_migrate_without_local_only_is_noop() {
        let f = signed_in_fixture().await;

        let report = f.service.migrate_local_books().await.unwrap();
        assert_eq!(report, MigrationReport::default());
        assert_eq!(f.cloud.call_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_then_migrate() {
        let f = signed_in_fixture().await;
        f.local.upsert(&Book::new("x", "Dracula", "Stoker"), "u1").await.unwrap();
        f.local.upsert(&Book::new("y", "Emma", "Austen"), "u1").await.unwrap();
        f.cloud.insert("u1", Book::new("y", "Emma", "Austen").to_cloud_document(1));

        assert_eq!(f.service.refresh_local_only().await.unwrap(), 1);
        assert_eq!(f.service.local_only_ids(), vec!["x".to_string()]);
        assert!(*f.service.local_books_exist().borrow());

        let report = f.service.migrate_local_books().await.unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(report.pull.map(|p| p.synced), Some(2));
        assert!(f.service.local_only_ids().is_empty());
        assert!(!*f.service.local_books_exist().borrow());
    }

    #[tokio::test]
    async fn test_sign_in_starts_observers_and_pulls() {
        let f = fixture(FakeIdentity::default(), MockCatalog::new(), SyncSettings::new()).await;
        f.cloud.insert("u1", Book::new("c1", "Beloved", "Morrison").to_cloud_document(1));

        let user = f.service.sign_in("reader@example.com", "secret1").await.unwrap();
        assert_eq!(user.uid, "u1");
        assert!(f.local.exists("c1", "u1").await.unwrap());
        assert_eq!(f.cloud.active_listeners("u1"), 1);

        f.service.stop_observers();
    }

    #[tokio::test]
    async fn test_sign_in_without_auto_sync() {
        let settings = SyncSettings::new().with_sync_on_sign_in(false);
        let f = fixture(FakeIdentity::default(), MockCatalog::new(), settings).await;

        f.service.sign_in("reader@example.com", "secret1").await.unwrap();
        assert_eq!(f.cloud.call_count(), 0);
    }

    #[tokio::test]
    async fn test_observers_track_local_only_books() {
        let f = signed_in_fixture().await;
        f.service.start_observers().await.unwrap();
        let mut flag = f.service.local_books_exist();

        f.local.upsert(&Book::new("x", "Dracula", "Stoker"), "u1").await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), flag.wait_for(|exists| *exists))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.service.local_only_ids(), vec!["x".to_string()]);

        let report = f.service.migrate_local_books().await.unwrap();
        assert_eq!(report.migrated, 1);
        tokio::time::timeout(std::time::Duration::from_secs(5), flag.wait_for(|exists| !*exists))
            .await
            .unwrap()
            .unwrap();

        f.service.shutdown();
    }

    #[tokio::test]
    async fn test_sign_out_clears_user_rows() {
        let f = signed_in_fixture().await;
        f.service
            .save_book(Book::new("b1", "Emma", "Austen"))
            .await
            .unwrap();
        f.local.upsert(&Book::new("z", "Other", "X"), "u2").await.unwrap();
        f.service.refresh_local_only().await.unwrap();

        let user = f.service.sign_out().await.unwrap();
        assert_eq!(user.map(|u| u.uid), Some("u1".to_string()));
        assert_eq!(f.local.count_for_user("u1").await.unwrap(), 0);
        assert_eq!(f.local.count_for_user("u2").await.unwrap(), 1);
        assert_eq!(f.cloud.documents("u1").len(), 1);
        assert!(f.service.current_user().is_none());

        let mut stream = f.service.saved_books();
        assert!(stream.next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signed_out_operations_fail() {
        let f = fixture(FakeIdentity::default(), MockCatalog::new(), SyncSettings::new()).await;

        assert!(matches!(
            f.service.save_book(Book::new("b1", "Emma", "Austen")).await,
            Err(crate::CoreError::Sync(SyncError::Authentication))
        ));
        assert!(matches!(
            f.service.start_observers().await,
            Err(crate::CoreError::Sync(SyncError::Authentication))
        ));
        assert_eq!(f.cloud.call_count(), 0);
    }
}
