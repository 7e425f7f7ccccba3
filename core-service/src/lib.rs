//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, identity,
//! cloud document store) and the on-device SQLite cache into one
//! [`CoreService`]. Desktop hosts typically enable the `desktop-shims` feature
//! so a reqwest-backed HTTP client is provided when none is injected; mobile
//! hosts inject every bridge themselves.
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, FirestoreConfig};
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("bookshelf.db")
//!     .identity_provider(identity)
//!     .firestore(FirestoreConfig::new("bookshelf-prod"))
//!     .build()?;
//!
//! let core = CoreService::bootstrap(config).await?;
//! let results = core.search_books("le guin").await?;
//! ```

pub mod error;
mod observers;
pub mod service;

pub use error::{CoreError, Result};
pub use service::{CoreService, SaveOutcome};

use std::sync::Arc;

use bridge_traits::{
    identity::IdentityProvider,
    storage::CloudBookStore,
    time::{Clock, SystemClock},
};
use core_catalog::{BookCatalog, GoogleBooksClient};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{SavedBookRepository, SqliteSavedBookRepository};
use core_runtime::config::{CoreConfig, SyncSettings, DEFAULT_CATALOG_MAX_RESULTS};
use core_runtime::events::DEFAULT_EVENT_BUFFER_SIZE;
use provider_firestore::FirestoreConnector;
use tracing::info;

/// Aggregated handle to everything the service requires.
pub struct CoreDependencies {
    pub repository: Arc<dyn SavedBookRepository>,
    pub cloud_store: Arc<dyn CloudBookStore>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn BookCatalog>,
    pub clock: Arc<dyn Clock>,
    pub sync: SyncSettings,
    pub catalog_max_results: u32,
    pub event_buffer_size: usize,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit handles, with default
    /// settings.
    pub fn new(
        repository: Arc<dyn SavedBookRepository>,
        cloud_store: Arc<dyn CloudBookStore>,
        identity_provider: Arc<dyn IdentityProvider>,
        catalog: Arc<dyn BookCatalog>,
    ) -> Self {
        Self {
            repository,
            cloud_store,
            identity_provider,
            catalog,
            clock: Arc::new(SystemClock),
            sync: SyncSettings::new(),
            catalog_max_results: DEFAULT_CATALOG_MAX_RESULTS,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    pub fn with_catalog_max_results(mut self, max_results: u32) -> Self {
        self.catalog_max_results = max_results;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    /// Open the SQLite cache and build the default connectors from a
    /// validated [`CoreConfig`].
    pub async fn from_config(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;
        let repository: Arc<dyn SavedBookRepository> = Arc::new(
            SqliteSavedBookRepository::with_clock(pool, Arc::clone(&config.clock)),
        );

        let cloud_store: Arc<dyn CloudBookStore> = match (config.cloud_store, &config.firestore) {
            (Some(store), _) => store,
            (None, Some(firestore)) => {
                info!(project_id = %firestore.project_id, "Using Firestore REST connector");
                Arc::new(FirestoreConnector::new(
                    Arc::clone(&config.http_client),
                    Arc::clone(&config.identity_provider),
                    firestore,
                ))
            }
            (None, None) => {
                return Err(CoreError::CapabilityMissing {
                    capability: "CloudBookStore".to_string(),
                    message: "Inject a cloud store or provide Firestore settings".to_string(),
                })
            }
        };

        let catalog: Arc<dyn BookCatalog> = Arc::new(GoogleBooksClient::new(
            Arc::clone(&config.http_client),
            config.catalog.clone(),
        ));

        Ok(Self {
            repository,
            cloud_store,
            identity_provider: config.identity_provider,
            catalog,
            clock: config.clock,
            sync: config.sync,
            catalog_max_results: config.catalog.max_results,
            event_buffer_size: config.event_buffer_size,
        })
    }
}
