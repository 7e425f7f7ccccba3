//! # Core Configuration Module
//!
//! Provides configuration management for the bookshelf core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all bridges and settings the core needs. The builder
//! fails fast when a required capability is missing, with a message that says
//! how to provide it.
//!
//! ## Required Dependencies
//!
//! - `IdentityProvider` - the signed-in user; partitions every store
//! - A cloud document store: either an injected `CloudBookStore` or a
//!   [`FirestoreConfig`] so the default REST connector can be built
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//! - `Clock` - time source for save timestamps (default: system clock)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, FirestoreConfig};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/bookshelf.db")
//!     .identity_provider(Arc::new(MyIdentityProvider))
//!     .firestore(FirestoreConfig::new("bookshelf-prod"))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/bookshelf.db")
//!     .build()
//!     .expect("Should fail - missing identity provider");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, CloudBookStore, HttpClient, IdentityProvider, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default public catalog endpoint.
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://www.googleapis.com/books/v1/";

/// Default number of catalog results requested per search.
pub const DEFAULT_CATALOG_MAX_RESULTS: u32 = 40;

/// Upper bound accepted by the catalog for `maxResults`.
pub const CATALOG_MAX_RESULTS_LIMIT: u32 = 40;

/// Default interval between cloud snapshot polls.
pub const DEFAULT_SNAPSHOT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Core configuration for the bookshelf core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// HTTP client for the catalog and REST connectors
    pub http_client: Arc<dyn HttpClient>,

    /// Host authentication service (required)
    pub identity_provider: Arc<dyn IdentityProvider>,

    /// Injected cloud store; when absent the Firestore connector is built
    /// from [`CoreConfig::firestore`]
    pub cloud_store: Option<Arc<dyn CloudBookStore>>,

    /// Firestore connection settings
    pub firestore: Option<FirestoreConfig>,

    /// Time source for save timestamps
    pub clock: Arc<dyn Clock>,

    /// Catalog search settings
    pub catalog: CatalogConfig,

    /// Reconciliation behaviour
    pub sync: SyncSettings,

    /// Capacity of the event bus ring buffer
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("identity_provider", &"IdentityProvider { ... }")
            .field(
                "cloud_store",
                &self.cloud_store.as_ref().map(|_| "CloudBookStore { ... }"),
            )
            .field("firestore", &self.firestore)
            .field("catalog", &self.catalog)
            .field("sync", &self.sync)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

/// Firestore REST connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    /// Google Cloud project hosting the database
    pub project_id: String,
    /// Database name, `(default)` for most projects
    pub database_id: String,
    /// How often live listeners re-read the collection
    pub poll_interval: Duration,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            poll_interval: DEFAULT_SNAPSHOT_POLL_INTERVAL,
        }
    }

    pub fn with_database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = database_id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(Error::Config(
                "Firestore project id cannot be empty".to_string(),
            ));
        }
        if self.database_id.trim().is_empty() {
            return Err(Error::Config(
                "Firestore database id cannot be empty".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "Snapshot poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Public book catalog settings.
///
/// # Security Note
///
/// API keys should never be hardcoded in the binary; load them from the
/// environment or the host's secure configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Base URL of the volumes API, with trailing slash
    pub base_url: String,
    /// Optional API key appended as `key=`
    pub api_key: Option<String>,
    /// Results requested per search
    pub max_results: u32,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            api_key: None,
            max_results: DEFAULT_CATALOG_MAX_RESULTS,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CatalogConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Catalog base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.max_results == 0 || self.max_results > CATALOG_MAX_RESULTS_LIMIT {
            return Err(Error::Config(format!(
                "Catalog max results must be between 1 and {}",
                CATALOG_MAX_RESULTS_LIMIT
            )));
        }
        if matches!(&self.api_key, Some(key) if key.trim().is_empty()) {
            return Err(Error::Config("Catalog API key cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// What a pull sync does when one record cannot be written locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullFailurePolicy {
    /// Stop at the failing record and report a conflict for it.
    #[default]
    AbortBatch,
    /// Keep going and report the skipped ids.
    SkipAndContinue,
}

/// What a local-only migration does when one upload fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationPolicy {
    /// Upload the remaining books and report the failures.
    #[default]
    ContinueOnError,
    /// Stop at the first failed upload.
    StopOnFirstError,
}

/// Reconciliation behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncSettings {
    pub pull_failure_policy: PullFailurePolicy,
    pub migration_policy: MigrationPolicy,
    /// Run a pull sync right after a user signs in.
    pub sync_on_sign_in: bool,
}

impl SyncSettings {
    pub fn new() -> Self {
        Self {
            sync_on_sign_in: true,
            ..Self::default()
        }
    }

    pub fn with_pull_failure_policy(mut self, policy: PullFailurePolicy) -> Self {
        self.pull_failure_policy = policy;
        self
    }

    pub fn with_migration_policy(mut self, policy: MigrationPolicy) -> Self {
        self.migration_policy = policy;
        self
    }

    pub fn with_sync_on_sign_in(mut self, enabled: bool) -> Self {
        self.sync_on_sign_in = enabled;
        self
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        match (&self.cloud_store, &self.firestore) {
            (None, None) => return Err(cloud_store_missing_error()),
            (_, Some(firestore)) => firestore.validate()?,
            _ => {}
        }

        self.catalog.validate()
    }
}

fn identity_provider_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "IdentityProvider".to_string(),
        message: "IdentityProvider implementation is required to resolve the signed-in user. \
                 Mobile: inject an adapter over the platform auth SDK. \
                 Tests: inject a fake provider."
            .to_string(),
    }
}

fn cloud_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "CloudBookStore".to_string(),
        message: "No cloud document store configured. \
                 Provide .firestore(FirestoreConfig::new(project_id)) to use the REST connector, \
                 or inject a CloudBookStore with .cloud_store()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: ensure the 'desktop-shims' feature is enabled. \
                 Mobile: inject platform-native adapter."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    cloud_store: Option<Arc<dyn CloudBookStore>>,
    firestore: Option<FirestoreConfig>,
    clock: Option<Arc<dyn Clock>>,
    catalog: Option<CatalogConfig>,
    sync: Option<SyncSettings>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/bookshelf.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the identity provider (required).
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Injects a cloud document store, bypassing the Firestore connector.
    pub fn cloud_store(mut self, store: Arc<dyn CloudBookStore>) -> Self {
        self.cloud_store = Some(store);
        self
    }

    /// Sets the Firestore connection settings.
    pub fn firestore(mut self, config: FirestoreConfig) -> Self {
        self.firestore = Some(config);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets catalog search settings.
    ///
    /// ```
    /// use core_runtime::config::{CatalogConfig, CoreConfig};
    ///
    /// let builder = CoreConfig::builder()
    ///     .catalog(CatalogConfig::default().with_max_results(20));
    /// ```
    pub fn catalog(mut self, config: CatalogConfig) -> Self {
        self.catalog = Some(config);
        self
    }

    /// Sets reconciliation behaviour.
    pub fn sync(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Sets the event bus capacity. Default: 100.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if the database path or identity provider is missing,
    /// if no cloud store can be built, or if any value is invalid.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let identity_provider = self
            .identity_provider
            .ok_or_else(identity_provider_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let config = CoreConfig {
            database_path,
            http_client,
            identity_provider,
            cloud_store: self.cloud_store,
            firestore: self.firestore,
            clock,
            catalog: self.catalog.unwrap_or_default(),
            sync: self.sync.unwrap_or_else(SyncSettings::new),
            event_buffer_size: self.event_buffer_size.unwrap_or(100),
        };

        config.validate()?;

        Ok(config)
    }
}
