//! # Host Bridge Traits
//!
//! Capabilities the bookshelf core needs from its host but does not implement
//! itself.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by the catalog client and REST connectors
//! - [`IdentityProvider`](identity::IdentityProvider) - Signed-in user, sign-in/out, id tokens
//! - [`CloudBookStore`](storage::CloudBookStore) - Per-user remote book collection with live snapshots
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop` (HTTP), `provider-firestore` (cloud store) |
//! | Android  | host-provided adapters |
//!
//! The core fails fast with `CapabilityMissing` when a required bridge is not
//! injected (see `core_runtime::config`).
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError), except the
//! identity provider which reports [`IdentityError`](identity::IdentityError)
//! so callers can tell credential failures apart.
//!
//! All traits are `Send + Sync` so handles can be shared across tasks.

pub mod error;
pub mod http;
pub mod identity;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use identity::{AuthUser, IdentityError, IdentityProvider};
pub use storage::{CloudBookDocument, CloudBookStore, EngagementUpdate, SnapshotStream};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
