//! # Firestore Provider
//!
//! Implements the `CloudBookStore` bridge for the per-user saved-book
//! collection `users/{uid}/books/{bookId}`.
//!
//! ## Overview
//!
//! This module provides:
//! - [`FirestoreConnector`]: Firestore REST v1 over the host `HttpClient`,
//!   with bearer id tokens from the `IdentityProvider`, typed-value encoding,
//!   exponential backoff on 429/5xx, and live snapshots from a polling listener
//! - [`InMemoryCloudStore`]: process-local store with push snapshots and
//!   failure injection, for tests and offline demos

pub mod connector;
pub mod error;
pub mod memory;
pub mod types;

pub use connector::FirestoreConnector;
pub use error::{FirestoreError, Result};
pub use memory::InMemoryCloudStore;
