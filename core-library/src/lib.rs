//! # Saved-Book Cache
//!
//! On-device SQLite cache of the books a user saved, partitioned by user.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pool, schema and migrations ([`db`])
//! - The [`Book`](models::Book) domain model and its local/cloud projections
//! - [`SavedBookRepository`](repositories::SavedBookRepository), the
//!   insert-or-replace store with a live per-user sequence of rows

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{Book, ReadingStatus};
pub use repositories::{BookListStream, SavedBookRepository, SqliteSavedBookRepository};
