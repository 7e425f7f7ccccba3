//! # Repository Pattern Implementation
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `SavedBookRepository` - Books saved by each user, with a live per-user view

pub mod saved_books;

pub use saved_books::{BookListStream, SavedBookRepository, SqliteSavedBookRepository};
