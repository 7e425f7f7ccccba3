//! # Book Catalog
//!
//! Search client for the public Google Books volumes endpoint.
//!
//! [`BookCatalog`] is the seam the service layer depends on;
//! [`GoogleBooksClient`] is the production implementation over the host
//! `HttpClient`.

pub mod error;
pub mod google_books;

pub use error::{CatalogError, Result};
pub use google_books::{BookCatalog, GoogleBooksClient};
