//! Workspace entry crate.
//!
//! Re-exports the [`core_service`] façade so host applications can depend on
//! `bookshelf-workspace` and pick platform features in one place.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
