//! # Sync Module
//!
//! Reconciles the on-device saved-book cache with the per-user cloud
//! collection.
//!
//! ## Overview
//!
//! - [`SyncReconciler`]: writes go local first, then cloud; pulls overwrite the
//!   local cache with the latest cloud snapshot; local-only books are migrated
//!   one way to the cloud
//! - [`ReconciliationState`]: tracks which cached books have no cloud
//!   counterpart and publishes whether any exist
//!
//! Last write wins. There is no offline queue and no transaction spanning both
//! stores.

pub mod error;
pub mod reconciler;
pub mod state;

pub use error::{Result, SyncError};
pub use reconciler::{MigrationFailure, MigrationReport, PullReport, SyncConfig, SyncReconciler};
pub use state::ReconciliationState;
