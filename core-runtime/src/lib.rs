//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the bookshelf core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! Every other core crate depends on this one for its logging conventions
//! and for publishing events to the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
