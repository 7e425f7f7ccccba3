//! # Authentication Module
//!
//! Email/password account management on top of the host identity provider.
//!
//! ## Overview
//!
//! The host owns the real identity service (sessions, tokens, persistence).
//! This crate validates credentials before any I/O, maps provider failures
//! onto [`AuthError`], masks emails in logs and publishes auth state changes
//! on the core event bus.

pub mod error;
pub mod manager;

pub use error::{AuthError, Result};
pub use manager::{validate_email, validate_password, AuthManager, MIN_PASSWORD_LENGTH};
