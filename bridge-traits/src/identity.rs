//! Identity Provider Abstraction
//!
//! The host authentication service (Firebase Auth on mobile, a test double on
//! desktop). The core never caches the signed-in user: every operation asks
//! [`IdentityProvider::current_user`] again, so sign-out followed by sign-in as
//! somebody else is always observed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authenticated user as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable user identifier; partitions both the local cache and the cloud
    /// collection.
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl AuthUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Failures reported by the identity provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No account found with this email")]
    UserNotFound,

    #[error("An account already exists with this email")]
    EmailAlreadyInUse,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// Host authentication service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Currently signed-in user, if any.
    fn current_user(&self) -> Option<AuthUser>;

    /// Bearer token for the signed-in user, used by REST connectors.
    async fn id_token(&self) -> Result<String, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, IdentityError>;

    async fn register(&self, email: &str, password: &str) -> Result<AuthUser, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;
}
