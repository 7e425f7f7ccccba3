//! # Authentication Manager
//!
//! Thin orchestrator over the host [`IdentityProvider`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::AuthManager;
//! use core_runtime::events::EventBus;
//!
//! let event_bus = EventBus::new(100);
//! let manager = AuthManager::new(identity_provider, event_bus.clone());
//!
//! let user = manager.sign_in("reader@example.com", "hunter22").await?;
//! ```

use crate::error::{AuthError, Result};
use bridge_traits::identity::{AuthUser, IdentityProvider};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::logging::mask_email;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Shortest password accepted before contacting the provider.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Check the structure of an email address.
pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::Validation("Email cannot be empty".to_string()));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail)
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AuthError::Validation("Password cannot be empty".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub struct AuthManager {
    identity: Arc<dyn IdentityProvider>,
    event_bus: EventBus,
}

impl AuthManager {
    pub fn new(identity: Arc<dyn IdentityProvider>, event_bus: EventBus) -> Self {
        Self {
            identity,
            event_bus,
        }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.identity.current_user()
    }

    pub fn is_signed_in(&self) -> bool {
        self.current_user().is_some()
    }

    #[instrument(skip(self, email, password), fields(email = %mask_email(email)))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        validate_email(email)?;
        validate_password(password)?;

        let result = self.identity.sign_in(email.trim(), password).await;
        self.finish_sign_in(result.map_err(AuthError::from))
    }

    #[instrument(skip(self, email, password), fields(email = %mask_email(email)))]
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthUser> {
        validate_email(email)?;
        validate_password(password)?;

        let result = self.identity.register(email.trim(), password).await;
        self.finish_sign_in(result.map_err(AuthError::from))
    }

    /// Sign out and return the user that was signed in, if any.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<Option<AuthUser>> {
        let user = self.identity.current_user();

        if let Err(e) = self.identity.sign_out().await {
            warn!(error = %e, "Sign-out failed");
            let error = AuthError::SignOutFailed(e.to_string());
            self.emit_error(&error);
            return Err(error);
        }

        if let Some(user) = &user {
            info!(user_id = %user.uid, "User signed out");
            let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut {
                user_id: user.uid.clone(),
            }));
        }

        Ok(user)
    }

    #[instrument(skip(self, email), fields(email = %mask_email(email)))]
    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        validate_email(email)?;

        self.identity
            .send_password_reset(email.trim())
            .await
            .map_err(|e| {
                let error = AuthError::from(e);
                self.emit_error(&error);
                error
            })?;

        info!("Password reset requested");
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::PasswordResetRequested));
        Ok(())
    }

    fn finish_sign_in(&self, result: Result<AuthUser>) -> Result<AuthUser> {
        match result {
            Ok(user) => {
                info!(user_id = %user.uid, "User signed in");
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedIn {
                    user_id: user.uid.clone(),
                }));
                Ok(user)
            }
            Err(error) => {
                warn!(error = %error, "Authentication failed");
                self.emit_error(&error);
                Err(error)
            }
        }
    }

    fn emit_error(&self, error: &AuthError) {
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        }));
    }
}
