use bridge_traits::identity::IdentityError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    #[error("An account already exists with this email")]
    EmailAlreadyInUse,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("No account found with this email")]
    UserNotFound,

    #[error("No internet connection: {0}")]
    NoConnection(String),

    #[error("Sign out failed: {0}")]
    SignOutFailed(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("{0}")]
    Validation(String),

    #[error("Identity provider error: {0}")]
    Provider(String),
}

impl AuthError {
    /// Whether retrying the same request can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AuthError::NoConnection(_))
    }
}

impl From<IdentityError> for AuthError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::InvalidCredentials => AuthError::InvalidCredentials,
            IdentityError::UserNotFound => AuthError::UserNotFound,
            IdentityError::EmailAlreadyInUse => AuthError::EmailAlreadyInUse,
            IdentityError::InvalidEmail => AuthError::InvalidEmail,
            IdentityError::WeakPassword(reason) => AuthError::WeakPassword(reason),
            IdentityError::NotSignedIn => AuthError::NotSignedIn,
            IdentityError::Network(message) => AuthError::NoConnection(message),
            IdentityError::Provider(message) => AuthError::Provider(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
