//! Error types for the Firestore provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Firestore provider errors
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// The id token was rejected or no user is signed in
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Firestore API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Document does not exist
    #[error("Document not found: {path}")]
    DocumentNotFound { path: String },

    /// Failed to parse API response or a stored document
    #[error("Failed to parse Firestore response: {0}")]
    ParseError(String),

    /// Document failed validation before upload
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Firestore operations
pub type Result<T> = std::result::Result<T, FirestoreError>;

impl From<FirestoreError> for BridgeError {
    fn from(error: FirestoreError) -> Self {
        match error {
            FirestoreError::AuthenticationFailed(msg) => BridgeError::Unauthenticated(msg),
            FirestoreError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = FirestoreError::ApiError {
            status_code: 403,
            message: "Missing or insufficient permissions.".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Firestore API error (status 403): Missing or insufficient permissions."
        );
    }

    #[test]
    fn test_error_conversion() {
        let bridge_error: BridgeError =
            FirestoreError::AuthenticationFailed("token expired".to_string()).into();
        assert!(matches!(bridge_error, BridgeError::Unauthenticated(_)));

        let bridge_error: BridgeError = FirestoreError::BridgeError(BridgeError::Timeout).into();
        assert!(matches!(bridge_error, BridgeError::Timeout));

        let bridge_error: BridgeError = FirestoreError::DocumentNotFound {
            path: "users/u1/books/b1".to_string(),
        }
        .into();
        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));
    }
}
