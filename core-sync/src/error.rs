use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No authenticated user")]
    Authentication,

    #[error("Local storage error: {source}")]
    Storage {
        #[source]
        source: LibraryError,
    },

    #[error("Cloud store error: {source}")]
    Network {
        #[source]
        source: BridgeError,
    },

    #[error("Failed to cache book {item_id}: {source}")]
    Conflict {
        item_id: String,
        #[source]
        source: LibraryError,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SyncError {
    /// Whether the failure came from an unreachable cloud store.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::Network { source } if source.is_connectivity())
    }
}

impl From<LibraryError> for SyncError {
    fn from(source: LibraryError) -> Self {
        SyncError::Storage { source }
    }
}

impl From<BridgeError> for SyncError {
    fn from(source: BridgeError) -> Self {
        SyncError::Network { source }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
