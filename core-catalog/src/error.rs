use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No network connection: {0}")]
    NoConnection(String),

    #[error("Catalog request timed out")]
    Timeout,

    #[error("Catalog returned HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Failed to parse catalog response: {0}")]
    Parse(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl CatalogError {
    /// Map an HTTP transport failure onto the catalog taxonomy.
    pub fn from_transport(error: BridgeError) -> Self {
        match error {
            BridgeError::Timeout => CatalogError::Timeout,
            BridgeError::ConnectionFailed(message) => CatalogError::NoConnection(message),
            other => CatalogError::Bridge(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
