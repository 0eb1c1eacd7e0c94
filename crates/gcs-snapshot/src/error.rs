use gcs_client::{ClientError, ConfigError};
use thiserror::Error;

/// Errors from scanning a bucket.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Errors from writing one exported record.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A regular file record arrived without a body to copy.
    #[error("no content for regular file {0}")]
    MissingContent(String),

    /// The writer task ended without reporting.
    #[error("export writer aborted: {0}")]
    Aborted(String),
}
