use gcs_client::{ClientError, ConfigError};

/// Errors from repository store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Bad or missing adapter parameters.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `create` found an initialized repository.
    #[error("repository already exists: {0}")]
    AlreadyExists(String),

    /// A mutating operation on a read-only store.
    #[error("repository is read-only: {0}")]
    ReadOnly(String),

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A shard key carries a suffix that is not valid hex.
    #[error("decode {key}: {reason}")]
    Decode { key: String, reason: String },

    /// A shard key does not follow the `<prefix>/<xx>/<hash>` structure.
    #[error("invalid key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A range read started past the end of the object.
    #[error("invalid range for {key}: offset {offset} beyond object size {size}")]
    InvalidRange { key: String, offset: u64, size: u64 },

    /// Network or service failure reported by the client.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store was closed.
    #[error("store is closed")]
    Closed,
}

impl From<ClientError> for StoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(key) => Self::NotFound(key),
            // Only reachable from conditional writes, which the store maps
            // itself; anything else is a service-side failure.
            ClientError::PreconditionFailed(key) => {
                Self::Transport(format!("precondition failed on {key}"))
            }
            ClientError::InvalidRange { key, offset, size } => {
                Self::InvalidRange { key, offset, size }
            }
            ClientError::Transport(msg) => Self::Transport(msg),
            ClientError::Io(e) => Self::Io(e),
            ClientError::Closed => Self::Closed,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
