use thiserror::Error;

/// Errors reported by an object-store client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A conditional write found the object already present.
    #[error("precondition failed: {0} already exists")]
    PreconditionFailed(String),

    /// A range read started past the end of the object.
    #[error("invalid range for {key}: offset {offset} beyond object size {size}")]
    InvalidRange { key: String, offset: u64, size: u64 },

    /// Network or service failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed; no further operations are valid.
    #[error("connection is closed")]
    Closed,
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors from parsing adapter parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required option: {0}")]
    MissingOption(&'static str),

    #[error("unknown option: {0}")]
    UnknownOption(String),

    #[error("unknown value for {option} {value:?}: {reason}")]
    InvalidValue {
        option: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("conflicting credentials: {0}")]
    ConflictingCredentials(String),

    #[error("cannot load credentials: {0}")]
    Credentials(String),
}
