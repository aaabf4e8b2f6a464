use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a refresh invocation. None of them are retried.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to read credentials store {}: {source}", .path.display())]
    StoreUnreadable {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to write credentials store {}: {source}", .path.display())]
    StoreUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("MFA token unavailable: {0}")]
    InputUnavailable(String),

    #[error("{operation} was rejected by STS: {message}")]
    ExchangeRejected {
        operation: &'static str,
        message: String,
    },

    #[error("missing configuration: {0}")]
    ConfigurationMissing(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, RefreshError>;
