//! Error types for obs-core
//!
//! Every failure the transfer engine can surface is a variant here. Batch
//! preparation errors are returned to the caller as-is; per-item errors are
//! captured into a [`crate::transfer::BatchReport`] instead.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for obs-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for obs operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid combination of arguments or location kinds
    #[error("{0}")]
    Usage(String),

    /// Malformed remote path or missing configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity exchange failed or produced no token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Object-storage service missing from the service catalog
    #[error("Service catalog error: {0}")]
    Catalog(String),

    /// Remote request for one object returned an unexpected status
    #[error("{operation} {path} failed with HTTP {status}: {message}")]
    Transfer {
        operation: &'static str,
        path: String,
        status: u16,
        message: String,
    },

    /// Local I/O failure tied to a specific path
    #[error("{path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network or SDK dispatch failure
    #[error("Network error: {0}")]
    Network(String),

    /// Remote resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation aborted through the cancellation token
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Attach a path to a raw I/O error
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_mentions_status_and_path() {
        let err = Error::Transfer {
            operation: "GET",
            path: "backups/report.txt".to_string(),
            status: 404,
            message: "Not Found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("backups/report.txt"));
    }

    #[test]
    fn test_filesystem_error_mentions_path() {
        let err = Error::fs(
            "/tmp/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().starts_with("/tmp/missing"));
    }
}
