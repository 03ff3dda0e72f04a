//! Error types for playwatch-daemon.
//!
//! Internal code returns `DaemonError`; the IPC layer converts it to an
//! `ErrorInfo` before it reaches a client.

use playwatch_daemon_protocol::ErrorInfo;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, DaemonError>;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("Storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Home directory not found")]
    HomeNotFound,
}

impl DaemonError {
    pub fn code(&self) -> &'static str {
        match self {
            DaemonError::Storage { .. } => "storage_error",
            DaemonError::Io { .. } => "io_error",
            DaemonError::Config { .. } => "config_error",
            DaemonError::Mail(_) => "mail_error",
            DaemonError::HomeNotFound => "home_not_found",
        }
    }
}

impl From<DaemonError> for ErrorInfo {
    fn from(err: DaemonError) -> Self {
        ErrorInfo::new(err.code(), err.to_string())
    }
}

/// Attaches a context string to a rusqlite failure.
pub trait StorageContext<T> {
    fn storage_context(self, context: &str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, rusqlite::Error> {
    fn storage_context(self, context: &str) -> Result<T> {
        self.map_err(|source| DaemonError::Storage {
            context: context.to_string(),
            source,
        })
    }
}

/// Attaches a context string to an I/O failure.
pub trait IoContext<T> {
    fn io_context(self, context: &str) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, context: &str) -> Result<T> {
        self.map_err(|source| DaemonError::Io {
            context: context.to_string(),
            source,
        })
    }
}
