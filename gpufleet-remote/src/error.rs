use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Remote transport error types
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Failed to load private key {}: {reason}", path.display())]
    Key { path: PathBuf, reason: String },

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether the error came from a timeout firing
    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Timeout(_))
    }

    /// Whether the session can no longer be used after this error
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self,
            RemoteError::SessionClosed | RemoteError::Ssh(_) | RemoteError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
