//! Transport layer errors

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("device disconnected: {0}")]
    Disconnected(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    /// The port rejected the configured line settings; retrying won't help
    #[error("invalid serial settings for {port}: {reason}")]
    InvalidSettings { port: String, reason: String },
}

impl LinkError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::ReadTimeout(_) | LinkError::WriteTimeout(_))
    }

    /// Whether the process should stop instead of reconnecting
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::InvalidSettings { .. })
    }
}
