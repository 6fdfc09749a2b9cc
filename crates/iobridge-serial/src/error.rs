//! Bridge errors
//!
//! Only conditions that should stop the process surface as [`BridgeError`];
//! everything recoverable is logged and retried inside the poll loop.

use iobridge_core::{ConfigError, RegistryError};
use thiserror::Error;

use crate::connection::ConnectError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("unrecoverable device error: {0}")]
    Device(#[from] ConnectError),
}
