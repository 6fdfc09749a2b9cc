//! Transport layer for the controller link
//!
//! This module provides the link to the controller:
//! - Serial port adapter for real hardware
//! - Mock controller for testing and bench runs
//!
//! # Example
//!
//! ```ignore
//! use iobridge_serial::transport::create_connector;
//!
//! let connector = create_connector(&config);
//! let port = connector.discover()?;
//! let mut link = connector.open(&port)?;
//! let frame = link.read_frame()?;
//! ```

pub mod error;
pub mod mock;
pub mod serial;

pub use error::LinkError;

use std::fmt;

use bytes::Bytes;
use iobridge_core::{BridgeConfig, TransportKind};

use crate::discovery::{DeviceFilter, DiscoveryError};

/// Identifies a serial device, e.g. `/dev/ttyACM0` or `COM3`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortId(String);

impl PortId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open link to the controller.
///
/// Owned by exactly one connection manager; nothing else reads or writes it.
pub trait SerialLink: Send {
    /// Port this link was opened on
    fn port(&self) -> &PortId;

    /// Read one terminated frame, waiting at most the configured read timeout
    fn read_frame(&mut self) -> Result<Bytes, LinkError>;

    /// Write one frame, waiting at most the configured write timeout
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Drop any output still queued for transmission
    fn discard_output(&mut self) -> Result<(), LinkError>;
}

/// Finds and opens the controller
pub trait Connector: Send {
    /// Locate the one device matching the configured filters
    fn discover(&self) -> Result<PortId, DiscoveryError>;

    /// Open `port` with the configured line settings
    fn open(&self, port: &PortId) -> Result<Box<dyn SerialLink>, LinkError>;
}

/// Create a connector based on configuration
pub fn create_connector(config: &BridgeConfig) -> Box<dyn Connector> {
    match config.transport {
        TransportKind::Serial => Box::new(serial::SerialConnector::new(config)),
        TransportKind::Mock => {
            // The simulated board stands in for whatever device the file names
            let filter = DeviceFilter {
                ambiguity: config.discovery.ambiguity,
                ..DeviceFilter::default()
            };
            let controller = mock::MockController::new(config.input_count).with_loopback(true);
            Box::new(controller.connector(filter))
        }
    }
}
