//! iobridge-serial - Serial link and poll loop for the I/O bridge
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        PollLoop                             │
//! │  read ─▶ decode ─▶ publish ─▶ collect ─▶ encode ─▶ write    │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ PinMap      │  │ CycleStats  │  │ SignalRegistry      │  │
//! │  │ (names)     │  │ (reports)   │  │ (framework pins)    │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │                          │                                  │
//! │                 ┌────────┴──────────┐                       │
//! │                 │ ConnectionManager │                       │
//! │                 │ (state machine)   │                       │
//! │                 └────────┬──────────┘                       │
//! │                 ┌────────┴────────┐                         │
//! │                 │ Connector/Link  │                         │
//! │                 │ (serial / mock) │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod connection;
pub mod discovery;
pub mod error;
pub mod poll;
pub mod stats;
pub mod transport;

pub use connection::{ConnectError, ConnectionManager, ConnectionState, Readiness};
pub use discovery::{enumerate_ports, select_port, DeviceFilter, DiscoveryError, PortInfo};
pub use error::BridgeError;
pub use poll::{CycleOutcome, InputStatus, PollLoop, PollSettings};
pub use stats::{CycleStats, Report};
pub use transport::{create_connector, Connector, LinkError, PortId, SerialLink};
