//! Connection lifecycle
//!
//! One link to the controller at a time, driven as a state machine from
//! the poll loop so nothing ever blocks longer than a single read:
//!
//! ```text
//!  Unopened ──discover+open──▶ Settling ──delay elapsed──▶ Warming ──N reads──▶ Active
//!     ▲                                                       │                   │
//!     └──────────────────────── I/O error ────────────────────┴───────────────────┘
//! ```
//!
//! The controller resets when the port is opened, so every (re)open waits
//! out the settle delay and drains a number of frames before data is used.

use std::time::{Duration, Instant};

use bytes::Bytes;
use iobridge_core::TimingConfig;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::discovery::DiscoveryError;
use crate::transport::{Connector, LinkError, PortId, SerialLink};

/// Where the connection is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No port open
    Unopened,
    /// Port open, waiting for the controller to come out of reset
    Settling { port: PortId, until: Instant },
    /// Draining frames before trusting the link
    Warming { port: PortId, remaining: u32 },
    /// Exchanging frames
    Active { port: PortId },
}

impl ConnectionState {
    pub fn port(&self) -> Option<&PortId> {
        match self {
            ConnectionState::Unopened => None,
            ConnectionState::Settling { port, .. }
            | ConnectionState::Warming { port, .. }
            | ConnectionState::Active { port } => Some(port),
        }
    }
}

/// Result of advancing the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The link is active; this cycle may exchange frames
    Ready,
    /// Still settling or warming up
    Pending,
}

/// Failure to bring the connection up
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl ConnectError {
    /// Retrying won't fix this
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectError::Link(e) if e.is_fatal())
    }
}

/// Owns the link and its lifecycle
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    link: Option<Box<dyn SerialLink>>,
    state: ConnectionState,
    settle: Duration,
    warmup_reads: u32,
    connects: u64,
    disconnects: u64,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn Connector>, timing: &TimingConfig) -> Self {
        Self {
            connector,
            link: None,
            state: ConnectionState::Unopened,
            settle: timing.settle(),
            warmup_reads: timing.warmup_reads,
            connects: 0,
            disconnects: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ConnectionState::Active { .. })
    }

    /// Successful opens so far
    pub fn connects(&self) -> u64 {
        self.connects
    }

    /// Links dropped after an I/O error
    pub fn disconnects(&self) -> u64 {
        self.disconnects
    }

    /// Move the state machine forward by at most one step.
    ///
    /// Opens the port when there is none, then waits out the settle delay
    /// and consumes one warm-up frame per call. Returns
    /// [`Readiness::Ready`] once the link is active.
    pub fn advance(&mut self) -> Result<Readiness, ConnectError> {
        if self.state == ConnectionState::Unopened {
            self.connect()?;
        }

        if let ConnectionState::Settling { port, until } = &self.state {
            if Instant::now() < *until {
                return Ok(Readiness::Pending);
            }
            let port = port.clone();
            self.state = self.after_settle(port);
        }

        if let ConnectionState::Warming { port, remaining } = &self.state {
            let (port, remaining) = (port.clone(), *remaining);
            return self.warm_up(port, remaining);
        }

        Ok(Readiness::Ready)
    }

    fn connect(&mut self) -> Result<(), ConnectError> {
        let port = self.connector.discover()?;
        info!(port = %port, "Connecting to controller");

        let mut link = self.connector.open(&port)?;

        // The first line is usually the tail of a frame already in flight
        match link.read_frame() {
            Ok(raw) => debug!(port = %port, len = raw.len(), "Discarded first line"),
            Err(e) if e.is_timeout() => debug!(port = %port, "No data before first discard"),
            Err(e) => return Err(e.into()),
        }

        self.link = Some(link);
        self.connects += 1;
        self.state = if self.settle.is_zero() {
            self.after_settle(port)
        } else {
            debug!(
                port = %port,
                settle_ms = self.settle.as_millis() as u64,
                "Waiting for controller reset"
            );
            ConnectionState::Settling {
                port,
                until: Instant::now() + self.settle,
            }
        };
        Ok(())
    }

    fn after_settle(&self, port: PortId) -> ConnectionState {
        if self.warmup_reads == 0 {
            info!(port = %port, "Controller link active");
            ConnectionState::Active { port }
        } else {
            ConnectionState::Warming {
                port,
                remaining: self.warmup_reads,
            }
        }
    }

    fn warm_up(&mut self, port: PortId, remaining: u32) -> Result<Readiness, ConnectError> {
        let Some(link) = self.link.as_mut() else {
            self.state = ConnectionState::Unopened;
            return Err(LinkError::Disconnected(format!("{}: link missing", port)).into());
        };

        match link.read_frame() {
            Ok(_) => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    info!(port = %port, "Controller link active");
                    self.state = ConnectionState::Active { port };
                } else {
                    self.state = ConnectionState::Warming { port, remaining };
                }
            }
            // Controller still booting; doesn't count as a warm-up read
            Err(e) if e.is_timeout() => {
                debug!(port = %port, remaining, "Warm-up read timed out");
            }
            Err(e) => {
                warn!(port = %port, error = %e, "Link failed during warm-up");
                self.disconnect();
                return Err(e.into());
            }
        }
        Ok(Readiness::Pending)
    }

    /// Read one frame from the active link.
    ///
    /// Timeouts leave the link open; any other error drops it.
    pub fn read_frame(&mut self) -> Result<Bytes, LinkError> {
        let link = self.active_link()?;
        match link.read_frame() {
            Ok(raw) => Ok(raw),
            Err(e) if matches!(e, LinkError::ReadTimeout(_)) => Err(e),
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Write one frame to the active link.
    ///
    /// On timeout the unsent output is discarded and the link stays open;
    /// any other error drops it.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let link = self.active_link()?;
        match link.write_frame(frame) {
            Ok(()) => Ok(()),
            Err(e @ LinkError::WriteTimeout(_)) => {
                if let Err(discard) = link.discard_output() {
                    warn!(error = %discard, "Failed to discard output after write timeout");
                    self.disconnect();
                    return Err(discard);
                }
                Err(e)
            }
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Close the link; the next [`advance`](Self::advance) reconnects
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            info!(port = %link.port(), "Closing controller link");
            self.disconnects += 1;
        }
        self.state = ConnectionState::Unopened;
    }

    fn active_link(&mut self) -> Result<&mut Box<dyn SerialLink>, LinkError> {
        match (&self.state, self.link.as_mut()) {
            (ConnectionState::Active { .. }, Some(link)) => Ok(link),
            _ => Err(LinkError::Disconnected("link not active".to_string())),
        }
    }
}
