//! Serial port adapter
//!
//! Talks to the controller over a USB CDC serial port at 8N1. Reads are
//! framed on the terminator byte, but header bytes (checksum, count) can
//! legitimately equal the terminator, so a frame is only taken where a full
//! frame's worth of bytes ends in a terminator and carries the expected
//! input count.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use iobridge_core::frame::{INPUT_HEADER_LEN, INPUT_TRAILER_LEN, TERMINATOR};
use iobridge_core::{input_frame_len, BridgeConfig, SerialConfig};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use super::{Connector, LinkError, PortId, SerialLink};
use crate::discovery::{self, DeviceFilter, DiscoveryError};

/// Read chunk size
const READ_CHUNK: usize = 256;

/// Pending bytes beyond this many frames are flushed as one bad frame
const MAX_PENDING_FRAMES: usize = 4;

/// Discovers and opens the controller's serial port
pub struct SerialConnector {
    filter: DeviceFilter,
    settings: SerialConfig,
    frame_len: usize,
}

impl SerialConnector {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            filter: DeviceFilter::from_config(config),
            settings: config.serial.clone(),
            frame_len: input_frame_len(config.input_count),
        }
    }

    fn flow_control(&self) -> FlowControl {
        if self.settings.hardware_flow_control {
            FlowControl::Hardware
        } else if self.settings.software_flow_control {
            FlowControl::Software
        } else {
            FlowControl::None
        }
    }
}

impl Connector for SerialConnector {
    fn discover(&self) -> Result<PortId, DiscoveryError> {
        discovery::discover(&self.filter)
    }

    fn open(&self, port: &PortId) -> Result<Box<dyn SerialLink>, LinkError> {
        let serial = serialport::new(port.as_str(), self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(self.flow_control())
            .timeout(self.settings.read_timeout())
            .open()
            .map_err(|e| open_error(port, e))?;

        info!(
            port = %port,
            baud_rate = self.settings.baud_rate,
            flow_control = ?self.flow_control(),
            "Serial port opened"
        );

        Ok(Box::new(SerialPortLink {
            port_id: port.clone(),
            port: serial,
            frames: FrameBuffer::new(self.frame_len),
            read_timeout: self.settings.read_timeout(),
            write_timeout: self.settings.write_timeout(),
        }))
    }
}

/// An open serial port to the controller
pub struct SerialPortLink {
    port_id: PortId,
    port: Box<dyn SerialPort>,
    frames: FrameBuffer,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SerialLink for SerialPortLink {
    fn port(&self) -> &PortId {
        &self.port_id
    }

    fn read_frame(&mut self) -> Result<Bytes, LinkError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(frame) = self.frames.next_frame() {
                return Ok(frame);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::ReadTimeout(self.read_timeout));
            }
            self.port
                .set_timeout(remaining)
                .map_err(|e| LinkError::Io(e.to_string()))?;

            match self.port.read(&mut chunk) {
                // A tty only reports end of file after hangup
                Ok(0) => {
                    return Err(LinkError::Disconnected(format!(
                        "{}: end of stream",
                        self.port_id
                    )))
                }
                Ok(n) => self.frames.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(LinkError::ReadTimeout(self.read_timeout))
                }
                Err(e) => return Err(io_error(&self.port_id, e)),
            }
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.port
            .set_timeout(self.write_timeout)
            .map_err(|e| LinkError::Io(e.to_string()))?;

        match self.port.write_all(frame) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                Err(LinkError::WriteTimeout(self.write_timeout))
            }
            Err(e) => Err(io_error(&self.port_id, e)),
        }
    }

    fn discard_output(&mut self) -> Result<(), LinkError> {
        debug!(port = %self.port_id, "Discarding unsent output");
        self.port
            .clear(ClearBuffer::Output)
            .map_err(|e| LinkError::Io(e.to_string()))
    }
}

/// Reassembles input frames from the raw byte stream
pub(crate) struct FrameBuffer {
    pending: BytesMut,
    frame_len: usize,
}

impl FrameBuffer {
    pub(crate) fn new(frame_len: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(frame_len * MAX_PENDING_FRAMES),
            frame_len,
        }
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next frame off the front of the buffer.
    ///
    /// A frame is the `frame_len` bytes ending at a terminator whose count
    /// byte matches the expected input count. Bytes ahead of that window
    /// belong to a partial or damaged frame and are dropped, which puts a
    /// stream joined mid-frame back in step. If no aligned window turns up
    /// within several frames the whole buffer is returned so the decoder
    /// can reject it.
    pub(crate) fn next_frame(&mut self) -> Option<Bytes> {
        let last = self.frame_len.saturating_sub(1);
        let count = self.frame_len.saturating_sub(INPUT_HEADER_LEN + INPUT_TRAILER_LEN);
        let pending = &self.pending;
        let aligned = (last..pending.len()).find(|&end| {
            pending[end] == TERMINATOR && usize::from(pending[end - last + 1]) == count
        });

        if let Some(end) = aligned {
            let window_start = end - last;
            if window_start > 0 {
                let skipped = self.pending.split_to(window_start);
                debug!(
                    skipped = skipped.len(),
                    bytes = %hex::encode(&skipped),
                    "Dropped bytes ahead of input frame"
                );
            }
            return Some(self.pending.split_to(self.frame_len).freeze());
        }

        if self.pending.len() > self.frame_len * MAX_PENDING_FRAMES {
            return Some(self.pending.split().freeze());
        }
        None
    }
}

fn open_error(port: &PortId, e: serialport::Error) -> LinkError {
    match e.kind() {
        serialport::ErrorKind::InvalidInput => LinkError::InvalidSettings {
            port: port.to_string(),
            reason: e.to_string(),
        },
        _ => LinkError::Open {
            port: port.to_string(),
            reason: e.to_string(),
        },
    }
}

fn io_error(port: &PortId, e: io::Error) -> LinkError {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotFound
        | io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => LinkError::Disconnected(format!("{}: {}", port, e)),
        _ => LinkError::Io(format!("{}: {}", port, e)),
    }
}
