//! Mock controller for testing
//!
//! Simulates the expander firmware: every read returns a valid input frame
//! built from the controller's current inputs, every write is recorded and
//! decoded. Tests can script read/write results, fail opens and unplug the
//! device; a [`MockController`] handle stays usable after its connector has
//! been handed to the bridge.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use iobridge_core::{decode_output_frame, encode_input_frame};
use parking_lot::Mutex;

use super::{Connector, LinkError, PortId, SerialLink};
use crate::discovery::{select_port, DeviceFilter, DiscoveryError, PortInfo};

/// Port name the mock device enumerates as
pub const MOCK_PORT: &str = "mock0";

struct MockState {
    device: PortInfo,
    present: bool,
    /// Other ports on the simulated system; never matched by tests
    others: Vec<PortInfo>,
    inputs: Vec<bool>,
    /// Mirror the last written outputs onto the inputs
    loopback: bool,
    reads: VecDeque<Result<Vec<u8>, LinkError>>,
    write_results: VecDeque<Result<(), LinkError>>,
    open_failures: VecDeque<LinkError>,
    written: Vec<Vec<u8>>,
    outputs: Vec<bool>,
    opens: usize,
    discards: usize,
    /// Bumped on unplug; links from an older generation are dead
    generation: u64,
}

impl MockState {
    fn next_frame(&mut self) -> Vec<u8> {
        if self.loopback && !self.outputs.is_empty() {
            let outputs = &self.outputs;
            let mirrored = (0..self.inputs.len())
                .map(|i| outputs[i % outputs.len()])
                .collect();
            self.inputs = mirrored;
        }
        encode_input_frame(&self.inputs)
    }
}

/// Shared handle to a simulated controller
#[derive(Clone)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

impl MockController {
    /// A present controller with `input_count` inputs, all off
    pub fn new(input_count: usize) -> Self {
        let mut device = PortInfo::usb(MOCK_PORT, "Mock I/O Controller", "MOCK0001");
        device.manufacturer = Some("iobridge".to_string());
        Self {
            state: Arc::new(Mutex::new(MockState {
                device,
                present: true,
                others: Vec::new(),
                inputs: vec![false; input_count],
                loopback: false,
                reads: VecDeque::new(),
                write_results: VecDeque::new(),
                open_failures: VecDeque::new(),
                written: Vec::new(),
                outputs: Vec::new(),
                opens: 0,
                discards: 0,
                generation: 0,
            })),
        }
    }

    /// Echo written outputs back as inputs (bench wiring)
    pub fn with_loopback(self, loopback: bool) -> Self {
        self.state.lock().loopback = loopback;
        self
    }

    /// Add ports that enumerate alongside the controller
    pub fn with_other_ports(self, ports: Vec<PortInfo>) -> Self {
        self.state.lock().others = ports;
        self
    }

    /// Connector for this controller, selecting with `filter`
    pub fn connector(&self, filter: DeviceFilter) -> MockConnector {
        MockConnector {
            controller: self.clone(),
            filter,
        }
    }

    pub fn set_inputs(&self, inputs: Vec<bool>) {
        self.state.lock().inputs = inputs;
    }

    /// Queue a raw line for the next read
    pub fn push_frame(&self, raw: Vec<u8>) {
        self.state.lock().reads.push_back(Ok(raw));
    }

    /// Queue a read failure
    pub fn push_read_error(&self, error: LinkError) {
        self.state.lock().reads.push_back(Err(error));
    }

    /// Queue the result of the next write
    pub fn push_write_result(&self, result: Result<(), LinkError>) {
        self.state.lock().write_results.push_back(result);
    }

    /// Fail the next open with `error`
    pub fn fail_next_open(&self, error: LinkError) {
        self.state.lock().open_failures.push_back(error);
    }

    /// Simulate removing the USB cable; open links go dead
    pub fn unplug(&self) {
        let mut state = self.state.lock();
        state.present = false;
        state.generation += 1;
    }

    /// Simulate plugging the device back in, possibly under a new port name
    pub fn replug(&self, port: &str) {
        let mut state = self.state.lock();
        state.device.name = port.to_string();
        state.present = true;
    }

    /// Every frame written, including ones whose write failed
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().written.len()
    }

    /// Outputs from the last successful write
    pub fn outputs(&self) -> Vec<bool> {
        self.state.lock().outputs.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    pub fn discard_count(&self) -> usize {
        self.state.lock().discards
    }

    fn ports(&self) -> Vec<PortInfo> {
        let state = self.state.lock();
        let mut ports = state.others.clone();
        if state.present {
            ports.push(state.device.clone());
        }
        ports
    }
}

/// Connector backed by a [`MockController`]
pub struct MockConnector {
    controller: MockController,
    filter: DeviceFilter,
}

impl MockConnector {
    pub fn controller(&self) -> &MockController {
        &self.controller
    }
}

impl Connector for MockConnector {
    fn discover(&self) -> Result<PortId, DiscoveryError> {
        select_port(&self.controller.ports(), &self.filter)
    }

    fn open(&self, port: &PortId) -> Result<Box<dyn SerialLink>, LinkError> {
        let mut state = self.controller.state.lock();
        if let Some(error) = state.open_failures.pop_front() {
            return Err(error);
        }
        if !state.present || state.device.name != port.as_str() {
            return Err(LinkError::Open {
                port: port.to_string(),
                reason: "no such device".to_string(),
            });
        }
        state.opens += 1;
        Ok(Box::new(MockLink {
            controller: self.controller.clone(),
            port: port.clone(),
            generation: state.generation,
        }))
    }
}

/// An open link to a [`MockController`]
pub struct MockLink {
    controller: MockController,
    port: PortId,
    generation: u64,
}

impl MockLink {
    fn check_alive(&self, state: &MockState) -> Result<(), LinkError> {
        if state.generation != self.generation {
            return Err(LinkError::Disconnected(format!("{}: device removed", self.port)));
        }
        Ok(())
    }
}

impl SerialLink for MockLink {
    fn port(&self) -> &PortId {
        &self.port
    }

    fn read_frame(&mut self) -> Result<Bytes, LinkError> {
        let mut state = self.controller.state.lock();
        self.check_alive(&state)?;
        match state.reads.pop_front() {
            Some(scripted) => scripted.map(Bytes::from),
            None => Ok(Bytes::from(state.next_frame())),
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let mut state = self.controller.state.lock();
        self.check_alive(&state)?;
        state.written.push(frame.to_vec());
        if let Some(Err(error)) = state.write_results.pop_front() {
            return Err(error);
        }
        if let Some(outputs) = decode_output_frame(frame) {
            state.outputs = outputs;
        }
        Ok(())
    }

    fn discard_output(&mut self) -> Result<(), LinkError> {
        let mut state = self.controller.state.lock();
        self.check_alive(&state)?;
        state.discards += 1;
        Ok(())
    }
}
