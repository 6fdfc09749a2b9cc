//! Poll loop
//!
//! Each cycle reads one input frame, publishes it to the registry, collects
//! the desired outputs and writes one output frame. Cycles never block
//! longer than one read timeout plus one write timeout; a bad frame or a
//! lost device only degrades the cycle and the loop keeps going.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use iobridge_core::{
    decode_input_frame, declare_pins, encode_output_frame, input_frame_len, BridgeConfig,
    InputFallback, PinMap, SignalRegistry,
};
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectError, ConnectionManager, Readiness};
use crate::error::BridgeError;
use crate::stats::{format_bits, CycleStats, Report};
use crate::transport::{Connector, LinkError};

/// Poll loop settings derived from [`BridgeConfig`]
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub idle_delay: Duration,
    pub report_interval: Duration,
    pub default_state: bool,
    pub fallback: InputFallback,
}

impl From<&BridgeConfig> for PollSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            idle_delay: config.timing.idle_delay(),
            report_interval: config.timing.report_interval(),
            default_state: config.inputs.default_state,
            fallback: config.inputs.fallback,
        }
    }
}

/// How the input side of a cycle went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// A valid frame was published
    Valid,
    /// No usable frame; the fallback policy was applied
    Degraded,
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The link is settling or warming up
    Connecting,
    /// No link this cycle; retried on the next one
    Offline { reason: String },
    /// Frames were exchanged
    Serviced {
        inputs: InputStatus,
        output_written: bool,
    },
}

/// Drives the frame exchange between the controller and the registry
pub struct PollLoop {
    pins: PinMap,
    registry: Arc<dyn SignalRegistry>,
    connection: ConnectionManager,
    settings: PollSettings,
    stats: CycleStats,
    last_inputs: Vec<bool>,
    last_outputs: Vec<bool>,
    last_connect_error: Option<String>,
}

impl PollLoop {
    /// Validate `config`, declare the pins and publish the default inputs
    pub fn new(
        config: &BridgeConfig,
        registry: Arc<dyn SignalRegistry>,
        connector: Box<dyn Connector>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let pins = PinMap::new(
            config.component.clone(),
            config.input_count,
            config.output_count,
        )?;
        declare_pins(registry.as_ref(), &pins)?;

        let settings = PollSettings::from(config);
        let mut poll = Self {
            last_inputs: vec![settings.default_state; pins.input_count()],
            last_outputs: vec![false; pins.output_count()],
            pins,
            registry,
            connection: ConnectionManager::new(connector, &config.timing),
            settings,
            stats: CycleStats::new(Instant::now()),
            last_connect_error: None,
        };
        let defaults = poll.last_inputs.clone();
        poll.publish(&defaults);

        info!(
            component = poll.pins.component(),
            inputs = poll.pins.input_count(),
            outputs = poll.pins.output_count(),
            frame_len = input_frame_len(poll.pins.input_count()),
            "Bridge initialized"
        );
        Ok(poll)
    }

    pub fn pins(&self) -> &PinMap {
        &self.pins
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Input states most recently published
    pub fn last_inputs(&self) -> &[bool] {
        &self.last_inputs
    }

    /// Output states most recently sent
    pub fn last_outputs(&self) -> &[bool] {
        &self.last_outputs
    }

    /// Run until `shutdown` is set
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), BridgeError> {
        info!(component = self.pins.component(), "Poll loop started");
        while !shutdown.load(Ordering::SeqCst) {
            self.step()?;
            thread::sleep(self.settings.idle_delay);
        }
        info!(component = self.pins.component(), "Poll loop stopped");
        Ok(())
    }

    /// Run one cycle.
    ///
    /// Only unrecoverable conditions return an error.
    pub fn step(&mut self) -> Result<CycleOutcome, BridgeError> {
        match self.connection.advance() {
            Ok(Readiness::Ready) => {
                if self.last_connect_error.take().is_some() {
                    info!("Controller reachable again");
                }
            }
            Ok(Readiness::Pending) => return Ok(CycleOutcome::Connecting),
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Cannot use the controller with this configuration");
                return Err(e.into());
            }
            Err(e) => return Ok(self.offline(e)),
        }

        let inputs = match self.connection.read_frame() {
            Ok(raw) => self.apply_frame(&raw),
            Err(e @ LinkError::ReadTimeout(_)) => {
                warn!(error = %e, "No input frame from controller");
                self.stats.record_read_timeout();
                self.apply_fallback();
                InputStatus::Degraded
            }
            Err(e) => {
                error!(error = %e, "Failed to read input from controller");
                self.stats.record_disconnect();
                return Ok(CycleOutcome::Offline {
                    reason: e.to_string(),
                });
            }
        };

        let outputs = self.collect_outputs();
        let frame = encode_output_frame(&outputs);
        let output_written = match self.connection.write_frame(&frame) {
            Ok(()) => {
                debug!(frame = %hex::encode(&frame), "Output frame sent");
                self.stats.record_output();
                true
            }
            Err(e @ LinkError::WriteTimeout(_)) => {
                warn!(error = %e, "Output write timed out, unsent data discarded");
                self.stats.record_write_timeout();
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to write output to controller");
                self.stats.record_disconnect();
                return Ok(CycleOutcome::Offline {
                    reason: e.to_string(),
                });
            }
        };
        if output_written {
            self.last_outputs = outputs;
        }

        self.maybe_report();

        Ok(CycleOutcome::Serviced {
            inputs,
            output_written,
        })
    }

    fn offline(&mut self, error: ConnectError) -> CycleOutcome {
        let reason = error.to_string();
        // Logged loudly once per distinct failure, quietly while it repeats
        if self.last_connect_error.as_deref() == Some(reason.as_str()) {
            debug!(error = %reason, "Controller still unavailable");
        } else {
            warn!(error = %reason, "Controller unavailable, retrying");
            self.last_connect_error = Some(reason.clone());
        }
        CycleOutcome::Offline { reason }
    }

    fn apply_frame(&mut self, raw: &[u8]) -> InputStatus {
        let expected = self.pins.input_count();
        match decode_input_frame(raw, expected, self.settings.default_state) {
            Ok(decoded) => {
                let mut states = decoded.states;
                for anomaly in &decoded.anomalies {
                    warn!(
                        pin = self.pins.input(anomaly.index).map(|p| p.name.as_str()),
                        value = anomaly.value,
                        "Non-binary pin state from controller"
                    );
                    if self.settings.fallback == InputFallback::Hold {
                        states[anomaly.index] = self.last_inputs[anomaly.index];
                    }
                }
                self.stats.record_anomalies(decoded.anomalies.len());
                self.stats.record_input();
                self.publish(&states);
                self.last_inputs = states;
                InputStatus::Valid
            }
            Err(invalid) => {
                for e in &invalid.errors {
                    warn!(
                        len = invalid.len,
                        expected_len = input_frame_len(expected),
                        error = %e,
                        "Invalid input frame"
                    );
                }
                debug!(frame = %hex::encode(raw), "Rejected input frame");
                self.stats.record_degraded();
                self.apply_fallback();
                InputStatus::Degraded
            }
        }
    }

    fn apply_fallback(&mut self) {
        match self.settings.fallback {
            InputFallback::Default => {
                let defaults = vec![self.settings.default_state; self.pins.input_count()];
                self.publish(&defaults);
                self.last_inputs = defaults;
            }
            InputFallback::Hold => {}
        }
    }

    fn publish(&self, states: &[bool]) {
        for (pins, &state) in self.pins.inputs().zip(states) {
            if let Err(e) = self.registry.set(&pins.name, state) {
                warn!(pin = %pins.name, error = %e, "Failed to publish input");
            }
            if let Err(e) = self.registry.set(&pins.inverse, !state) {
                warn!(pin = %pins.inverse, error = %e, "Failed to publish input");
            }
        }
    }

    fn collect_outputs(&self) -> Vec<bool> {
        self.pins
            .outputs()
            .map(|name| {
                self.registry.get(name).unwrap_or_else(|e| {
                    warn!(pin = name, error = %e, "Failed to read output, sending off");
                    false
                })
            })
            .collect()
    }

    fn maybe_report(&mut self) {
        let now = Instant::now();
        if !self.stats.is_due(now, self.settings.report_interval) {
            return;
        }
        let report: Report = self.stats.take_report(now);
        if report.has_faults() {
            warn!(component = self.pins.component(), "{}", report);
        } else {
            info!(component = self.pins.component(), "{}", report);
        }
        info!("input:  {}", format_bits(&self.last_inputs));
        info!("output: {}", format_bits(&self.last_outputs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DeviceFilter;
    use crate::transport::mock::MockController;
    use iobridge_core::{encode_input_frame, MemoryRegistry, TransportKind};
    use pretty_assertions::assert_eq;

    fn config(inputs: usize, outputs: usize) -> BridgeConfig {
        let mut config = BridgeConfig::new("arduino", inputs, outputs);
        config.transport = TransportKind::Mock;
        config.timing.settle_ms = 0;
        config.timing.warmup_reads = 0;
        config
    }

    fn bridge(config: &BridgeConfig) -> (PollLoop, MockController, Arc<MemoryRegistry>) {
        let controller = MockController::new(config.input_count);
        let registry = Arc::new(MemoryRegistry::new(config.component.clone()));
        let poll = PollLoop::new(
            config,
            registry.clone(),
            Box::new(controller.connector(DeviceFilter::default())),
        )
        .unwrap();
        (poll, controller, registry)
    }

    const SERVICED: CycleOutcome = CycleOutcome::Serviced {
        inputs: InputStatus::Valid,
        output_written: true,
    };

    #[test]
    fn test_initial_state_published() {
        let (_poll, _controller, registry) = bridge(&config(2, 1));
        assert_eq!(registry.get("input-00"), Ok(false));
        assert_eq!(registry.get("input-00-not"), Ok(true));
    }

    #[test]
    fn test_cycle_publishes_inputs_and_writes_outputs() {
        let (mut poll, controller, registry) = bridge(&config(3, 2));
        controller.set_inputs(vec![true, true, false]);
        registry.set("output-01", true).unwrap();

        assert_eq!(poll.step().unwrap(), SERVICED);

        assert_eq!(registry.get("input-00"), Ok(true));
        assert_eq!(registry.get("input-00-not"), Ok(false));
        assert_eq!(registry.get("input-02"), Ok(false));
        assert_eq!(registry.get("input-02-not"), Ok(true));
        assert_eq!(controller.written(), vec![vec![0, 1, b'\n']]);
        assert_eq!(poll.last_outputs(), &[false, true]);
    }

    #[test]
    fn test_checksum_error_publishes_default() {
        let mut cfg = config(3, 1);
        cfg.inputs.default_state = false;
        let (mut poll, controller, registry) = bridge(&cfg);

        controller.set_inputs(vec![true, true, true]);
        poll.step().unwrap();
        assert_eq!(registry.get("input-00"), Ok(true));

        controller.push_frame(vec![9, 3, 100, 100, 1, b'\n']);
        let outcome = poll.step().unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Serviced {
                inputs: InputStatus::Degraded,
                output_written: true,
            }
        );
        assert_eq!(registry.get("input-00"), Ok(false));
        assert_eq!(registry.get("input-00-not"), Ok(true));
        assert_eq!(controller.write_count(), 2);
    }

    #[test]
    fn test_hold_keeps_last_good_inputs() {
        let mut cfg = config(3, 1);
        cfg.inputs.fallback = InputFallback::Hold;
        let (mut poll, controller, registry) = bridge(&cfg);

        controller.set_inputs(vec![true, false, true]);
        poll.step().unwrap();

        controller.push_frame(b"garbage\n".to_vec());
        controller.push_read_error(LinkError::ReadTimeout(Duration::from_secs(1)));
        poll.step().unwrap();
        poll.step().unwrap();

        assert_eq!(registry.get("input-00"), Ok(true));
        assert_eq!(registry.get("input-02"), Ok(true));
        assert_eq!(poll.last_inputs(), &[true, false, true]);
    }

    #[test]
    fn test_anomaly_uses_default_state() {
        let mut cfg = config(3, 1);
        cfg.inputs.default_state = true;
        let (mut poll, controller, registry) = bridge(&cfg);

        poll.step().unwrap();
        // 50 is neither on nor off; checksum counts it as off
        controller.push_frame(vec![7, 3, 100, 50, 1, b'\n']);
        let outcome = poll.step().unwrap();

        assert_eq!(outcome, SERVICED);
        assert_eq!(poll.last_inputs(), &[true, true, false]);
        assert_eq!(registry.get("input-01"), Ok(true));
    }

    #[test]
    fn test_read_timeout_still_writes() {
        let (mut poll, controller, _registry) = bridge(&config(2, 2));
        poll.step().unwrap();

        controller.push_read_error(LinkError::ReadTimeout(Duration::from_secs(1)));
        let outcome = poll.step().unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Serviced {
                inputs: InputStatus::Degraded,
                output_written: true,
            }
        );
        assert_eq!(controller.write_count(), 2);
        assert!(poll.connection().is_active());
    }

    #[test]
    fn test_read_error_skips_write() {
        let (mut poll, controller, _registry) = bridge(&config(2, 2));
        poll.step().unwrap();

        controller.push_read_error(LinkError::Io("EIO".to_string()));
        let outcome = poll.step().unwrap();

        assert!(matches!(outcome, CycleOutcome::Offline { .. }));
        assert_eq!(controller.write_count(), 1);
        assert!(!poll.connection().is_active());
    }

    #[test]
    fn test_write_timeout_keeps_running() {
        let (mut poll, controller, registry) = bridge(&config(2, 2));
        registry.set("output-01", true).unwrap();
        controller.push_write_result(Err(LinkError::WriteTimeout(Duration::from_secs(2))));

        assert_eq!(
            poll.step().unwrap(),
            CycleOutcome::Serviced {
                inputs: InputStatus::Valid,
                output_written: false,
            }
        );
        // Nothing reached the controller, so the last sent state is unchanged
        assert_eq!(poll.last_outputs(), &[false, false]);

        assert_eq!(poll.step().unwrap(), SERVICED);
        assert_eq!(poll.last_outputs(), &[false, true]);
        assert_eq!(controller.discard_count(), 1);
    }

    #[test]
    fn test_device_missing_is_not_fatal() {
        let (mut poll, controller, _registry) = bridge(&config(2, 2));
        controller.unplug();

        for _ in 0..5 {
            assert!(matches!(poll.step().unwrap(), CycleOutcome::Offline { .. }));
        }
        assert_eq!(controller.write_count(), 0);
    }

    #[test]
    fn test_invalid_settings_are_fatal() {
        let (mut poll, controller, _registry) = bridge(&config(2, 2));
        controller.fail_next_open(LinkError::InvalidSettings {
            port: "mock0".to_string(),
            reason: "baud rate".to_string(),
        });
        assert!(matches!(poll.step(), Err(BridgeError::Device(_))));
    }

    #[test]
    fn test_connecting_during_warmup() {
        let mut cfg = config(2, 2);
        cfg.timing.warmup_reads = 2;
        let (mut poll, controller, _registry) = bridge(&cfg);

        assert_eq!(poll.step().unwrap(), CycleOutcome::Connecting);
        assert_eq!(poll.step().unwrap(), CycleOutcome::Connecting);
        assert_eq!(poll.step().unwrap(), SERVICED);
        assert_eq!(controller.write_count(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = config(0, 2);
        let controller = MockController::new(1);
        let registry = Arc::new(MemoryRegistry::new("arduino"));
        let result = PollLoop::new(
            &cfg,
            registry,
            Box::new(controller.connector(DeviceFilter::default())),
        );
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let (mut poll, controller, _registry) = bridge(&config(2, 2));
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });

        poll.run(&shutdown).unwrap();
        stopper.join().unwrap();
        assert!(controller.write_count() > 0);
    }

    #[test]
    fn test_generated_frame_matches_scenario() {
        assert_eq!(encode_input_frame(&[true, true, false]), vec![8, 3, 100, 100, 1, b'\n']);
    }
}
