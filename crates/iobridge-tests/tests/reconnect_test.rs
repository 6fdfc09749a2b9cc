//! Device loss and recovery

use std::sync::Arc;

use iobridge_core::{AmbiguityPolicy, BridgeConfig, MemoryRegistry, SignalRegistry, TransportKind};
use iobridge_serial::transport::mock::{MockController, MOCK_PORT};
use iobridge_serial::{CycleOutcome, DeviceFilter, InputStatus, LinkError, PollLoop, PortInfo};
use pretty_assertions::assert_eq;

fn mock_config() -> BridgeConfig {
    let mut config = BridgeConfig::new("arduino", 3, 2).with_description("Mock I/O");
    config.transport = TransportKind::Mock;
    config.timing.settle_ms = 0;
    config.timing.warmup_reads = 3;
    config
}

fn start(config: &BridgeConfig, controller: &MockController) -> (PollLoop, Arc<MemoryRegistry>) {
    let registry = Arc::new(MemoryRegistry::new(config.component.clone()));
    let poll = PollLoop::new(
        config,
        registry.clone(),
        Box::new(controller.connector(DeviceFilter::from_config(config))),
    )
    .unwrap();
    (poll, registry)
}

fn run_until_serviced(poll: &mut PollLoop, max_cycles: usize) -> usize {
    for cycle in 1..=max_cycles {
        if let CycleOutcome::Serviced { .. } = poll.step().unwrap() {
            return cycle;
        }
    }
    panic!("not serviced within {} cycles", max_cycles);
}

#[test]
fn test_reconnect_after_reenumeration() {
    let config = mock_config();
    let controller = MockController::new(3);
    let (mut poll, registry) = start(&config, &controller);

    controller.set_inputs(vec![true, true, false]);
    // Open + 3 warm-up reads, then the first serviced cycle
    assert_eq!(run_until_serviced(&mut poll, 10), 4);
    assert_eq!(registry.get("input-01"), Ok(true));

    controller.unplug();
    let outcome = poll.step().unwrap();
    assert!(matches!(outcome, CycleOutcome::Offline { .. }));
    for _ in 0..3 {
        assert!(matches!(poll.step().unwrap(), CycleOutcome::Offline { .. }));
    }

    // The board comes back under a different device name
    controller.replug("mock1");
    controller.set_inputs(vec![false, true, true]);
    assert_eq!(run_until_serviced(&mut poll, 10), 4);

    assert_eq!(controller.open_count(), 2);
    assert_eq!(poll.connection().disconnects(), 1);
    assert_eq!(registry.get("input-02"), Ok(true));
    assert_eq!(registry.get("input-00-not"), Ok(true));
}

#[test]
fn test_no_matching_device_retries() {
    let config = mock_config();
    let controller = MockController::new(3)
        .with_other_ports(vec![PortInfo::usb("/dev/ttyUSB0", "FT232R USB UART", "A50285BI")]);
    controller.unplug();
    let (mut poll, registry) = start(&config, &controller);

    for _ in 0..20 {
        match poll.step().unwrap() {
            CycleOutcome::Offline { reason } => {
                assert!(reason.contains("device not found"), "{}", reason);
                assert!(reason.contains("FT232R"), "{}", reason);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(controller.write_count(), 0);
    assert_eq!(registry.get("input-00"), Ok(false));

    controller.replug(MOCK_PORT);
    run_until_serviced(&mut poll, 10);
    assert_eq!(controller.write_count(), 1);
}

#[test]
fn test_ambiguous_devices() {
    let twin = PortInfo::usb("/dev/ttyACM7", "Mock I/O Controller", "TWIN0002");

    let config = mock_config();
    let controller = MockController::new(3).with_other_ports(vec![twin.clone()]);
    let (mut poll, _registry) = start(&config, &controller);
    match poll.step().unwrap() {
        CycleOutcome::Offline { reason } => assert!(reason.contains("2 devices match")),
        other => panic!("unexpected outcome: {:?}", other),
    }

    // A serial number picks the right board
    let config = mock_config().with_serial("MOCK0001");
    let controller = MockController::new(3).with_other_ports(vec![twin.clone()]);
    let (mut poll, _registry) = start(&config, &controller);
    run_until_serviced(&mut poll, 10);

    // Or the last enumerated match, when configured
    let mut config = mock_config();
    config.discovery.ambiguity = AmbiguityPolicy::LastMatch;
    let controller = MockController::new(3).with_other_ports(vec![twin]);
    let (mut poll, _registry) = start(&config, &controller);
    run_until_serviced(&mut poll, 10);
    assert_eq!(
        poll.connection().state().port().map(|p| p.as_str()),
        Some(MOCK_PORT)
    );
}

#[test]
fn test_warmup_survives_slow_boot() {
    let config = mock_config();
    let controller = MockController::new(3);
    // Discard read plus two warm-up reads time out while the board boots
    for _ in 0..3 {
        controller.push_read_error(LinkError::ReadTimeout(std::time::Duration::from_secs(1)));
    }
    let (mut poll, _registry) = start(&config, &controller);

    assert_eq!(run_until_serviced(&mut poll, 10), 6);
    assert_eq!(controller.open_count(), 1);
}

#[test]
fn test_write_failure_reconnects() {
    let mut config = mock_config();
    config.timing.warmup_reads = 0;
    let controller = MockController::new(3);
    let (mut poll, _registry) = start(&config, &controller);

    poll.step().unwrap();
    controller.push_write_result(Err(LinkError::Io("EIO".to_string())));
    assert!(matches!(poll.step().unwrap(), CycleOutcome::Offline { .. }));

    assert_eq!(
        poll.step().unwrap(),
        CycleOutcome::Serviced {
            inputs: InputStatus::Valid,
            output_written: true,
        }
    );
    assert_eq!(controller.open_count(), 2);
}
