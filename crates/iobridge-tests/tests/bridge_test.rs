//! Poll loop tests against the simulated controller

use std::sync::Arc;

use iobridge_core::{
    encode_input_frame, BridgeConfig, MemoryRegistry, SignalRegistry, TransportKind,
};
use iobridge_serial::transport::mock::MockController;
use iobridge_serial::{CycleOutcome, DeviceFilter, InputStatus, PollLoop};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn mock_config(inputs: usize, outputs: usize) -> BridgeConfig {
    let mut config = BridgeConfig::new("arduino", inputs, outputs);
    config.transport = TransportKind::Mock;
    config.timing.settle_ms = 0;
    config.timing.warmup_reads = 0;
    config
}

fn start(config: &BridgeConfig) -> (PollLoop, MockController, Arc<MemoryRegistry>) {
    let controller = MockController::new(config.input_count);
    let registry = Arc::new(MemoryRegistry::new(config.component.clone()));
    let poll = PollLoop::new(
        config,
        registry.clone(),
        Box::new(controller.connector(DeviceFilter::from_config(config))),
    )
    .unwrap();
    (poll, controller, registry)
}

/// A frame whose first state byte no longer matches the checksum
fn corrupted(inputs: &[bool]) -> Vec<u8> {
    let mut frame = encode_input_frame(inputs);
    frame[2] = if frame[2] == 100 { 1 } else { 100 };
    frame
}

#[test]
fn test_outputs_follow_registry() {
    let config = mock_config(4, 3);
    let (mut poll, controller, registry) = start(&config);

    registry.set("output-00", true).unwrap();
    registry.set("output-02", true).unwrap();
    poll.step().unwrap();
    assert_eq!(controller.outputs(), vec![true, false, true]);

    registry.set("output-00", false).unwrap();
    poll.step().unwrap();
    assert_eq!(controller.outputs(), vec![false, false, true]);
    assert_eq!(
        controller.written(),
        vec![vec![1, 0, 1, b'\n'], vec![0, 0, 1, b'\n']]
    );
}

#[test]
fn test_frames_with_terminator_in_header() {
    // Five inputs all off: the checksum byte is '\n'
    let config = mock_config(5, 1);
    let (mut poll, controller, registry) = start(&config);

    controller.set_inputs(vec![false; 5]);
    let outcome = poll.step().unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Serviced {
            inputs: InputStatus::Valid,
            output_written: true,
        }
    );
    assert_eq!(registry.get("input-04-not"), Ok(true));
}

#[test]
fn test_max_input_count() {
    let config = mock_config(85, 255);
    let (mut poll, controller, registry) = start(&config);

    let inputs: Vec<bool> = (0..85).map(|i| i % 2 == 0).collect();
    controller.set_inputs(inputs.clone());
    poll.step().unwrap();

    assert_eq!(poll.last_inputs(), inputs.as_slice());
    assert_eq!(registry.get("input-84"), Ok(true));
    assert_eq!(controller.written()[0].len(), 256);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_one_write_per_cycle_under_corruption(
        corrupt in proptest::collection::vec(proptest::bool::weighted(0.01), 1000)
    ) {
        let config = mock_config(6, 4);
        let (mut poll, controller, _registry) = start(&config);
        let inputs = vec![true, false, true, true, false, false];
        controller.set_inputs(inputs.clone());

        // Connect first so the discarded first line doesn't eat a script entry
        poll.step().unwrap();
        let baseline = controller.write_count();

        let mut degraded = 0;
        for &bad in &corrupt {
            if bad {
                controller.push_frame(corrupted(&inputs));
            }
            match poll.step().unwrap() {
                CycleOutcome::Serviced { inputs: status, output_written } => {
                    prop_assert!(output_written);
                    if status == InputStatus::Degraded {
                        degraded += 1;
                    }
                }
                other => prop_assert!(false, "unexpected outcome: {:?}", other),
            }
        }

        prop_assert_eq!(controller.write_count() - baseline, corrupt.len());
        prop_assert_eq!(degraded, corrupt.iter().filter(|&&bad| bad).count());
    }

    #[test]
    fn prop_inputs_and_inverses_published(
        inputs in proptest::collection::vec(any::<bool>(), 1..=85)
    ) {
        let config = mock_config(inputs.len(), 1);
        let (mut poll, controller, registry) = start(&config);
        controller.set_inputs(inputs.clone());

        poll.step().unwrap();

        for (i, &state) in inputs.iter().enumerate() {
            prop_assert_eq!(registry.get(&format!("input-{:02}", i)), Ok(state));
            prop_assert_eq!(registry.get(&format!("input-{:02}-not", i)), Ok(!state));
        }
    }
}
