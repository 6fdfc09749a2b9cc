//! Wire frame encoding and decoding
//!
//! Input frame (controller → host):
//! - CHECKSUM (1 byte): sum over state bytes of `CHECKSUM_ON` or `CHECKSUM_OFF`
//! - COUNT (1 byte): number of inputs the firmware is configured for
//! - STATES (COUNT bytes): `PIN_ON` or `PIN_OFF` per input
//! - TERMINATOR (1 byte): `\n`
//!
//! Output frame (host → controller):
//! - STATES (one byte per output): `0` or `1`
//! - TERMINATOR (1 byte): `\n`
//!
//! Output frames carry no checksum. The controller disables every output if
//! it stops hearing from the host, so one is sent every cycle.

use thiserror::Error;

/// Input state byte for an active input
pub const PIN_ON: u8 = 100;

/// Input state byte for an inactive input
pub const PIN_OFF: u8 = 1;

/// Checksum weight of an ON state byte
pub const CHECKSUM_ON: u32 = 3;

/// Checksum weight of any other state byte
pub const CHECKSUM_OFF: u32 = 2;

/// Frame terminator in both directions
pub const TERMINATOR: u8 = b'\n';

/// Bytes before the input states (checksum + count)
pub const INPUT_HEADER_LEN: usize = 2;

/// Bytes after the input states (terminator)
pub const INPUT_TRAILER_LEN: usize = 1;

/// Largest input count whose checksum still fits the one-byte field
pub const MAX_INPUT_COUNT: usize = (u8::MAX as u32 / CHECKSUM_ON) as usize;

/// A single validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid msg length: {actual}, expected: {expected}")]
    TooShort { expected: usize, actual: usize },

    #[error("the configured inputs and the number reported by the device do not match: {expected} != {reported}")]
    InputCountMismatch { expected: usize, reported: u8 },

    #[error("bad checksum: (controller) {reported} != (calculated) {calculated}")]
    ChecksumMismatch { reported: u8, calculated: u32 },

    #[error("input states wrong length, expected: {expected}, got: {actual}")]
    StateLengthMismatch { expected: usize, actual: usize },
}

/// A rejected input frame and every reason it was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid input frame ({len} bytes): {}", describe(.errors))]
pub struct InvalidFrame {
    /// Raw length of the rejected frame
    pub len: usize,
    /// Failures in detection order; never empty
    pub errors: Vec<FrameError>,
}

impl InvalidFrame {
    /// The first failure detected
    pub fn first(&self) -> &FrameError {
        // `errors` is only ever built non-empty
        &self.errors[0]
    }

    /// Whether a failure of the same kind as `kind` was detected
    pub fn contains(&self, kind: fn(&FrameError) -> bool) -> bool {
        self.errors.iter().any(kind)
    }
}

fn describe(errors: &[FrameError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A state byte that was neither `PIN_ON` nor `PIN_OFF`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateAnomaly {
    /// Input index
    pub index: usize,
    /// Raw byte received
    pub value: u8,
}

/// Successfully validated input states
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInputs {
    /// One entry per input, in index order
    pub states: Vec<bool>,
    /// Inputs that were replaced by the default state
    pub anomalies: Vec<StateAnomaly>,
    /// Checksum carried by (and matching) the frame
    pub checksum: u8,
}

/// Total length of a well-formed input frame
pub fn input_frame_len(input_count: usize) -> usize {
    INPUT_HEADER_LEN + input_count + INPUT_TRAILER_LEN
}

/// Checksum over raw state bytes, as computed by the controller
pub fn checksum(state_bytes: &[u8]) -> u32 {
    state_bytes
        .iter()
        .map(|&b| if b == PIN_ON { CHECKSUM_ON } else { CHECKSUM_OFF })
        .sum()
}

/// Validate and decode one input frame.
///
/// A frame shorter than [`input_frame_len`] is rejected with
/// [`FrameError::TooShort`] alone. Otherwise the count, checksum and state
/// length checks all run and every failure is reported.
///
/// State bytes outside `{PIN_ON, PIN_OFF}` don't fail the frame; they decode
/// to `default_state` and are listed in [`DecodedInputs::anomalies`].
pub fn decode_input_frame(
    raw: &[u8],
    expected_inputs: usize,
    default_state: bool,
) -> Result<DecodedInputs, InvalidFrame> {
    let expected_len = input_frame_len(expected_inputs);
    if raw.len() < expected_len {
        return Err(InvalidFrame {
            len: raw.len(),
            errors: vec![FrameError::TooShort {
                expected: expected_len,
                actual: raw.len(),
            }],
        });
    }

    let reported_checksum = raw[0];
    let reported_count = raw[1];
    let state_bytes = &raw[INPUT_HEADER_LEN..raw.len() - INPUT_TRAILER_LEN];

    let mut errors = Vec::new();

    if usize::from(reported_count) != expected_inputs {
        errors.push(FrameError::InputCountMismatch {
            expected: expected_inputs,
            reported: reported_count,
        });
    }

    let calculated = checksum(state_bytes);
    if calculated != u32::from(reported_checksum) {
        errors.push(FrameError::ChecksumMismatch {
            reported: reported_checksum,
            calculated,
        });
    }

    if state_bytes.len() != expected_inputs {
        errors.push(FrameError::StateLengthMismatch {
            expected: expected_inputs,
            actual: state_bytes.len(),
        });
    }

    if !errors.is_empty() {
        return Err(InvalidFrame {
            len: raw.len(),
            errors,
        });
    }

    let mut anomalies = Vec::new();
    let states = state_bytes
        .iter()
        .enumerate()
        .map(|(index, &value)| match value {
            PIN_ON => true,
            PIN_OFF => false,
            _ => {
                anomalies.push(StateAnomaly { index, value });
                default_state
            }
        })
        .collect();

    Ok(DecodedInputs {
        states,
        anomalies,
        checksum: reported_checksum,
    })
}

/// Build the output frame for the given desired output states
pub fn encode_output_frame(states: &[bool]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(states.len() + 1);
    frame.extend(states.iter().map(|&on| u8::from(on)));
    frame.push(TERMINATOR);
    frame
}

/// Decode an output frame back into states.
///
/// This is the controller's side of the exchange; the mock transport uses
/// it. Bytes other than 0 count as on. Returns `None` without a terminator.
pub fn decode_output_frame(frame: &[u8]) -> Option<Vec<bool>> {
    let (&last, states) = frame.split_last()?;
    if last != TERMINATOR {
        return None;
    }
    Some(states.iter().map(|&b| b != 0).collect())
}

/// Build an input frame the way the controller firmware does.
///
/// Panics if `states` holds more than [`MAX_INPUT_COUNT`] entries.
pub fn encode_input_frame(states: &[bool]) -> Vec<u8> {
    assert!(
        states.len() <= MAX_INPUT_COUNT,
        "input frame limited to {} states",
        MAX_INPUT_COUNT
    );

    let state_bytes: Vec<u8> = states
        .iter()
        .map(|&on| if on { PIN_ON } else { PIN_OFF })
        .collect();

    let mut frame = Vec::with_capacity(input_frame_len(states.len()));
    frame.push(checksum(&state_bytes) as u8);
    frame.push(states.len() as u8);
    frame.extend_from_slice(&state_bytes);
    frame.push(TERMINATOR);
    frame
}
