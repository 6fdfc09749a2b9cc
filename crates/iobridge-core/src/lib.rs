//! iobridge-core - Core types for the serial I/O bridge
//!
//! This crate holds the pieces of the bridge that never touch a serial port:
//! configuration, the pin mapping table, the wire frame codec and the signal
//! registry abstraction.
//!
//! # Data flow
//!
//! ```text
//!  controller ──raw bytes──▶ frame::decode_input_frame ──bools──▶ PinMap ──▶ SignalRegistry
//!  controller ◀──raw bytes── frame::encode_output_frame ◀──bools── PinMap ◀── SignalRegistry
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod mapping;
pub mod registry;

pub use config::{
    AmbiguityPolicy, BridgeConfig, DiscoveryConfig, InputConfig, InputFallback, SerialConfig,
    TimingConfig, TransportKind,
};
pub use error::ConfigError;
pub use frame::{
    decode_input_frame, decode_output_frame, encode_input_frame, encode_output_frame,
    input_frame_len, DecodedInputs, FrameError, InvalidFrame, StateAnomaly,
};
pub use mapping::{InputPins, PinDirection, PinMap, PinRef, PinRole, PinSpec};
pub use registry::{declare_pins, MemoryRegistry, RegistryError, SignalRegistry};
