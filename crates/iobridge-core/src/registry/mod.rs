//! Signal registry boundary
//!
//! The control framework exposes named boolean pins. The bridge declares
//! its pins once, publishes input states to them and reads output states
//! from them every cycle. Pins are atomic individually; nothing here locks
//! across pins.
//!
//! Implementations:
//! - [`MemoryRegistry`]: in-process store, used for tests and whenever the
//!   framework is not available
//! - `HalRegistry`: LinuxCNC HAL pins (feature `linuxcnc`)

mod memory;

#[cfg(feature = "linuxcnc")]
pub mod hal;

pub use memory::MemoryRegistry;

use thiserror::Error;

use crate::mapping::{PinMap, PinSpec};

/// Registry errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid pin name: {0}")]
    UnknownPin(String),

    #[error("pin already declared: {0}")]
    Duplicate(String),

    #[error("registry backend error: {0}")]
    Backend(String),
}

/// Named boolean pins shared with the control framework
pub trait SignalRegistry: Send + Sync {
    /// Create a pin; only valid before [`SignalRegistry::ready`]
    fn declare(&self, pin: &PinSpec) -> Result<(), RegistryError>;

    /// Mark the component ready; the framework may start using its pins
    fn ready(&self) -> Result<(), RegistryError>;

    /// Write a pin
    fn set(&self, pin: &str, value: bool) -> Result<(), RegistryError>;

    /// Read a pin
    fn get(&self, pin: &str) -> Result<bool, RegistryError>;
}

/// Declare every pin in `map` and mark the registry ready
pub fn declare_pins(registry: &dyn SignalRegistry, map: &PinMap) -> Result<(), RegistryError> {
    for pin in map.pins() {
        registry.declare(&pin)?;
    }
    registry.ready()?;
    tracing::debug!(component = map.component(), "registry component is ready");
    Ok(())
}
