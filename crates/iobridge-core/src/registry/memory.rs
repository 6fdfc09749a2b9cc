//! In-memory signal registry

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::{RegistryError, SignalRegistry};
use crate::mapping::{PinDirection, PinSpec};

#[derive(Debug, Clone, Copy)]
struct Slot {
    direction: PinDirection,
    value: bool,
}

/// Registry backed by a map in process memory.
///
/// Stands in for the control framework when it isn't available, so the
/// bridge can still be run and watched. Unset pins read as `false`.
pub struct MemoryRegistry {
    component: String,
    pins: RwLock<HashMap<String, Slot>>,
    ready: AtomicBool,
}

impl MemoryRegistry {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            pins: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(false),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.pins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.read().is_empty()
    }

    /// Direction a pin was declared with
    pub fn direction(&self, pin: &str) -> Option<PinDirection> {
        self.pins.read().get(pin).map(|slot| slot.direction)
    }

    /// Sorted copy of every pin value, for status displays
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.pins
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value))
            .collect()
    }
}

impl SignalRegistry for MemoryRegistry {
    fn declare(&self, pin: &PinSpec) -> Result<(), RegistryError> {
        let mut pins = self.pins.write();
        if pins.contains_key(&pin.name) {
            return Err(RegistryError::Duplicate(pin.name.clone()));
        }
        pins.insert(
            pin.name.clone(),
            Slot {
                direction: pin.direction,
                value: false,
            },
        );
        Ok(())
    }

    fn ready(&self) -> Result<(), RegistryError> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set(&self, pin: &str, value: bool) -> Result<(), RegistryError> {
        let mut pins = self.pins.write();
        let slot = pins
            .get_mut(pin)
            .ok_or_else(|| RegistryError::UnknownPin(pin.to_string()))?;
        tracing::trace!(component = %self.component, pin, value, "set");
        slot.value = value;
        Ok(())
    }

    fn get(&self, pin: &str) -> Result<bool, RegistryError> {
        self.pins
            .read()
            .get(pin)
            .map(|slot| slot.value)
            .ok_or_else(|| RegistryError::UnknownPin(pin.to_string()))
    }
}
