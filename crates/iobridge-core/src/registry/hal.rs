//! LinuxCNC HAL registry
//!
//! Publishes pins through the HAL shared-memory library (`liblinuxcnchal`).
//! HAL pins are pointers into shared memory; the pointer slots themselves
//! have to live in HAL memory too, hence the `hal_malloc` per pin.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_long, c_void, CString};
use std::ptr;

use parking_lot::RwLock;

use super::{RegistryError, SignalRegistry};
use crate::mapping::{PinDirection, PinSpec};

const HAL_IN: c_int = 16;
const HAL_OUT: c_int = 32;

#[link(name = "linuxcnchal")]
extern "C" {
    fn hal_init(name: *const c_char) -> c_int;
    fn hal_ready(comp_id: c_int) -> c_int;
    fn hal_exit(comp_id: c_int) -> c_int;
    fn hal_malloc(size: c_long) -> *mut c_void;
    fn hal_pin_bit_new(
        name: *const c_char,
        dir: c_int,
        data_ptr_addr: *mut *mut bool,
        comp_id: c_int,
    ) -> c_int;
}

struct PinSlot(*mut *mut bool);

/// Pins owned by one HAL component
pub struct HalRegistry {
    component: String,
    comp_id: c_int,
    pins: RwLock<HashMap<String, PinSlot>>,
}

// SAFETY: pin slots point into HAL shared memory, which outlives the
// component; single pin reads and writes are atomic on HAL's side.
unsafe impl Send for HalRegistry {}
unsafe impl Sync for HalRegistry {}

impl HalRegistry {
    /// Register a HAL component named `component`
    pub fn new(component: &str) -> Result<Self, RegistryError> {
        let name = c_string(component)?;
        // SAFETY: `name` is a valid NUL-terminated string for the call
        let comp_id = unsafe { hal_init(name.as_ptr()) };
        if comp_id < 0 {
            return Err(RegistryError::Backend(format!(
                "hal_init({}) failed: {}",
                component, comp_id
            )));
        }
        Ok(Self {
            component: component.to_string(),
            comp_id,
            pins: RwLock::new(HashMap::new()),
        })
    }

    fn slot(&self, pin: &str) -> Result<*mut bool, RegistryError> {
        let pins = self.pins.read();
        let slot = pins
            .get(pin)
            .ok_or_else(|| RegistryError::UnknownPin(pin.to_string()))?;
        // SAFETY: the slot was filled by hal_pin_bit_new and never freed
        Ok(unsafe { *slot.0 })
    }
}

impl SignalRegistry for HalRegistry {
    fn declare(&self, pin: &PinSpec) -> Result<(), RegistryError> {
        let mut pins = self.pins.write();
        if pins.contains_key(&pin.name) {
            return Err(RegistryError::Duplicate(pin.name.clone()));
        }

        let full_name = c_string(&format!("{}.{}", self.component, pin.name))?;
        let dir = match pin.direction {
            PinDirection::Out => HAL_OUT,
            PinDirection::In => HAL_IN,
        };

        let size = std::mem::size_of::<*mut bool>() as c_long;
        // SAFETY: hal_malloc returns HAL shared memory or null
        let slot = unsafe { hal_malloc(size) } as *mut *mut bool;
        if slot.is_null() {
            return Err(RegistryError::Backend("hal_malloc failed".to_string()));
        }
        // SAFETY: slot is a valid, exclusively owned pointer slot
        unsafe { ptr::write(slot, ptr::null_mut()) };

        // SAFETY: name and slot are valid for the duration of the call
        let rc = unsafe { hal_pin_bit_new(full_name.as_ptr(), dir, slot, self.comp_id) };
        if rc != 0 {
            return Err(RegistryError::Backend(format!(
                "hal_pin_bit_new({}) failed: {}",
                pin.name, rc
            )));
        }

        pins.insert(pin.name.clone(), PinSlot(slot));
        Ok(())
    }

    fn ready(&self) -> Result<(), RegistryError> {
        // SAFETY: comp_id came from hal_init
        let rc = unsafe { hal_ready(self.comp_id) };
        if rc != 0 {
            return Err(RegistryError::Backend(format!("hal_ready failed: {}", rc)));
        }
        Ok(())
    }

    fn set(&self, pin: &str, value: bool) -> Result<(), RegistryError> {
        let data = self.slot(pin)?;
        // SAFETY: data points at the pin's HAL storage
        unsafe { ptr::write_volatile(data, value) };
        Ok(())
    }

    fn get(&self, pin: &str) -> Result<bool, RegistryError> {
        let data = self.slot(pin)?;
        // SAFETY: data points at the pin's HAL storage
        Ok(unsafe { ptr::read_volatile(data) })
    }
}

impl Drop for HalRegistry {
    fn drop(&mut self) {
        // SAFETY: comp_id came from hal_init and is released once
        unsafe {
            hal_exit(self.comp_id);
        }
    }
}

fn c_string(value: &str) -> Result<CString, RegistryError> {
    CString::new(value).map_err(|_| RegistryError::Backend(format!("NUL in name {:?}", value)))
}
