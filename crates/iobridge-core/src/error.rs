//! Configuration errors

use thiserror::Error;

/// Errors raised while validating configuration or building the pin map.
///
/// All of these are fatal: they are only produced at startup and the
/// bridge must not start polling after one of them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A pin count is zero or exceeds what the wire format can carry
    #[error("{field} invalid: {value} (must be between 1 and {max})")]
    InvalidCount {
        field: &'static str,
        value: usize,
        max: usize,
    },

    /// Neither a device description nor a serial number was configured
    #[error("no device selector configured: set device_description and/or device_serial")]
    MissingDeviceSelector,

    /// Software and hardware flow control were both enabled
    #[error("software (XON/XOFF) and hardware (RTS/CTS) flow control cannot both be enabled")]
    ConflictingFlowControl,

    /// Component name is empty or contains characters unusable in a pin name
    #[error("invalid component name: {0:?}")]
    InvalidComponent(String),

    /// Any other out-of-range setting
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}
