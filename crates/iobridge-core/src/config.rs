//! Bridge configuration
//!
//! Configuration is loaded once at startup and never changes afterwards.
//! The top-level keys also accept the upper-case names used by the older
//! JSON configuration files (`COMPONENT`, `INPUT_COUNT`, ...), so those
//! files load unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frame::MAX_INPUT_COUNT;

/// Upper bound on outputs; one byte per output in a single frame
pub const MAX_OUTPUT_COUNT: usize = 255;

/// Configuration for the serial I/O bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Component name; every pin name is prefixed with it
    #[serde(alias = "COMPONENT")]
    pub component: String,
    /// Number of inputs the controller reports
    #[serde(alias = "INPUT_COUNT")]
    pub input_count: usize,
    /// Number of outputs the controller expects
    #[serde(alias = "OUTPUT_COUNT")]
    pub output_count: usize,
    /// Substring of the USB device description to connect to
    #[serde(default, alias = "DEVICE_DESCRIPTION")]
    pub device_description: Option<String>,
    /// Exact USB serial number, disambiguates identical boards
    #[serde(default, alias = "DEVICE_SERIAL")]
    pub device_serial: Option<String>,
    /// Log verbosity (`debug`, `info`, `warning`, ...)
    #[serde(default, alias = "LOG_LEVEL", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Transport selection
    #[serde(default)]
    pub transport: TransportKind,
    /// Serial line settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Loop timing
    #[serde(default)]
    pub timing: TimingConfig,
    /// Input fallback behaviour
    #[serde(default)]
    pub inputs: InputConfig,
    /// Device discovery behaviour
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl BridgeConfig {
    /// Minimal configuration with defaults for everything optional
    pub fn new(component: impl Into<String>, input_count: usize, output_count: usize) -> Self {
        Self {
            component: component.into(),
            input_count,
            output_count,
            device_description: None,
            device_serial: None,
            log_level: None,
            transport: TransportKind::default(),
            serial: SerialConfig::default(),
            timing: TimingConfig::default(),
            inputs: InputConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }

    /// Set the device description filter
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.device_description = Some(description.into());
        self
    }

    /// Set the device serial number filter
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.device_serial = Some(serial.into());
        self
    }

    /// Check every invariant; called once before anything is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_component(&self.component)?;

        if self.input_count == 0 || self.input_count > MAX_INPUT_COUNT {
            return Err(ConfigError::InvalidCount {
                field: "input_count",
                value: self.input_count,
                max: MAX_INPUT_COUNT,
            });
        }
        if self.output_count == 0 || self.output_count > MAX_OUTPUT_COUNT {
            return Err(ConfigError::InvalidCount {
                field: "output_count",
                value: self.output_count,
                max: MAX_OUTPUT_COUNT,
            });
        }

        // The mock transport simulates its own device and needs no selector
        if self.transport == TransportKind::Serial
            && non_empty(&self.device_description).is_none()
            && non_empty(&self.device_serial).is_none()
        {
            return Err(ConfigError::MissingDeviceSelector);
        }

        self.serial.validate()?;
        self.timing.validate()?;
        Ok(())
    }

    /// Description filter, ignoring empty strings
    pub fn description_filter(&self) -> Option<&str> {
        non_empty(&self.device_description)
    }

    /// Serial number filter, ignoring empty strings
    pub fn serial_filter(&self) -> Option<&str> {
        non_empty(&self.device_serial)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn validate_component(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidComponent(name.to_string()))
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Which transport the bridge talks through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// A real serial device found by discovery
    #[default]
    Serial,
    /// Simulated controller, for bench testing without hardware
    Mock,
}

// =============================================================================
// Serial line
// =============================================================================

/// Serial line settings; the data format is always 8N1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Must match the rate the controller firmware was built with
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// XON/XOFF
    #[serde(default)]
    pub software_flow_control: bool,
    /// RTS/CTS
    #[serde(default = "default_true")]
    pub hardware_flow_control: bool,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            software_flow_control: false,
            hardware_flow_control: default_true(),
            read_timeout_ms: default_read_timeout(),
            write_timeout_ms: default_write_timeout(),
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.software_flow_control && self.hardware_flow_control {
            return Err(ConfigError::ConflictingFlowControl);
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "serial.baud_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "serial timeouts",
                reason: "read and write timeouts must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_true() -> bool {
    true
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_write_timeout() -> u64 {
    2000
}

// =============================================================================
// Timing
// =============================================================================

/// Poll loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Frames discarded after opening, while flow control settles
    #[serde(default = "default_warmup_reads")]
    pub warmup_reads: u32,
    /// Sleep between cycles
    #[serde(default = "default_idle_delay")]
    pub idle_delay_ms: u64,
    /// Wait after opening before the first read; the board resets on open
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    /// Interval between throughput reports
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            warmup_reads: default_warmup_reads(),
            idle_delay_ms: default_idle_delay(),
            settle_ms: default_settle(),
            report_interval_secs: default_report_interval(),
        }
    }
}

impl TimingConfig {
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Never busy-spin
        if self.idle_delay_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "timing.idle_delay_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn default_warmup_reads() -> u32 {
    25
}

fn default_idle_delay() -> u64 {
    1
}

fn default_settle() -> u64 {
    1000
}

fn default_report_interval() -> u64 {
    10
}

// =============================================================================
// Inputs
// =============================================================================

/// What to publish when input data can't be trusted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFallback {
    /// Publish the configured default state
    #[default]
    Default,
    /// Keep the last value that was decoded successfully
    Hold,
}

/// Input handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// State used for inputs that could not be decoded
    #[serde(default)]
    pub default_state: bool,
    #[serde(default)]
    pub fallback: InputFallback,
}

// =============================================================================
// Discovery
// =============================================================================

/// How to resolve several devices matching the filters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Refuse to pick; set `device_serial` to disambiguate
    #[default]
    Reject,
    /// Use the last enumerated match
    LastMatch,
}

/// Device discovery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
}
