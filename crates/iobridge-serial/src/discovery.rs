//! USB serial device discovery
//!
//! Enumerates the serial ports the OS knows about and picks the one whose
//! USB descriptors match the configured description and serial number.
//! Enumeration and selection are split so selection can be tested without
//! hardware.

use std::fmt;

use iobridge_core::{AmbiguityPolicy, BridgeConfig};
use serialport::SerialPortType;
use thiserror::Error;
use tracing::{debug, warn};

use crate::transport::PortId;

/// A serial port seen during enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortInfo {
    /// OS device path (e.g. `/dev/ttyACM0`, `COM3`)
    pub name: String,
    /// USB product string
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    /// USB serial number
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortInfo {
    /// A port with no USB descriptors
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn usb(
        name: impl Into<String>,
        description: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            serial_number: Some(serial_number.into()),
            ..Default::default()
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (model: {}, serial: {}",
            self.name,
            self.description.as_deref().unwrap_or("-"),
            self.serial_number.as_deref().unwrap_or("-"),
        )?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, ", id: {:04x}:{:04x}", vid, pid)?;
        }
        f.write_str(")")
    }
}

/// Discovery errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error(
        "device not found (description: {}, serial: {}); available: [{}]",
        .description.as_deref().unwrap_or("any"),
        .serial.as_deref().unwrap_or("any"),
        join(.observed)
    )]
    NotFound {
        description: Option<String>,
        serial: Option<String>,
        observed: Vec<PortInfo>,
    },

    #[error("{} devices match, set device_serial to choose one: [{}]", .candidates.len(), join(.candidates))]
    Ambiguous { candidates: Vec<PortInfo> },

    #[error("serial port enumeration failed: {0}")]
    Enumeration(String),
}

fn join(ports: &[PortInfo]) -> String {
    ports
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Which device to connect to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Substring of the product, manufacturer or port name
    pub description: Option<String>,
    /// Exact USB serial number
    pub serial: Option<String>,
    pub ambiguity: AmbiguityPolicy,
}

impl DeviceFilter {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            description: config.description_filter().map(str::to_string),
            serial: config.serial_filter().map(str::to_string),
            ambiguity: config.discovery.ambiguity,
        }
    }

    /// Both configured filters must match; an absent filter matches anything
    pub fn matches(&self, port: &PortInfo) -> bool {
        let description_ok = match &self.description {
            None => true,
            Some(wanted) => [
                port.description.as_deref(),
                port.manufacturer.as_deref(),
                Some(port.name.as_str()),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.contains(wanted.as_str())),
        };
        let serial_ok = match &self.serial {
            None => true,
            Some(wanted) => port.serial_number.as_deref() == Some(wanted.as_str()),
        };
        description_ok && serial_ok
    }
}

/// Pick the device matching `filter` from an enumeration result
pub fn select_port(ports: &[PortInfo], filter: &DeviceFilter) -> Result<PortId, DiscoveryError> {
    let candidates: Vec<&PortInfo> = ports.iter().filter(|p| filter.matches(p)).collect();

    match candidates.as_slice() {
        [] => Err(DiscoveryError::NotFound {
            description: filter.description.clone(),
            serial: filter.serial.clone(),
            observed: ports.to_vec(),
        }),
        [only] => Ok(PortId::new(only.name.clone())),
        [.., last] => match filter.ambiguity {
            AmbiguityPolicy::LastMatch => {
                warn!(
                    matches = candidates.len(),
                    port = %last.name,
                    "Several devices match, using the last one"
                );
                Ok(PortId::new(last.name.clone()))
            }
            AmbiguityPolicy::Reject => Err(DiscoveryError::Ambiguous {
                candidates: candidates.into_iter().cloned().collect(),
            }),
        },
    }
}

/// List the serial ports currently present
pub fn enumerate_ports() -> Result<Vec<PortInfo>, DiscoveryError> {
    let ports = serialport::available_ports()
        .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?;

    let ports: Vec<PortInfo> = ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                name: port.port_name,
                description: usb.product,
                manufacturer: usb.manufacturer,
                serial_number: usb.serial_number,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
            },
            _ => PortInfo::named(port.port_name),
        })
        .collect();

    debug!(count = ports.len(), "Enumerated serial ports");
    Ok(ports)
}

/// Enumerate and select in one step
pub fn discover(filter: &DeviceFilter) -> Result<PortId, DiscoveryError> {
    let ports = enumerate_ports()?;
    select_port(&ports, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mega(name: &str, serial: &str) -> PortInfo {
        PortInfo {
            manufacturer: Some("Arduino (www.arduino.cc)".to_string()),
            vid: Some(0x2341),
            pid: Some(0x0042),
            ..PortInfo::usb(name, "Arduino Mega 2560", serial)
        }
    }

    fn filter(description: Option<&str>, serial: Option<&str>) -> DeviceFilter {
        DeviceFilter {
            description: description.map(str::to_string),
            serial: serial.map(str::to_string),
            ambiguity: AmbiguityPolicy::Reject,
        }
    }

    #[test]
    fn test_select_by_description() {
        let ports = vec![PortInfo::named("/dev/ttyS0"), mega("/dev/ttyACM0", "A1")];
        let port = select_port(&ports, &filter(Some("Mega"), None)).unwrap();
        assert_eq!(port.as_str(), "/dev/ttyACM0");
    }

    #[test]
    fn test_description_matches_manufacturer() {
        let ports = vec![mega("/dev/ttyACM0", "A1")];
        assert!(select_port(&ports, &filter(Some("arduino.cc"), None)).is_ok());
    }

    #[test]
    fn test_serial_disambiguates() {
        let ports = vec![mega("/dev/ttyACM0", "A1"), mega("/dev/ttyACM1", "B2")];
        let port = select_port(&ports, &filter(Some("Mega"), Some("B2"))).unwrap();
        assert_eq!(port.as_str(), "/dev/ttyACM1");
    }

    #[test]
    fn test_serial_must_match_exactly() {
        let ports = vec![mega("/dev/ttyACM0", "A1")];
        let err = select_port(&ports, &filter(None, Some("A"))).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound { .. }));
    }

    #[test]
    fn test_no_ports_reports_not_found() {
        let err = select_port(&[], &filter(Some("Mega"), None)).unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::NotFound {
                description: Some("Mega".to_string()),
                serial: None,
                observed: vec![],
            }
        );
    }

    #[test]
    fn test_not_found_lists_observed_devices() {
        let ports = vec![
            PortInfo::named("/dev/ttyS0"),
            PortInfo::usb("/dev/ttyUSB0", "FT232R", "X9"),
        ];
        let err = select_port(&ports, &filter(Some("Mega"), None)).unwrap_err();

        match &err {
            DiscoveryError::NotFound { observed, .. } => assert_eq!(observed, &ports),
            other => panic!("unexpected error: {other:?}"),
        }
        let text = err.to_string();
        assert!(text.contains("/dev/ttyS0"));
        assert!(text.contains("FT232R"));
    }

    #[test]
    fn test_ambiguous_rejected_by_default() {
        let ports = vec![mega("/dev/ttyACM0", "A1"), mega("/dev/ttyACM1", "B2")];
        let err = select_port(&ports, &filter(Some("Mega"), None)).unwrap_err();
        match err {
            DiscoveryError::Ambiguous { candidates } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_last_match() {
        let ports = vec![mega("/dev/ttyACM0", "A1"), mega("/dev/ttyACM1", "B2")];
        let mut f = filter(Some("Mega"), None);
        f.ambiguity = AmbiguityPolicy::LastMatch;
        assert_eq!(select_port(&ports, &f).unwrap().as_str(), "/dev/ttyACM1");
    }

    #[test]
    fn test_empty_filter_matches_anything() {
        let f = DeviceFilter::default();
        assert!(f.matches(&PortInfo::named("/dev/ttyS0")));
    }

    #[test]
    fn test_filter_from_config_ignores_blank_values() {
        let config = BridgeConfig::new("arduino", 4, 4)
            .with_description("Mega")
            .with_serial("  ");
        let f = DeviceFilter::from_config(&config);
        assert_eq!(f.description.as_deref(), Some("Mega"));
        assert_eq!(f.serial, None);
    }

    #[test]
    fn test_port_info_display() {
        let text = mega("/dev/ttyACM0", "A1").to_string();
        assert_eq!(
            text,
            "/dev/ttyACM0 (model: Arduino Mega 2560, serial: A1, id: 2341:0042)"
        );
    }
}
