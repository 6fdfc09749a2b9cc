//! Pin mapping table
//!
//! Maps hardware bit positions to signal names and back. Every input gets
//! two pins, the value and its inverse (`input-00`, `input-00-not`), so
//! downstream logic can test for "not active" without an extra inverter.
//! Every output gets one pin (`output-00`).

use std::collections::HashMap;
use std::fmt;

use crate::error::ConfigError;

/// Which side of the bridge a pin belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    /// Driven from controller input states
    Input,
    /// Inverse of an input
    InputInverse,
    /// Read from the registry and sent to the controller
    Output,
}

/// Registry direction, seen from the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    /// The bridge writes the pin
    Out,
    /// The bridge reads the pin
    In,
}

impl PinRole {
    pub fn direction(self) -> PinDirection {
        match self {
            PinRole::Input | PinRole::InputInverse => PinDirection::Out,
            PinRole::Output => PinDirection::In,
        }
    }
}

/// Reverse lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinRef {
    pub role: PinRole,
    pub index: usize,
}

/// Pin names for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPins {
    pub name: String,
    pub inverse: String,
}

/// A pin to declare in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinSpec {
    pub name: String,
    pub direction: PinDirection,
}

/// Fixed mapping between hardware indices and pin names
#[derive(Debug, Clone)]
pub struct PinMap {
    component: String,
    inputs: Vec<InputPins>,
    outputs: Vec<String>,
    by_name: HashMap<String, PinRef>,
}

impl PinMap {
    /// Build the table for `input_count` inputs and `output_count` outputs.
    ///
    /// Both counts must be at least one and fit the wire format.
    pub fn new(
        component: impl Into<String>,
        input_count: usize,
        output_count: usize,
    ) -> Result<Self, ConfigError> {
        if input_count == 0 || input_count > crate::frame::MAX_INPUT_COUNT {
            return Err(ConfigError::InvalidCount {
                field: "input_count",
                value: input_count,
                max: crate::frame::MAX_INPUT_COUNT,
            });
        }
        if output_count == 0 || output_count > crate::config::MAX_OUTPUT_COUNT {
            return Err(ConfigError::InvalidCount {
                field: "output_count",
                value: output_count,
                max: crate::config::MAX_OUTPUT_COUNT,
            });
        }

        let inputs: Vec<InputPins> = (0..input_count)
            .map(|i| InputPins {
                name: format!("input-{:02}", i),
                inverse: format!("input-{:02}-not", i),
            })
            .collect();
        let outputs: Vec<String> = (0..output_count)
            .map(|i| format!("output-{:02}", i))
            .collect();

        let mut by_name = HashMap::with_capacity(input_count * 2 + output_count);
        for (index, pins) in inputs.iter().enumerate() {
            by_name.insert(
                pins.name.clone(),
                PinRef {
                    role: PinRole::Input,
                    index,
                },
            );
            by_name.insert(
                pins.inverse.clone(),
                PinRef {
                    role: PinRole::InputInverse,
                    index,
                },
            );
        }
        for (index, name) in outputs.iter().enumerate() {
            by_name.insert(
                name.clone(),
                PinRef {
                    role: PinRole::Output,
                    index,
                },
            );
        }

        Ok(Self {
            component: component.into(),
            inputs,
            outputs,
            by_name,
        })
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Pin names for input `index`
    pub fn input(&self, index: usize) -> Option<&InputPins> {
        self.inputs.get(index)
    }

    /// Pin name for output `index`
    pub fn output(&self, index: usize) -> Option<&str> {
        self.outputs.get(index).map(String::as_str)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputPins> {
        self.inputs.iter()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(String::as_str)
    }

    /// Find the hardware position behind a pin name
    pub fn resolve(&self, name: &str) -> Option<PinRef> {
        self.by_name.get(name).copied()
    }

    /// Fully qualified name, `<component>.<pin>`
    pub fn qualified(&self, name: &str) -> String {
        format!("{}.{}", self.component, name)
    }

    /// Every pin in declaration order: inputs (value, inverse), then outputs
    pub fn pins(&self) -> Vec<PinSpec> {
        let inputs = self.inputs.iter().flat_map(|pins| {
            [
                PinSpec {
                    name: pins.name.clone(),
                    direction: PinDirection::Out,
                },
                PinSpec {
                    name: pins.inverse.clone(),
                    direction: PinDirection::Out,
                },
            ]
        });
        let outputs = self.outputs.iter().map(|name| PinSpec {
            name: name.clone(),
            direction: PinDirection::In,
        });
        inputs.chain(outputs).collect()
    }
}

impl fmt::Display for PinMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} inputs, {} outputs)",
            self.component,
            self.inputs.len(),
            self.outputs.len()
        )
    }
}
