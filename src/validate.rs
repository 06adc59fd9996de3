//! Structural checks run before every evaluation.
//!
//! [`validate`] performs every check and collects non-fatal warnings.
//! [`validate_light`] re-checks only what a single edit or tick can change
//! locally (size ceilings, gate ids, positions, per-gate configuration) and
//! skips the wire referential and arity checks.

use crate::error::ValidationError;
use crate::model::{Circuit, Gate, GateKind};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const MAX_GATE_ID_LEN: usize = 128;
pub const MAX_GATES: usize = 10_000;
pub const MAX_WIRES: usize = 50_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationWarning {
    NoInputGates,
    NoOutputGates,
    UnconnectedInput { gate_id: String, pin: usize },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::NoInputGates => write!(f, "circuit has no INPUT or CLOCK gates"),
            ValidationWarning::NoOutputGates => write!(f, "circuit has no OUTPUT gates"),
            ValidationWarning::UnconnectedInput { gate_id, pin } => {
                write!(f, "input pin {} of gate {:?} is unconnected", pin, gate_id)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub warnings: Vec<ValidationWarning>,
}

pub fn validate(circuit: &Circuit) -> Result<ValidationReport, ValidationError> {
    check_limits(circuit)?;
    let index = check_gates(circuit)?;
    let driven = check_wires(circuit, &index)?;
    Ok(ValidationReport {
        warnings: collect_warnings(circuit, &driven),
    })
}

pub fn validate_light(circuit: &Circuit) -> Result<ValidationReport, ValidationError> {
    check_limits(circuit)?;
    check_gates(circuit)?;
    Ok(ValidationReport::default())
}

fn check_limits(circuit: &Circuit) -> Result<(), ValidationError> {
    if circuit.gates.len() > MAX_GATES {
        return Err(ValidationError::TooManyGates {
            count: circuit.gates.len(),
            max: MAX_GATES,
        });
    }
    if circuit.wires.len() > MAX_WIRES {
        return Err(ValidationError::TooManyWires {
            count: circuit.wires.len(),
            max: MAX_WIRES,
        });
    }
    Ok(())
}

fn check_gates(circuit: &Circuit) -> Result<HashMap<&str, &Gate>, ValidationError> {
    let mut index: HashMap<&str, &Gate> = HashMap::with_capacity(circuit.gates.len());
    for (idx, gate) in circuit.gates.iter().enumerate() {
        check_gate_id(&gate.id, idx)?;
        if index.insert(gate.id.as_str(), gate).is_some() {
            return Err(ValidationError::DuplicateGateId {
                id: gate.id.clone(),
            });
        }
        if gate.kind == GateKind::Unknown {
            return Err(ValidationError::UnknownGateType {
                id: gate.id.clone(),
            });
        }
        if !gate.position.x.is_finite() || !gate.position.y.is_finite() {
            return Err(ValidationError::NonFinitePosition {
                id: gate.id.clone(),
            });
        }
        match gate.kind {
            GateKind::Custom => check_custom_definition(gate)?,
            GateKind::Clock => {
                if let Some(freq) = gate.metadata.frequency {
                    if !freq.is_finite() || freq <= 0.0 {
                        return Err(ValidationError::InvalidClockFrequency {
                            id: gate.id.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(index)
}

fn check_gate_id(id: &str, index: usize) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptyGateId { index });
    }
    if id.chars().count() > MAX_GATE_ID_LEN {
        return Err(ValidationError::GateIdTooLong {
            id: id.to_string(),
            max: MAX_GATE_ID_LEN,
        });
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':');
    if !id.chars().all(allowed) {
        return Err(ValidationError::InvalidGateId { id: id.to_string() });
    }
    Ok(())
}

fn check_custom_definition(gate: &Gate) -> Result<(), ValidationError> {
    let def = gate
        .custom_gate_definition
        .as_ref()
        .ok_or_else(|| ValidationError::MissingCustomDefinition {
            id: gate.id.clone(),
        })?;
    let invalid = |reason: &str| ValidationError::InvalidCustomDefinition {
        id: gate.id.clone(),
        reason: reason.to_string(),
    };
    if def.inputs.is_empty() {
        return Err(invalid("no input pins"));
    }
    if def.outputs.is_empty() {
        return Err(invalid("no output pins"));
    }
    let has_table = def.truth_table.as_ref().is_some_and(|t| !t.is_empty());
    if def.circuit.is_none() && !has_table {
        return Err(invalid("neither an internal circuit nor a truth table"));
    }
    Ok(())
}

/// Returns the set of `(gate id, input pin)` pairs that are driven by a wire.
fn check_wires<'a>(
    circuit: &'a Circuit,
    index: &HashMap<&str, &Gate>,
) -> Result<HashMap<(&'a str, usize), &'a str>, ValidationError> {
    let mut wire_ids: HashSet<&str> = HashSet::with_capacity(circuit.wires.len());
    let mut driven: HashMap<(&str, usize), &str> = HashMap::with_capacity(circuit.wires.len());
    for (idx, wire) in circuit.wires.iter().enumerate() {
        if wire.id.is_empty() {
            return Err(ValidationError::EmptyWireId { index: idx });
        }
        if !wire_ids.insert(wire.id.as_str()) {
            return Err(ValidationError::DuplicateWireId {
                id: wire.id.clone(),
            });
        }
        let dangling = |gate_id: &str| ValidationError::DanglingWire {
            wire_id: wire.id.clone(),
            gate_id: gate_id.to_string(),
        };
        let source = index
            .get(wire.from.gate_id.as_str())
            .ok_or_else(|| dangling(&wire.from.gate_id))?;
        let target = index
            .get(wire.to.gate_id.as_str())
            .ok_or_else(|| dangling(&wire.to.gate_id))?;

        if let Some(slot) = wire.from.output_slot() {
            let arity = source.output_arity();
            if slot >= arity {
                return Err(ValidationError::SourcePinOutOfRange {
                    wire_id: wire.id.clone(),
                    gate_id: source.id.clone(),
                    slot,
                    arity,
                });
            }
        }

        let arity = target.input_arity();
        let pin = match wire.to.input_pin() {
            Some(pin) if pin < arity => pin,
            _ => {
                return Err(ValidationError::PinOutOfRange {
                    wire_id: wire.id.clone(),
                    gate_id: target.id.clone(),
                    pin: wire.to.pin_index,
                    arity,
                })
            }
        };
        if let Some(existing) = driven.insert((wire.to.gate_id.as_str(), pin), wire.id.as_str()) {
            return Err(ValidationError::PinAlreadyDriven {
                wire_id: wire.id.clone(),
                gate_id: target.id.clone(),
                pin,
                existing: existing.to_string(),
            });
        }
    }
    Ok(driven)
}

fn collect_warnings(
    circuit: &Circuit,
    driven: &HashMap<(&str, usize), &str>,
) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    if circuit.gates.is_empty() {
        return warnings;
    }
    if !circuit
        .gates
        .iter()
        .any(|g| matches!(g.kind, GateKind::Input | GateKind::Clock))
    {
        warnings.push(ValidationWarning::NoInputGates);
    }
    if !circuit.gates.iter().any(|g| g.kind == GateKind::Output) {
        warnings.push(ValidationWarning::NoOutputGates);
    }
    for gate in &circuit.gates {
        for pin in 0..gate.input_arity() {
            if !driven.contains_key(&(gate.id.as_str(), pin)) {
                warnings.push(ValidationWarning::UnconnectedInput {
                    gate_id: gate.id.clone(),
                    pin,
                });
            }
        }
    }
    warnings
}
