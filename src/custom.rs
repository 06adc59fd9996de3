//! Custom gates.
//!
//! A custom gate is evaluated either by running its internal circuit through
//! the same orchestrator as the top-level circuit, or by looking its inputs
//! up in a flat truth table. Definitions coming out of the authoring tools
//! may be partial, so a mapping that points nowhere reads as `false`.

use crate::engine::{self, EvalContext, PinOverrides};
use crate::error::{CircuitError, EvaluationError};
use crate::gate_eval::GateOutcome;
use crate::model::{
    parse_display_bit, Circuit, CustomGateDefinition, Gate, GateKind, InternalCircuit,
};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

pub fn evaluate_custom(
    gate: &Gate,
    inputs: &[bool],
    ctx: &mut EvalContext<'_>,
) -> Result<GateOutcome, CircuitError> {
    let missing = || EvaluationError::MissingDefinition {
        gate_id: gate.id.clone(),
    };
    let definition = gate.custom_gate_definition.as_ref().ok_or_else(missing)?;
    if let Some(internal) = &definition.circuit {
        return evaluate_internal(gate, definition, internal, inputs, ctx);
    }
    match &definition.truth_table {
        Some(table) if !table.is_empty() => Ok(GateOutcome::from_values(
            lookup_truth_table(table, inputs, definition.outputs.len()),
            gate.metadata.clone(),
        )),
        _ => Err(missing().into()),
    }
}

fn evaluate_internal(
    gate: &Gate,
    definition: &CustomGateDefinition,
    internal: &InternalCircuit,
    inputs: &[bool],
    ctx: &mut EvalContext<'_>,
) -> Result<GateOutcome, CircuitError> {
    let max_depth = ctx.config.max_recursion_depth;
    if ctx.depth + 1 > max_depth {
        return Err(EvaluationError::RecursionLimit {
            gate_id: gate.id.clone(),
            max_depth,
        }
        .into());
    }

    let mut gates = starting_gates(gate, internal);
    let mut overrides = PinOverrides::new();
    for pin in 0..definition.inputs.len() {
        let value = inputs.get(pin).copied().unwrap_or(false);
        for (target_id, pin_index) in input_targets(definition, internal, pin) {
            match gates.iter_mut().find(|g| g.id == target_id) {
                Some(target) if target.kind == GateKind::Input => target.output = value,
                Some(_) if pin_index >= 0 => {
                    overrides.insert((target_id.to_string(), pin_index as usize), value);
                }
                _ => warn!(gate = %gate.id, target = %target_id, pin, "unusable input mapping"),
            }
        }
    }

    let nested = Circuit::new(gates, internal.wires.clone());
    let token = ctx.descend(&gate.id);
    let settled = engine::run(&nested, &overrides, ctx);
    ctx.ascend(token);
    let settled = settled.map_err(|err| match err {
        CircuitError::Evaluation(e) => CircuitError::Evaluation(e),
        other => EvaluationError::NestedCircuit {
            gate_id: gate.id.clone(),
            source: Box::new(other),
        }
        .into(),
    })?;

    let values: Vec<bool> = (0..definition.outputs.len())
        .map(|pin| resolve_output(gate, definition, internal, &settled.circuit, pin))
        .collect();

    let mut metadata = gate.metadata.clone();
    metadata.internal_gates = Some(
        settled
            .circuit
            .gates
            .into_iter()
            .map(|mut g| {
                g.custom_gate_definition = None;
                g
            })
            .collect(),
    );
    Ok(GateOutcome::from_values(values, metadata))
}

/// The definition's gates, carrying over the state of the previous
/// generation for every gate whose id and kind are unchanged.
fn starting_gates(gate: &Gate, internal: &InternalCircuit) -> Vec<Gate> {
    let saved: HashMap<&str, &Gate> = gate
        .metadata
        .internal_gates
        .iter()
        .flatten()
        .map(|g| (g.id.as_str(), g))
        .collect();
    internal
        .gates
        .iter()
        .map(|template| match saved.get(template.id.as_str()) {
            Some(prev) if prev.kind == template.kind => Gate {
                inputs: prev.inputs.clone(),
                output: prev.output,
                outputs: prev.outputs.clone(),
                metadata: prev.metadata.clone(),
                ..template.clone()
            },
            _ => template.clone(),
        })
        .collect()
}

/// Internal `(gate id, pin index)` pairs fed by external input `pin`.
fn input_targets<'d>(
    definition: &'d CustomGateDefinition,
    internal: &'d InternalCircuit,
    pin: usize,
) -> Vec<(&'d str, i32)> {
    let mapped: Vec<(&str, i32)> = internal
        .input_mappings
        .iter()
        .filter(|m| m.pin == pin)
        .map(|m| (m.gate_id.as_str(), m.pin_index))
        .collect();
    if !mapped.is_empty() {
        return mapped;
    }
    definition
        .inputs
        .get(pin)
        .and_then(|p| p.gate_id.as_deref())
        .map(|id| vec![(id, -1)])
        .unwrap_or_default()
}

fn resolve_output(
    gate: &Gate,
    definition: &CustomGateDefinition,
    internal: &InternalCircuit,
    settled: &Circuit,
    pin: usize,
) -> bool {
    let source = internal
        .output_mappings
        .iter()
        .find(|m| m.pin == pin)
        .map(|m| (m.gate_id.as_str(), m.pin_index))
        .or_else(|| {
            definition
                .outputs
                .get(pin)
                .and_then(|p| p.gate_id.as_deref())
                .map(|id| (id, -1))
        });
    let Some((target_id, pin_index)) = source else {
        warn!(gate = %gate.id, pin, "output pin has no mapping");
        return false;
    };
    let Some(target) = settled.gate(target_id) else {
        warn!(gate = %gate.id, target = %target_id, pin, "dangling output mapping");
        return false;
    };
    match usize::try_from(pin_index) {
        Ok(input_pin) => target
            .inputs
            .get(input_pin)
            .map(|text| parse_display_bit(text))
            .unwrap_or(false),
        Err(_) => target.value_at(pin_index),
    }
}

/// Looks up `inputs` as a `0`/`1` pattern. Missing rows and short or
/// malformed patterns read as `false`.
pub fn lookup_truth_table(
    table: &BTreeMap<String, String>,
    inputs: &[bool],
    width: usize,
) -> Vec<bool> {
    let key: String = inputs.iter().map(|&b| if b { '1' } else { '0' }).collect();
    let row = table.get(&key).map(|r| r.as_bytes());
    (0..width)
        .map(|i| row.and_then(|r| r.get(i)).is_some_and(|&c| c == b'1'))
        .collect()
}
