//! Exhaustive truth-table extraction.
//!
//! Every assignment of the circuit's INPUT gates is evaluated independently,
//! in parallel. The first INPUT gate in array order is the most significant
//! bit of the row index, which matches the key order used by truth-table
//! custom gates.

use crate::config::EvaluationConfig;
use crate::engine::evaluate;
use crate::error::{CircuitError, ValidationError};
use crate::model::{Circuit, CustomGateDefinition, GateKind, PinDefinition};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub const MAX_TRUTH_TABLE_INPUTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruthTableRow {
    pub inputs: Vec<bool>,
    pub outputs: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruthTable {
    /// INPUT gate ids, most significant first
    pub inputs: Vec<String>,
    /// OUTPUT gate ids
    pub outputs: Vec<String>,
    pub rows: Vec<TruthTableRow>,
}

pub fn extract(circuit: &Circuit, config: &EvaluationConfig) -> Result<TruthTable, CircuitError> {
    let inputs: Vec<String> = ids_of(circuit, GateKind::Input);
    let outputs: Vec<String> = ids_of(circuit, GateKind::Output);
    if inputs.len() > MAX_TRUTH_TABLE_INPUTS {
        return Err(ValidationError::TooManyTruthTableInputs {
            count: inputs.len(),
            max: MAX_TRUTH_TABLE_INPUTS,
        }
        .into());
    }

    let width = inputs.len();
    let rows = (0..1usize << width)
        .into_par_iter()
        .map(|row| {
            let bits: Vec<bool> = (0..width).map(|i| (row >> (width - 1 - i)) & 1 == 1).collect();
            let mut assigned = circuit.clone();
            for (id, &bit) in inputs.iter().zip(&bits) {
                if let Some(gate) = assigned.gate_mut(id) {
                    gate.output = bit;
                }
            }
            let settled = evaluate(&assigned, config)?.circuit;
            let values = outputs
                .iter()
                .map(|id| settled.gate(id).map(|g| g.output).unwrap_or(false))
                .collect();
            Ok(TruthTableRow {
                inputs: bits,
                outputs: values,
            })
        })
        .collect::<Result<Vec<_>, CircuitError>>()?;

    debug!(inputs = width, outputs = outputs.len(), rows = rows.len(), "truth table extracted");
    Ok(TruthTable {
        inputs,
        outputs,
        rows,
    })
}

fn ids_of(circuit: &Circuit, kind: GateKind) -> Vec<String> {
    circuit
        .gates
        .iter()
        .filter(|g| g.kind == kind)
        .map(|g| g.id.clone())
        .collect()
}

fn bit_pattern(bits: &[bool]) -> String {
    bits.iter().map(|&b| if b { '1' } else { '0' }).collect()
}

impl TruthTable {
    /// Collapses the table into a custom gate whose pins are named after the
    /// INPUT and OUTPUT gates it was extracted from.
    pub fn to_custom_definition(&self, name: &str) -> CustomGateDefinition {
        CustomGateDefinition {
            id: name.to_string(),
            name: name.to_string(),
            inputs: self.inputs.iter().map(PinDefinition::named).collect(),
            outputs: self.outputs.iter().map(PinDefinition::named).collect(),
            circuit: None,
            truth_table: Some(
                self.rows
                    .iter()
                    .map(|row| (bit_pattern(&row.inputs), bit_pattern(&row.outputs)))
                    .collect::<BTreeMap<_, _>>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gate, InternalCircuit, PinMapping, PinRef, Wire};

    fn wire(id: &str, from: &str, to: &str, pin: usize) -> Wire {
        Wire::new(id, PinRef::output(from, 0), PinRef::input(to, pin))
    }

    fn half_adder() -> Circuit {
        Circuit::new(
            vec![
                Gate::input("a", false),
                Gate::input("b", false),
                Gate::new("xor", GateKind::Xor),
                Gate::new("and", GateKind::And),
                Gate::new("sum", GateKind::Output),
                Gate::new("carry", GateKind::Output),
            ],
            vec![
                wire("w0", "a", "xor", 0),
                wire("w1", "b", "xor", 1),
                wire("w2", "a", "and", 0),
                wire("w3", "b", "and", 1),
                wire("w4", "xor", "sum", 0),
                wire("w5", "and", "carry", 0),
            ],
        )
    }

    fn config() -> EvaluationConfig {
        EvaluationConfig::default().with_fixed_time(0.0)
    }

    #[test]
    fn half_adder_table() {
        let table = extract(&half_adder(), &config()).unwrap();
        assert_eq!(table.inputs, vec!["a", "b"]);
        assert_eq!(table.outputs, vec!["sum", "carry"]);
        let rows: Vec<(Vec<bool>, Vec<bool>)> = table
            .rows
            .into_iter()
            .map(|r| (r.inputs, r.outputs))
            .collect();
        assert_eq!(
            rows,
            vec![
                (vec![false, false], vec![false, false]),
                (vec![false, true], vec![true, false]),
                (vec![true, false], vec![true, false]),
                (vec![true, true], vec![false, true]),
            ]
        );
    }

    #[test]
    fn too_many_inputs_is_a_validation_error() {
        let gates = (0..=MAX_TRUTH_TABLE_INPUTS)
            .map(|i| Gate::input(format!("i{i}"), false))
            .collect();
        let err = extract(&Circuit::new(gates, vec![]), &config()).unwrap_err();
        assert!(matches!(
            err,
            CircuitError::Validation(ValidationError::TooManyTruthTableInputs {
                count: 17,
                max: 16
            })
        ));
    }

    #[test]
    fn collapsed_gate_matches_internal_circuit_gate() {
        let circuit = half_adder();
        let table = extract(&circuit, &config()).unwrap();
        let collapsed = table.to_custom_definition("half-adder");
        assert_eq!(
            collapsed.truth_table.as_ref().and_then(|t| t.get("11")).map(String::as_str),
            Some("01")
        );

        let nested = CustomGateDefinition {
            circuit: Some(InternalCircuit {
                gates: circuit.gates.clone(),
                wires: circuit.wires.clone(),
                input_mappings: vec![PinMapping::new(0, "a", -1), PinMapping::new(1, "b", -1)],
                output_mappings: vec![
                    PinMapping::new(0, "sum", -1),
                    PinMapping::new(1, "carry", -1),
                ],
            }),
            truth_table: None,
            ..collapsed.clone()
        };

        let host = |def: CustomGateDefinition| {
            Circuit::new(
                vec![
                    Gate::input("x", false),
                    Gate::input("y", false),
                    Gate::custom("ha", def),
                    Gate::new("s", GateKind::Output),
                    Gate::new("c", GateKind::Output),
                ],
                vec![
                    wire("e0", "x", "ha", 0),
                    wire("e1", "y", "ha", 1),
                    Wire::new("e2", PinRef::output("ha", 0), PinRef::input("s", 0)),
                    Wire::new("e3", PinRef::output("ha", 1), PinRef::input("c", 0)),
                ],
            )
        };
        let via_table = extract(&host(collapsed), &config()).unwrap();
        let via_circuit = extract(&host(nested), &config()).unwrap();
        assert_eq!(via_table.rows, via_circuit.rows);
        assert_eq!(via_table.rows.len(), 4);
    }
}
