//! Seeded random circuits for fuzzing and benchmarks.
//!
//! Every logic gate draws its inputs from INPUT gates or earlier logic
//! gates, so the result is always acyclic. Each gate nobody reads from gets
//! its own OUTPUT gate.
//!
//! Gates are laid out left to right: INPUT gates in the first column, one
//! column per logic gate, then the OUTPUT gates.

use crate::model::{Circuit, Gate, GateKind, PinRef, Wire};
use rand::Rng;

const LOGIC_KINDS: [GateKind; 7] = [
    GateKind::And,
    GateKind::Or,
    GateKind::Not,
    GateKind::Xor,
    GateKind::Nand,
    GateKind::Nor,
    GateKind::Mux,
];

const GRID: f64 = 80.0;

pub fn random_circuit<R: Rng>(rng: &mut R, inputs: usize, gates: usize) -> Circuit {
    let mut circuit = Circuit::default();
    let mut read = Vec::with_capacity(inputs + gates);
    for i in 0..inputs {
        let gate = Gate::input(format!("in{i}"), rng.gen_bool(0.5));
        circuit.gates.push(gate.at(0.0, i as f64 * GRID));
        read.push(false);
    }

    for idx in 0..gates {
        let kind = LOGIC_KINDS[rng.gen_range(0..LOGIC_KINDS.len())];
        let id = format!("g{idx}");
        let available = circuit.gates.len();
        if available > 0 {
            for pin in 0..kind.input_arity() {
                let source = rng.gen_range(0..available);
                read[source] = true;
                let wire_id = format!("w{}", circuit.wires.len());
                circuit.wires.push(Wire::new(
                    wire_id,
                    PinRef::output(circuit.gates[source].id.clone(), 0),
                    PinRef::input(id.clone(), pin),
                ));
            }
        }
        circuit
            .gates
            .push(Gate::new(id, kind).at((idx + 1) as f64 * GRID, 0.0));
        read.push(false);
    }

    let sinks: Vec<String> = circuit
        .gates
        .iter()
        .zip(&read)
        .filter(|(_, was_read)| !**was_read)
        .map(|(g, _)| g.id.clone())
        .collect();
    let last_column = (gates + 1) as f64 * GRID;
    for (k, sink) in sinks.into_iter().enumerate() {
        let out = format!("out{k}");
        let wire_id = format!("w{}", circuit.wires.len());
        circuit.wires.push(Wire::new(
            wire_id,
            PinRef::output(sink, 0),
            PinRef::input(out.clone(), 0),
        ));
        let gate = Gate::new(out, GateKind::Output).at(last_column, k as f64 * GRID);
        circuit.gates.push(gate);
    }
    circuit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluationConfig;
    use crate::engine::evaluate;
    use crate::graph::DependencyGraph;
    use crate::validate::validate;
    use proptest::prelude::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn same_seed_same_circuit() {
        let a = random_circuit(&mut ChaCha20Rng::seed_from_u64(7), 4, 40);
        let b = random_circuit(&mut ChaCha20Rng::seed_from_u64(7), 4, 40);
        assert_eq!(a.hash(), b.hash());
        let c = random_circuit(&mut ChaCha20Rng::seed_from_u64(8), 4, 40);
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn generated_circuits_are_valid_and_acyclic() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        for _ in 0..20 {
            let circuit = random_circuit(&mut rng, 3, 25);
            validate(&circuit).unwrap();
            assert!(!DependencyGraph::build(&circuit).has_cycles);
            assert!(circuit.gates.iter().any(|g| g.kind == GateKind::Output));
        }
    }

    #[test]
    fn gates_get_distinct_positions() {
        let circuit = random_circuit(&mut ChaCha20Rng::seed_from_u64(3), 3, 10);
        let mut spots: Vec<(i64, i64)> = circuit
            .gates
            .iter()
            .map(|g| (g.position.x as i64, g.position.y as i64))
            .collect();
        let total = spots.len();
        spots.sort_unstable();
        spots.dedup();
        assert_eq!(spots.len(), total);
        let outputs: Vec<f64> = circuit
            .gates
            .iter()
            .filter(|g| g.kind == GateKind::Output)
            .map(|g| g.position.x)
            .collect();
        assert!(outputs.iter().all(|&x| x == 11.0 * GRID));
    }

    #[test]
    fn no_inputs_no_gates_is_empty() {
        let circuit = random_circuit(&mut ChaCha20Rng::seed_from_u64(0), 0, 0);
        assert!(circuit.gates.is_empty());
        assert!(circuit.wires.is_empty());
    }

    proptest! {
        #[test]
        fn outputs_do_not_depend_on_gate_array_order(
            seed in any::<u64>(),
            shuffle_seed in any::<u64>(),
        ) {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let circuit = random_circuit(&mut rng, 4, 30);
            let mut shuffled = circuit.clone();
            shuffled.gates.shuffle(&mut ChaCha20Rng::seed_from_u64(shuffle_seed));

            let config = EvaluationConfig::default().with_fixed_time(0.0);
            let a = evaluate(&circuit, &config).unwrap().circuit;
            let b = evaluate(&shuffled, &config).unwrap().circuit;
            for gate in &a.gates {
                prop_assert_eq!(Some(gate.output), b.gate(&gate.id).map(|g| g.output));
            }
        }
    }
}
