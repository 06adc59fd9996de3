//! Two-phase evaluation of coupled D flip-flops.
//!
//! Flip-flops wired into each other (shift registers, rings, LFSRs) have no
//! valid topological order. They are evaluated with snapshot/commit:
//!
//! 1. settle every other gate with the flip-flops still publishing their
//!    pre-tick `Q`;
//! 2. snapshot: compute every flip-flop's next state from those values;
//! 3. commit: write all snapshots at once;
//! 4. settle the other gates again against the committed state.
//!
//! No flip-flop can observe another flip-flop's new value within a tick.
//!
//! The settle passes follow the order of [`settle_graph`], the graph with
//! the flip-flops removed. Any cycle left in it runs through stateless gates
//! only and is not broken by the commit.

use crate::config::TwoPhasePolicy;
use crate::engine::{EvalContext, Pass};
use crate::error::CircuitError;
use crate::gate_eval::{flip_flop_outcome, FlipFlopState};
use crate::graph::DependencyGraph;
use crate::model::{Circuit, Gate, GateKind};
use std::collections::HashSet;
use tracing::debug;

/// Whether `circuit` must be evaluated with snapshot/commit under `policy`.
pub fn requires_two_phase(circuit: &Circuit, policy: TwoPhasePolicy) -> bool {
    let flip_flops: HashSet<&str> = circuit
        .gates
        .iter()
        .filter(|g| g.kind == GateKind::DFlipFlop)
        .map(|g| g.id.as_str())
        .collect();
    match policy {
        TwoPhasePolicy::Disabled => false,
        TwoPhasePolicy::AnyFlipFlop => !flip_flops.is_empty(),
        TwoPhasePolicy::DirectCoupling => {
            flip_flops.len() >= 2
                && circuit.wires.iter().any(|w| {
                    w.from.gate_id != w.to.gate_id
                        && flip_flops.contains(w.from.gate_id.as_str())
                        && flip_flops.contains(w.to.gate_id.as_str())
                })
        }
    }
}

/// Dependency graph of every gate except the D flip-flops. Wires touching a
/// flip-flop dangle and are left out.
pub(crate) fn settle_graph(circuit: &Circuit) -> DependencyGraph {
    let gates: Vec<Gate> = circuit
        .gates
        .iter()
        .filter(|g| g.kind != GateKind::DFlipFlop)
        .cloned()
        .collect();
    DependencyGraph::build(&Circuit::new(gates, circuit.wires.clone()))
}

struct Snapshot {
    index: usize,
    inputs: Vec<bool>,
    next: FlipFlopState,
}

/// `settle` orders the non-flip-flop gates, `flip_flops` lists the D
/// flip-flops. Only the final settle pass is recorded in the debug trace.
pub(crate) fn evaluate_two_phase(
    pass: &mut Pass,
    settle: &[usize],
    flip_flops: &[usize],
    ctx: &mut EvalContext<'_>,
) -> Result<(), CircuitError> {
    let trace = ctx.pause_trace();
    for &idx in settle {
        pass.evaluate_at(idx, ctx)?;
    }
    ctx.resume_trace(trace);

    let snapshots: Vec<Snapshot> = flip_flops
        .iter()
        .map(|&idx| {
            let inputs = pass.resolve_inputs(idx);
            let d = inputs.first().copied().unwrap_or(false);
            let clk = inputs.get(1).copied().unwrap_or(false);
            let next = FlipFlopState::from_metadata(&pass.gate(idx).metadata).clocked(d, clk);
            Snapshot { index: idx, inputs, next }
        })
        .collect();

    debug!(
        flip_flops = snapshots.len(),
        latched = snapshots
            .iter()
            .filter(|s| s.next.q != FlipFlopState::from_metadata(&pass.gate(s.index).metadata).q)
            .count(),
        "two-phase commit"
    );

    for snapshot in snapshots {
        let outcome = flip_flop_outcome(&pass.gate(snapshot.index).metadata, snapshot.next);
        ctx.record(pass.gate(snapshot.index), &snapshot.inputs, &outcome);
        pass.apply(snapshot.index, &snapshot.inputs, outcome);
    }

    for &idx in settle {
        pass.evaluate_at(idx, ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluationConfig;
    use crate::engine::evaluate;
    use crate::error::ErrorKind;
    use crate::model::{Gate, PinRef, Wire};

    fn wire(id: &str, from: &str, to: &str, pin: usize) -> Wire {
        Wire::new(id, PinRef::output(from, 0), PinRef::input(to, pin))
    }

    /// Two clocked flip-flops, `Q1 → D2` directly, `D1 = Q2 XOR 1`.
    fn johnson_counter() -> Circuit {
        Circuit::new(
            vec![
                Gate::input("clk", false),
                Gate::input("one", true),
                Gate::new("ff1", GateKind::DFlipFlop),
                Gate::new("ff2", GateKind::DFlipFlop),
                Gate::new("fb", GateKind::Xor),
                Gate::new("q1", GateKind::Output),
                Gate::new("q2", GateKind::Output),
            ],
            vec![
                wire("w0", "clk", "ff1", 1),
                wire("w1", "clk", "ff2", 1),
                wire("w2", "ff1", "ff2", 0),
                wire("w3", "ff2", "fb", 0),
                wire("w4", "one", "fb", 1),
                wire("w5", "fb", "ff1", 0),
                wire("w6", "ff1", "q1", 0),
                wire("w7", "ff2", "q2", 0),
            ],
        )
    }

    fn set_clock(circuit: &mut Circuit, value: bool) {
        if let Some(clk) = circuit.gate_mut("clk") {
            clk.output = value;
        }
    }

    fn q_pair(circuit: &Circuit) -> (bool, bool) {
        (
            circuit.gate("q1").map(|g| g.output).unwrap_or_default(),
            circuit.gate("q2").map(|g| g.output).unwrap_or_default(),
        )
    }

    #[test]
    fn detection_heuristics() {
        let c = johnson_counter();
        assert!(requires_two_phase(&c, TwoPhasePolicy::DirectCoupling));
        assert!(requires_two_phase(&c, TwoPhasePolicy::AnyFlipFlop));
        assert!(!requires_two_phase(&c, TwoPhasePolicy::Disabled));

        let mut separated = c.clone();
        separated.wires.retain(|w| w.id != "w2");
        assert!(!requires_two_phase(&separated, TwoPhasePolicy::DirectCoupling));
        assert!(requires_two_phase(&separated, TwoPhasePolicy::AnyFlipFlop));
    }

    #[test]
    fn coupled_flip_flops_follow_hand_computed_sequence() {
        let config = EvaluationConfig::default().with_fixed_time(0.0);
        let mut circuit = evaluate(&johnson_counter(), &config).unwrap().circuit;
        assert!(
            evaluate(&johnson_counter(), &config)
                .unwrap()
                .dependency_graph
                .has_cycles
        );
        let expected = [
            (true, false),
            (true, true),
            (false, true),
            (false, false),
            (true, false),
            (true, true),
        ];
        for (tick, want) in expected.into_iter().enumerate() {
            set_clock(&mut circuit, true);
            circuit = evaluate(&circuit, &config).unwrap().circuit;
            assert_eq!(q_pair(&circuit), want, "after rising edge {}", tick + 1);
            set_clock(&mut circuit, false);
            circuit = evaluate(&circuit, &config).unwrap().circuit;
            assert_eq!(q_pair(&circuit), want, "falling edge {} must hold", tick + 1);
        }
    }

    #[test]
    fn shift_register_moves_one_stage_per_edge() {
        let circuit = Circuit::new(
            vec![
                Gate::input("clk", false),
                Gate::input("data", true),
                Gate::new("s0", GateKind::DFlipFlop),
                Gate::new("s1", GateKind::DFlipFlop),
                Gate::new("s2", GateKind::DFlipFlop),
            ],
            vec![
                wire("c0", "clk", "s0", 1),
                wire("c1", "clk", "s1", 1),
                wire("c2", "clk", "s2", 1),
                wire("d0", "data", "s0", 0),
                wire("d1", "s0", "s1", 0),
                wire("d2", "s1", "s2", 0),
            ],
        );
        let config = EvaluationConfig::default().with_fixed_time(0.0);
        let mut c = evaluate(&circuit, &config).unwrap().circuit;
        let stages = |c: &Circuit| {
            ["s0", "s1", "s2"].map(|id| c.gate(id).map(|g| g.output).unwrap_or_default())
        };
        let expected = [[true, false, false], [true, true, false], [true, true, true]];
        for want in expected {
            set_clock(&mut c, true);
            c = evaluate(&c, &config).unwrap().circuit;
            assert_eq!(stages(&c), want);
            set_clock(&mut c, false);
            c = evaluate(&c, &config).unwrap().circuit;
        }
    }

    #[test]
    fn ring_through_combinational_gate_needs_policy() {
        // ff1 -> NOT -> ff2 -> NOT -> ff1: no wire runs directly between the flip-flops.
        let circuit = Circuit::new(
            vec![
                Gate::input("clk", false),
                Gate::new("ff1", GateKind::DFlipFlop),
                Gate::new("inv", GateKind::Not),
                Gate::new("ff2", GateKind::DFlipFlop),
                Gate::new("inv2", GateKind::Not),
            ],
            vec![
                wire("c1", "clk", "ff1", 1),
                wire("c2", "clk", "ff2", 1),
                wire("w0", "ff1", "inv", 0),
                wire("w1", "inv", "ff2", 0),
                wire("w2", "ff2", "inv2", 0),
                wire("w3", "inv2", "ff1", 0),
            ],
        );
        let strict = EvaluationConfig::default().with_fixed_time(0.0);
        let err = evaluate(&circuit, &strict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);

        let config = strict.with_two_phase(TwoPhasePolicy::AnyFlipFlop);
        let mut c = evaluate(&circuit, &config).unwrap().circuit;
        let pair = |c: &Circuit| {
            (
                c.gate("ff1").map(|g| g.output).unwrap_or_default(),
                c.gate("ff2").map(|g| g.output).unwrap_or_default(),
            )
        };
        // D1 = !Q2, D2 = !Q1 sampled from pre-tick state: (0,0) -> (1,1) -> (0,0).
        for want in [(true, true), (false, false), (true, true)] {
            set_clock(&mut c, true);
            c = evaluate(&c, &config).unwrap().circuit;
            assert_eq!(pair(&c), want);
            set_clock(&mut c, false);
            c = evaluate(&c, &config).unwrap().circuit;
        }
    }

    /// Shift register `s0 -> s1` on a shared clock.
    fn shift_pair() -> (Vec<Gate>, Vec<Wire>) {
        (
            vec![
                Gate::input("clk", false),
                Gate::input("data", true),
                Gate::new("s0", GateKind::DFlipFlop),
                Gate::new("s1", GateKind::DFlipFlop),
            ],
            vec![
                wire("c0", "clk", "s0", 1),
                wire("c1", "clk", "s1", 1),
                wire("d0", "data", "s0", 0),
                wire("d1", "s0", "s1", 0),
            ],
        )
    }

    #[test]
    fn stateless_loop_beside_flip_flops_is_still_rejected() {
        let (mut gates, mut wires) = shift_pair();
        gates.push(Gate::new("p", GateKind::Not));
        gates.push(Gate::new("q", GateKind::Not));
        wires.push(wire("l0", "p", "q", 0));
        wires.push(wire("l1", "q", "p", 0));
        let circuit = Circuit::new(gates, wires);
        assert!(requires_two_phase(&circuit, TwoPhasePolicy::DirectCoupling));

        let config = EvaluationConfig::default().with_fixed_time(0.0);
        let err = evaluate(&circuit, &config).unwrap_err();
        let crate::error::CircuitError::Dependency(dep) = err else {
            panic!("expected dependency error, got {err:?}");
        };
        let mut members = dep.members();
        members.sort_unstable();
        assert_eq!(members, vec!["p", "q"]);

        let allowed = config.with_circular_dependencies(true);
        assert!(evaluate(&circuit, &allowed).is_ok());
    }

    #[test]
    fn loop_through_a_flip_flop_is_accepted() {
        let (mut gates, mut wires) = shift_pair();
        gates.push(Gate::new("inv", GateKind::Not));
        wires.retain(|w| w.id != "d0");
        wires.push(wire("f0", "s1", "inv", 0));
        wires.push(wire("f1", "inv", "s0", 0));
        let result = evaluate(
            &Circuit::new(gates, wires),
            &EvaluationConfig::default().with_fixed_time(0.0),
        )
        .unwrap();
        assert!(result.dependency_graph.has_cycles);
    }

    #[test]
    fn settle_order_ignores_paths_through_flip_flops() {
        // `a = Q1 XOR t`, `b = NOT a`, `D1 = b`. Listed first, `a` would be
        // ordered after `b` in the full graph because of the loop via ff1.
        let circuit = Circuit::new(
            vec![
                Gate::new("a", GateKind::Xor),
                Gate::new("b", GateKind::Not),
                Gate::new("ff1", GateKind::DFlipFlop),
                Gate::new("ff2", GateKind::DFlipFlop),
                Gate::input("clk", false),
                Gate::input("t", false),
            ],
            vec![
                wire("w0", "ff1", "a", 0),
                wire("w1", "t", "a", 1),
                wire("w2", "a", "b", 0),
                wire("w3", "b", "ff1", 0),
                wire("w4", "clk", "ff1", 1),
                wire("w5", "ff1", "ff2", 0),
                wire("w6", "clk", "ff2", 1),
            ],
        );
        let config = EvaluationConfig::default().with_fixed_time(0.0);
        let mut c = evaluate(&circuit, &config).unwrap().circuit;
        c.gate_mut("t").unwrap().output = true;
        set_clock(&mut c, true);
        c = evaluate(&c, &config).unwrap().circuit;
        // a = 0 XOR 1 = 1, so D1 = b = 0 and the edge latches 0.
        assert!(!c.gate("ff1").unwrap().output);
        assert!(c.gate("a").unwrap().output);
        assert!(!c.gate("b").unwrap().output);
    }

    #[test]
    fn trace_records_each_gate_once_per_tick() {
        let config = EvaluationConfig::default()
            .with_fixed_time(0.0)
            .with_debug(true);
        let result = evaluate(&johnson_counter(), &config).unwrap();
        let trace = result.debug_trace.unwrap();
        let mut ids: Vec<&str> = trace.iter().map(|t| t.gate_id.as_str()).collect();
        assert!(trace[..2].iter().all(|t| t.kind == GateKind::DFlipFlop));
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), trace.len());
        assert_eq!(trace.len(), result.circuit.gates.len());
    }

    #[test]
    fn disabled_policy_rejects_flip_flop_ring() {
        let config = EvaluationConfig::default()
            .with_fixed_time(0.0)
            .with_two_phase(TwoPhasePolicy::Disabled);
        let err = evaluate(&johnson_counter(), &config).unwrap_err();
        let crate::error::CircuitError::Dependency(dep) = err else {
            panic!("expected dependency error");
        };
        let members = dep.members();
        for id in ["ff1", "ff2", "fb"] {
            assert!(members.contains(&id), "{id} missing from {members:?}");
        }
    }
}
