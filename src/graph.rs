//! Gate dependency graph and evaluation order.
//!
//! One node per gate, one edge per wire (source gate → destination gate).
//! The order is a depth-first post-order: before a gate is placed, every
//! gate feeding one of its inputs is placed. Roots are visited in gate array
//! order and predecessors in wire array order, so permuting the gate list may
//! permute the order of independent gates.
//!
//! Cycle detection knows nothing about gate kinds; whether a cycle is fatal
//! is decided by the orchestrator.

use crate::model::Circuit;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub wire_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    pub evaluation_order: Vec<String>,
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub has_cycles: bool,
    /// Members of each detected cycle, starting at the re-entered gate
    pub cycles: Vec<Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Wires whose endpoints do not resolve are left out of the graph.
    pub fn build(circuit: &Circuit) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(circuit.gates.len());
        for (idx, gate) in circuit.gates.iter().enumerate() {
            index.entry(gate.id.as_str()).or_insert(idx);
        }

        let mut nodes: BTreeMap<String, GraphNode> = circuit
            .gates
            .iter()
            .map(|g| (g.id.clone(), GraphNode::default()))
            .collect();
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); circuit.gates.len()];
        let mut edges = Vec::with_capacity(circuit.wires.len());

        for wire in &circuit.wires {
            let (Some(&from), Some(&to)) = (
                index.get(wire.from.gate_id.as_str()),
                index.get(wire.to.gate_id.as_str()),
            ) else {
                continue;
            };
            preds[to].push(from);
            edges.push(GraphEdge {
                from: wire.from.gate_id.clone(),
                to: wire.to.gate_id.clone(),
                wire_id: wire.id.clone(),
            });
            if let Some(node) = nodes.get_mut(&wire.to.gate_id) {
                push_unique(&mut node.dependencies, &wire.from.gate_id);
            }
            if let Some(node) = nodes.get_mut(&wire.from.gate_id) {
                push_unique(&mut node.dependents, &wire.to.gate_id);
            }
        }

        let (order, cycles) = depth_first_order(&preds);
        let evaluation_order: Vec<String> = order
            .iter()
            .map(|&i| circuit.gates[i].id.clone())
            .collect();
        let cycles: Vec<Vec<String>> = cycles
            .into_iter()
            .map(|c| c.into_iter().map(|i| circuit.gates[i].id.clone()).collect())
            .collect();

        debug!(
            gates = circuit.gates.len(),
            edges = edges.len(),
            cycles = cycles.len(),
            "dependency graph built"
        );

        DependencyGraph {
            evaluation_order,
            nodes,
            edges,
            has_cycles: !cycles.is_empty(),
            cycles,
        }
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}

/// Iterative post-order DFS over predecessor lists. Returns the order and
/// the cycles found, each as the stack slice from the re-entered node.
fn depth_first_order(preds: &[Vec<usize>]) -> (Vec<usize>, Vec<Vec<usize>>) {
    let n = preds.len();
    let mut state = vec![Visit::Unvisited; n];
    let mut order = Vec::with_capacity(n);
    let mut cycles: Vec<Vec<usize>> = Vec::new();
    let mut seen_cycles: HashSet<Vec<usize>> = HashSet::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if state[root] != Visit::Unvisited {
            continue;
        }
        state[root] = Visit::InProgress;
        stack.push((root, 0));
        while let Some(top) = stack.len().checked_sub(1) {
            let (node, cursor) = stack[top];
            if cursor < preds[node].len() {
                stack[top].1 += 1;
                let pred = preds[node][cursor];
                match state[pred] {
                    Visit::Unvisited => {
                        state[pred] = Visit::InProgress;
                        stack.push((pred, 0));
                    }
                    Visit::InProgress => {
                        if let Some(pos) = stack.iter().position(|&(n, _)| n == pred) {
                            let members: Vec<usize> =
                                stack[pos..].iter().map(|&(n, _)| n).collect();
                            let mut key = members.clone();
                            key.sort_unstable();
                            if seen_cycles.insert(key) {
                                cycles.push(members);
                            }
                        }
                    }
                    Visit::Done => {}
                }
            } else {
                state[node] = Visit::Done;
                order.push(node);
                stack.pop();
            }
        }
    }
    (order, cycles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gate, GateKind, PinRef, Wire};

    fn wire(id: &str, from: &str, to: &str, pin: usize) -> Wire {
        Wire::new(id, PinRef::output(from, 0), PinRef::input(to, pin))
    }

    #[test]
    fn producers_precede_consumers() {
        // Consumer listed first: order must still place inputs before it.
        let c = Circuit::new(
            vec![
                Gate::new("out", GateKind::Output),
                Gate::new("and", GateKind::And),
                Gate::input("a", true),
                Gate::input("b", true),
            ],
            vec![
                wire("w0", "and", "out", 0),
                wire("w1", "a", "and", 0),
                wire("w2", "b", "and", 1),
            ],
        );
        let g = DependencyGraph::build(&c);
        assert_eq!(g.evaluation_order, vec!["a", "b", "and", "out"]);
        assert!(!g.has_cycles);
        assert_eq!(g.nodes["and"].dependencies, vec!["a", "b"]);
        assert_eq!(g.nodes["and"].dependents, vec!["out"]);
        assert_eq!(g.edges.len(), 3);
    }

    #[test]
    fn independent_gates_follow_array_order() {
        let gates = vec![Gate::input("x", false), Gate::input("y", false)];
        let g = DependencyGraph::build(&Circuit::new(gates.clone(), vec![]));
        assert_eq!(g.evaluation_order, vec!["x", "y"]);
        let reversed: Vec<Gate> = gates.into_iter().rev().collect();
        let g = DependencyGraph::build(&Circuit::new(reversed, vec![]));
        assert_eq!(g.evaluation_order, vec!["y", "x"]);
    }

    #[test]
    fn mutual_loop_is_reported_once_with_both_members() {
        let c = Circuit::new(
            vec![Gate::new("p", GateKind::Nor), Gate::new("q", GateKind::Nor)],
            vec![wire("w0", "p", "q", 0), wire("w1", "q", "p", 0)],
        );
        let g = DependencyGraph::build(&c);
        assert!(g.has_cycles);
        assert_eq!(g.cycles.len(), 1);
        let members = &g.cycles[0];
        assert!(members.iter().any(|m| m == "p") && members.iter().any(|m| m == "q"));
        assert_eq!(g.evaluation_order.len(), 2);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let c = Circuit::new(
            vec![Gate::new("n", GateKind::Not)],
            vec![wire("w0", "n", "n", 0)],
        );
        let g = DependencyGraph::build(&c);
        assert_eq!(g.cycles, vec![vec!["n".to_string()]]);
    }

    #[test]
    fn dangling_wires_are_ignored() {
        let c = Circuit::new(
            vec![Gate::new("n", GateKind::Not)],
            vec![wire("w0", "ghost", "n", 0)],
        );
        let g = DependencyGraph::build(&c);
        assert!(g.edges.is_empty());
        assert_eq!(g.evaluation_order, vec!["n"]);
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let n = 5_000;
        let mut gates = vec![Gate::input("g0", true)];
        let mut wires = Vec::new();
        for i in 1..n {
            gates.push(Gate::new(format!("g{i}"), GateKind::Not));
            wires.push(wire(&format!("w{i}"), &format!("g{}", i - 1), &format!("g{i}"), 0));
        }
        gates.reverse();
        let g = DependencyGraph::build(&Circuit::new(gates, wires));
        assert_eq!(g.evaluation_order.first().map(String::as_str), Some("g0"));
        assert_eq!(g.evaluation_order.last().map(String::as_str), Some("g4999"));
    }
}
