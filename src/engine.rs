//! # Orchestrator
//!
//! Sequences one evaluation: validate → build the dependency graph →
//! apply the cycle policy → evaluate gates in order (handing flip-flop
//! networks to the two-phase evaluator) → propagate outputs onto wires.
//!
//! The input circuit is never modified; the result carries a new
//! generation of gates and wires.
//!
//! ```rust
//! use logicsim::config::EvaluationConfig;
//! use logicsim::engine::evaluate;
//! use logicsim::model::{Circuit, Gate, GateKind, PinRef, Wire};
//!
//! let circuit = Circuit::new(
//!     vec![
//!         Gate::input("a", true),
//!         Gate::new("not", GateKind::Not),
//!         Gate::new("out", GateKind::Output),
//!     ],
//!     vec![
//!         Wire::new("w0", PinRef::output("a", 0), PinRef::input("not", 0)),
//!         Wire::new("w1", PinRef::output("not", 0), PinRef::input("out", 0)),
//!     ],
//! );
//! let config = EvaluationConfig::default().with_fixed_time(0.0);
//! let result = evaluate(&circuit, &config).unwrap();
//! assert_eq!(result.circuit.gate("out").map(|g| g.output), Some(false));
//! assert!(result.circuit.wire("w0").unwrap().is_active);
//! ```

use crate::config::EvaluationConfig;
use crate::error::{CircuitError, DependencyError, EvaluationError};
use crate::gate_eval::{self, GateOutcome};
use crate::graph::DependencyGraph;
use crate::model::{display_bit, Circuit, Gate, GateKind, GateMetadata, Wire};
use crate::sequential;
use crate::validate::{validate, validate_light, ValidationWarning};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationStats {
    pub total_gates: usize,
    pub evaluated_gates: usize,
    /// Measured with the configured time provider
    pub evaluation_time_ms: f64,
    pub dependency_resolution_time_ms: f64,
}

/// One gate evaluation, recorded when debugging is enabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    /// Gate id, prefixed with `outer/` for gates inside custom gates
    pub gate_id: String,
    pub kind: GateKind,
    pub depth: usize,
    pub inputs: Vec<bool>,
    pub output: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<bool>>,
    pub metadata: GateMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub circuit: Circuit,
    pub evaluation_stats: EvaluationStats,
    pub dependency_graph: DependencyGraph,
    pub warnings: Vec<ValidationWarning>,
    /// One entry per gate evaluation. Under two-phase the flip-flops come
    /// first, followed by the final settle pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_trace: Option<Vec<TraceEntry>>,
}

/// State threaded through nested evaluations of one top-level call.
pub struct EvalContext<'a> {
    pub config: &'a EvaluationConfig,
    /// Custom-gate nesting level, 0 at the top-level circuit
    pub depth: usize,
    scope: String,
    trace: Option<Vec<TraceEntry>>,
    /// Scoped id of the gate under evaluation, reported if evaluation panics
    current_gate: Option<String>,
}

impl<'a> EvalContext<'a> {
    pub fn new(config: &'a EvaluationConfig) -> Self {
        EvalContext {
            config,
            depth: 0,
            scope: String::new(),
            trace: config.enable_debug.then(Vec::new),
            current_gate: None,
        }
    }

    pub fn record(&mut self, gate: &Gate, inputs: &[bool], outcome: &GateOutcome) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceEntry {
                gate_id: format!("{}{}", self.scope, gate.id),
                kind: gate.kind,
                depth: self.depth,
                inputs: inputs.to_vec(),
                output: outcome.output,
                outputs: outcome.outputs.clone(),
                metadata: outcome.metadata.clone(),
            });
        }
    }

    pub fn into_trace(self) -> Option<Vec<TraceEntry>> {
        self.trace
    }

    /// Stops recording until [`Self::resume_trace`] hands the entries back.
    pub(crate) fn pause_trace(&mut self) -> Option<Vec<TraceEntry>> {
        self.trace.take()
    }

    pub(crate) fn resume_trace(&mut self, trace: Option<Vec<TraceEntry>>) {
        self.trace = trace;
    }

    fn enter_gate(&mut self, gate_id: &str) {
        self.current_gate = Some(format!("{}{}", self.scope, gate_id));
    }

    /// Enters the internal circuit of `gate_id`; returns the token for [`Self::ascend`].
    pub(crate) fn descend(&mut self, gate_id: &str) -> usize {
        let saved = self.scope.len();
        self.depth += 1;
        self.scope.push_str(gate_id);
        self.scope.push('/');
        saved
    }

    pub(crate) fn ascend(&mut self, saved: usize) {
        self.depth = self.depth.saturating_sub(1);
        self.scope.truncate(saved);
    }
}

/// Values forced onto `(gate id, input pin)` by a custom gate's input mappings.
pub(crate) type PinOverrides = HashMap<(String, usize), bool>;

/// Evaluates one generation of `circuit`.
///
/// Panics raised while evaluating (for example by a host-supplied time
/// provider) are converted into [`EvaluationError::Internal`].
pub fn evaluate(
    circuit: &Circuit,
    config: &EvaluationConfig,
) -> Result<EvaluationResult, CircuitError> {
    let mut ctx = EvalContext::new(config);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run(circuit, &PinOverrides::new(), &mut ctx)
    }));
    match outcome {
        Ok(result) => {
            let mut result = result?;
            result.debug_trace = ctx.into_trace();
            Ok(result)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let gate_id = ctx.current_gate.take();
            warn!(gate = ?gate_id, %message, "evaluation panicked");
            Err(EvaluationError::Internal { gate_id, message }.into())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "panic during evaluation".to_string()
}

/// Shared by the top-level call and every nested custom-gate circuit.
pub(crate) fn run(
    circuit: &Circuit,
    overrides: &PinOverrides,
    ctx: &mut EvalContext<'_>,
) -> Result<EvaluationResult, CircuitError> {
    let clock = Arc::clone(&ctx.config.time_provider);
    let started = clock.now_ms();

    let report = if ctx.config.strict_validation {
        validate(circuit)?
    } else {
        validate_light(circuit)?
    };
    for warning in &report.warnings {
        debug!(depth = ctx.depth, %warning, "validation warning");
    }

    let graph = DependencyGraph::build(circuit);
    let resolved = clock.now_ms();

    // Cycles through a flip-flop are broken by the two-phase commit; the
    // settle graph keeps only the cycles made of stateless gates.
    let two_phase = sequential::requires_two_phase(circuit, ctx.config.two_phase);
    let settle_graph = two_phase.then(|| sequential::settle_graph(circuit));
    let fatal_cycles = settle_graph.as_ref().map_or(&graph.cycles, |g| &g.cycles);
    if !fatal_cycles.is_empty() && !ctx.config.allow_circular_dependencies {
        return Err(DependencyError {
            cycles: fatal_cycles.clone(),
        }
        .into());
    }

    let index = gate_index(circuit);
    let positions = |ids: &[String]| -> Vec<usize> {
        ids.iter()
            .filter_map(|id| index.get(id.as_str()).copied())
            .collect()
    };
    let order = positions(&graph.evaluation_order);
    debug!(
        depth = ctx.depth,
        gates = circuit.gates.len(),
        wires = circuit.wires.len(),
        two_phase,
        cyclic = graph.has_cycles,
        "evaluating circuit"
    );

    let mut pass = Pass::new(circuit, &index, overrides);
    match &settle_graph {
        Some(settle) => {
            let flip_flops: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&idx| circuit.gates[idx].kind == GateKind::DFlipFlop)
                .collect();
            let settle_order = positions(&settle.evaluation_order);
            sequential::evaluate_two_phase(&mut pass, &settle_order, &flip_flops, ctx)?;
        }
        None => {
            for &idx in &order {
                pass.evaluate_at(idx, ctx)?;
            }
        }
    }

    let evaluated_gates = pass.evaluated_count();
    let gates = pass.into_gates();
    let wires = propagate_wires(&gates, &circuit.wires, &index);
    let finished = clock.now_ms();

    Ok(EvaluationResult {
        circuit: Circuit::new(gates, wires),
        evaluation_stats: EvaluationStats {
            total_gates: circuit.gates.len(),
            evaluated_gates,
            evaluation_time_ms: (finished - resolved).max(0.0),
            dependency_resolution_time_ms: (resolved - started).max(0.0),
        },
        dependency_graph: graph,
        warnings: report.warnings,
        debug_trace: None,
    })
}

fn gate_index(circuit: &Circuit) -> HashMap<&str, usize> {
    let mut index = HashMap::with_capacity(circuit.gates.len());
    for (idx, gate) in circuit.gates.iter().enumerate() {
        index.entry(gate.id.as_str()).or_insert(idx);
    }
    index
}

fn propagate_wires(gates: &[Gate], wires: &[Wire], index: &HashMap<&str, usize>) -> Vec<Wire> {
    wires
        .iter()
        .map(|wire| {
            let mut next = wire.clone();
            next.is_active = index
                .get(wire.from.gate_id.as_str())
                .map(|&src| gates[src].value_at(wire.from.pin_index))
                .unwrap_or(false);
            next
        })
        .collect()
}

/// The generation under construction. Gates start as copies of the previous
/// generation, so a gate not yet evaluated in this pass still publishes its
/// previous values.
pub(crate) struct Pass {
    gates: Vec<Gate>,
    /// `(destination gate, input pin)` → `(source gate, source pin index)`
    drivers: HashMap<(usize, usize), (usize, i32)>,
    forced: HashMap<(usize, usize), bool>,
    evaluated: Vec<bool>,
}

impl Pass {
    fn new(circuit: &Circuit, index: &HashMap<&str, usize>, overrides: &PinOverrides) -> Self {
        let mut drivers = HashMap::with_capacity(circuit.wires.len());
        for wire in &circuit.wires {
            let (Some(&from), Some(&to), Some(pin)) = (
                index.get(wire.from.gate_id.as_str()),
                index.get(wire.to.gate_id.as_str()),
                wire.to.input_pin(),
            ) else {
                continue;
            };
            drivers.entry((to, pin)).or_insert((from, wire.from.pin_index));
        }
        let forced = overrides
            .iter()
            .filter_map(|((gate_id, pin), &value)| {
                index.get(gate_id.as_str()).map(|&idx| ((idx, *pin), value))
            })
            .collect();
        Pass {
            gates: circuit.gates.clone(),
            drivers,
            forced,
            evaluated: vec![false; circuit.gates.len()],
        }
    }

    pub(crate) fn gate(&self, idx: usize) -> &Gate {
        &self.gates[idx]
    }

    pub(crate) fn resolve_inputs(&self, idx: usize) -> Vec<bool> {
        (0..self.gates[idx].input_arity())
            .map(|pin| {
                if let Some(&value) = self.forced.get(&(idx, pin)) {
                    return value;
                }
                self.drivers
                    .get(&(idx, pin))
                    .map(|&(src, src_pin)| self.gates[src].value_at(src_pin))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub(crate) fn evaluate_at(
        &mut self,
        idx: usize,
        ctx: &mut EvalContext<'_>,
    ) -> Result<(), CircuitError> {
        let inputs = self.resolve_inputs(idx);
        ctx.enter_gate(&self.gates[idx].id);
        let outcome = gate_eval::evaluate_gate(&self.gates[idx], &inputs, ctx)?;
        self.apply(idx, &inputs, outcome);
        Ok(())
    }

    pub(crate) fn apply(&mut self, idx: usize, inputs: &[bool], outcome: GateOutcome) {
        let gate = &mut self.gates[idx];
        gate.inputs = inputs.iter().map(|&b| display_bit(b)).collect();
        gate.output = outcome.output;
        gate.outputs = outcome.outputs;
        gate.metadata = outcome.metadata;
        self.evaluated[idx] = true;
    }

    fn evaluated_count(&self) -> usize {
        self.evaluated.iter().filter(|&&done| done).count()
    }

    fn into_gates(self) -> Vec<Gate> {
        self.gates
    }
}
