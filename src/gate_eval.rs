//! Per-gate evaluation.
//!
//! [`evaluate_gate`] maps `(gate, resolved inputs, context)` to the gate's
//! next outputs and metadata without touching the gate itself. Missing
//! inputs read as `false`.

use crate::custom;
use crate::engine::EvalContext;
use crate::error::CircuitError;
use crate::model::{Gate, GateKind, GateMetadata};

pub const DEFAULT_CLOCK_FREQUENCY_HZ: f64 = 1.0;

/// Next generation of one gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub output: bool,
    pub outputs: Option<Vec<bool>>,
    pub metadata: GateMetadata,
}

impl GateOutcome {
    pub fn scalar(output: bool, metadata: GateMetadata) -> Self {
        GateOutcome {
            output,
            outputs: None,
            metadata,
        }
    }

    /// Collapses single-output results to a scalar; wider results keep the
    /// vector with the first entry mirrored as the primary output.
    pub fn from_values(values: Vec<bool>, metadata: GateMetadata) -> Self {
        if values.len() == 1 {
            return GateOutcome::scalar(values[0], metadata);
        }
        GateOutcome {
            output: values.first().copied().unwrap_or(false),
            outputs: Some(values),
            metadata,
        }
    }
}

/// Stored `(Q, Q̄)` pair plus edge-detection bookkeeping of a D flip-flop or
/// SR latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipFlopState {
    pub q: bool,
    pub q_bar: bool,
    pub previous_clock: bool,
    pub first_evaluation: bool,
}

impl FlipFlopState {
    pub fn from_metadata(metadata: &GateMetadata) -> Self {
        let q = metadata.q_output.unwrap_or(false);
        FlipFlopState {
            q,
            q_bar: metadata.q_bar_output.unwrap_or(!q),
            previous_clock: metadata.previous_clock_state.unwrap_or(false),
            first_evaluation: metadata.is_first_evaluation.unwrap_or(true),
        }
    }

    pub fn is_rising_edge(&self, clk: bool) -> bool {
        !self.previous_clock && clk && !self.first_evaluation
    }

    /// D flip-flop transition: latch `d` on a rising edge, hold otherwise.
    pub fn clocked(self, d: bool, clk: bool) -> Self {
        let (q, q_bar) = if self.is_rising_edge(clk) {
            (d, !d)
        } else {
            (self.q, self.q_bar)
        };
        FlipFlopState {
            q,
            q_bar,
            previous_clock: clk,
            first_evaluation: false,
        }
    }

    /// SR latch transition. `S && R` holds the prior pair unchanged instead
    /// of driving both outputs low.
    pub fn set_reset(self, s: bool, r: bool) -> Self {
        let (q, q_bar) = match (s, r) {
            (true, false) => (true, false),
            (false, true) => (false, true),
            _ => (self.q, self.q_bar),
        };
        FlipFlopState { q, q_bar, ..self }
    }
}

pub fn evaluate_gate(
    gate: &Gate,
    inputs: &[bool],
    ctx: &mut EvalContext<'_>,
) -> Result<GateOutcome, CircuitError> {
    let input = |i: usize| inputs.get(i).copied().unwrap_or(false);
    let outcome = match gate.kind {
        GateKind::Input => GateOutcome::scalar(gate.output, gate.metadata.clone()),
        GateKind::Output => GateOutcome::scalar(input(0), gate.metadata.clone()),
        GateKind::Mux => {
            let mut metadata = gate.metadata.clone();
            metadata.selected_input = Some(usize::from(input(2)));
            GateOutcome::scalar(combinational(gate.kind, inputs).unwrap_or(false), metadata)
        }
        GateKind::And
        | GateKind::Or
        | GateKind::Not
        | GateKind::Xor
        | GateKind::Nand
        | GateKind::Nor => {
            let output = combinational(gate.kind, inputs).unwrap_or(false);
            GateOutcome::scalar(output, gate.metadata.clone())
        }
        GateKind::Clock => evaluate_clock(gate, ctx),
        GateKind::DFlipFlop => {
            let next = FlipFlopState::from_metadata(&gate.metadata).clocked(input(0), input(1));
            flip_flop_outcome(&gate.metadata, next)
        }
        GateKind::SrLatch => {
            let next = FlipFlopState::from_metadata(&gate.metadata).set_reset(input(0), input(1));
            let mut metadata = gate.metadata.clone();
            metadata.q_output = Some(next.q);
            metadata.q_bar_output = Some(next.q_bar);
            GateOutcome::from_values(vec![next.q, next.q_bar], metadata)
        }
        GateKind::Custom => custom::evaluate_custom(gate, inputs, ctx)?,
        GateKind::Unknown => GateOutcome::scalar(false, gate.metadata.clone()),
    };
    ctx.record(gate, inputs, &outcome);
    Ok(outcome)
}

/// Truth function of the stateless kinds; `None` for everything else.
pub fn combinational(kind: GateKind, inputs: &[bool]) -> Option<bool> {
    let input = |i: usize| inputs.get(i).copied().unwrap_or(false);
    let value = match kind {
        GateKind::And => !inputs.is_empty() && inputs.iter().all(|&b| b),
        GateKind::Or => inputs.iter().any(|&b| b),
        GateKind::Not => !input(0),
        GateKind::Xor => input(0) != input(1),
        GateKind::Nand => !(!inputs.is_empty() && inputs.iter().all(|&b| b)),
        GateKind::Nor => !inputs.iter().any(|&b| b),
        GateKind::Mux => {
            if input(2) {
                input(1)
            } else {
                input(0)
            }
        }
        _ => return None,
    };
    Some(value)
}

/// Writes a D flip-flop state into a copy of `metadata`.
pub fn flip_flop_outcome(metadata: &GateMetadata, next: FlipFlopState) -> GateOutcome {
    let mut metadata = metadata.clone();
    metadata.q_output = Some(next.q);
    metadata.q_bar_output = Some(next.q_bar);
    metadata.previous_clock_state = Some(next.previous_clock);
    metadata.is_first_evaluation = Some(next.first_evaluation);
    GateOutcome::from_values(vec![next.q, next.q_bar], metadata)
}

fn evaluate_clock(gate: &Gate, ctx: &EvalContext<'_>) -> GateOutcome {
    let provider = &ctx.config.time_provider;
    let mut metadata = gate.metadata.clone();
    let start = *metadata.start_time.get_or_insert_with(|| provider.now_ms());
    if metadata.is_running == Some(false) {
        return GateOutcome::scalar(gate.output, metadata);
    }
    let frequency = metadata.frequency.unwrap_or(DEFAULT_CLOCK_FREQUENCY_HZ);
    if !frequency.is_finite() || frequency <= 0.0 {
        return GateOutcome::scalar(gate.output, metadata);
    }
    // Low for the first half-period, then toggles every half-period.
    let half_period_ms = 500.0 / frequency;
    let phase = (provider.elapsed_ms(start) / half_period_ms).floor() as u64;
    GateOutcome::scalar(phase % 2 == 1, metadata)
}
