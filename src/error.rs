//! Error taxonomy of the evaluator.
//!
//! Every failure is one of three kinds: structural ([`ValidationError`]),
//! an unresolved feedback loop ([`DependencyError`]), or a failure while
//! evaluating a specific gate ([`EvaluationError`]). Messages are technical;
//! [`CircuitError::context`] exposes the same data as a JSON map for
//! programmatic handling.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Dependency,
    Evaluation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Dependency => "DEPENDENCY",
            ErrorKind::Evaluation => "EVALUATION",
        }
    }
}

/// Structural problems. Always fixable by editing the circuit.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("gate #{index} has an empty id")]
    EmptyGateId { index: usize },
    #[error("gate id {id:?} is longer than {max} characters")]
    GateIdTooLong { id: String, max: usize },
    #[error("gate id {id:?} contains characters outside [A-Za-z0-9_.:-]")]
    InvalidGateId { id: String },
    #[error("duplicate gate id {id:?}")]
    DuplicateGateId { id: String },
    #[error("gate {id:?} has an unrecognized type")]
    UnknownGateType { id: String },
    #[error("gate {id:?} has a non-finite position")]
    NonFinitePosition { id: String },
    #[error("custom gate {id:?} has no definition")]
    MissingCustomDefinition { id: String },
    #[error("custom gate {id:?} has an invalid definition: {reason}")]
    InvalidCustomDefinition { id: String, reason: String },
    #[error("clock {id:?} frequency must be finite and positive")]
    InvalidClockFrequency { id: String },
    #[error("wire #{index} has an empty id")]
    EmptyWireId { index: usize },
    #[error("duplicate wire id {id:?}")]
    DuplicateWireId { id: String },
    #[error("wire {wire_id:?} references missing gate {gate_id:?}")]
    DanglingWire { wire_id: String, gate_id: String },
    #[error("wire {wire_id:?} targets pin {pin} of gate {gate_id:?}, which has {arity} input pins")]
    PinOutOfRange {
        wire_id: String,
        gate_id: String,
        pin: i32,
        arity: usize,
    },
    #[error("wire {wire_id:?} reads slot {slot} of gate {gate_id:?}, which has {arity} outputs")]
    SourcePinOutOfRange {
        wire_id: String,
        gate_id: String,
        slot: usize,
        arity: usize,
    },
    #[error("wire {wire_id:?} drives pin {pin} of gate {gate_id:?}, driven by {existing:?}")]
    PinAlreadyDriven {
        wire_id: String,
        gate_id: String,
        pin: usize,
        existing: String,
    },
    #[error("circuit has {count} gates, limit is {max}")]
    TooManyGates { count: usize, max: usize },
    #[error("circuit has {count} wires, limit is {max}")]
    TooManyWires { count: usize, max: usize },
    #[error("circuit has {count} INPUT gates, truth tables support at most {max}")]
    TooManyTruthTableInputs { count: usize, max: usize },
}

/// A feedback loop that is neither two-phase eligible nor explicitly allowed.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("unresolved dependency cycle among gates: {}", format_cycles(.cycles))]
pub struct DependencyError {
    pub cycles: Vec<Vec<String>>,
}

impl DependencyError {
    /// Every gate id taking part in at least one cycle, in first-seen order.
    pub fn members(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for id in self.cycles.iter().flatten() {
            if !out.contains(&id.as_str()) {
                out.push(id);
            }
        }
        out
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|c| c.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure while evaluating one gate.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum EvaluationError {
    #[error("custom gate {gate_id:?} exceeds the maximum nesting depth of {max_depth}")]
    RecursionLimit { gate_id: String, max_depth: usize },
    #[error("custom gate {gate_id:?} has neither an internal circuit nor a truth table")]
    MissingDefinition { gate_id: String },
    #[error("internal circuit of custom gate {gate_id:?} failed: {source}")]
    NestedCircuit {
        gate_id: String,
        source: Box<CircuitError>,
    },
    #[error("evaluation aborted: {message}")]
    Internal {
        gate_id: Option<String>,
        message: String,
    },
}

impl EvaluationError {
    pub fn gate_id(&self) -> Option<&str> {
        match self {
            EvaluationError::RecursionLimit { gate_id, .. }
            | EvaluationError::MissingDefinition { gate_id }
            | EvaluationError::NestedCircuit { gate_id, .. } => Some(gate_id),
            EvaluationError::Internal { gate_id, .. } => gate_id.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
pub enum CircuitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl CircuitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CircuitError::Validation(_) => ErrorKind::Validation,
            CircuitError::Dependency(_) => ErrorKind::Dependency,
            CircuitError::Evaluation(_) => ErrorKind::Evaluation,
        }
    }

    /// Structured fields of the error, e.g. `{"code": "dangling_wire", "wire_id": ..}`.
    pub fn context(&self) -> Map<String, Value> {
        let value = match self {
            CircuitError::Validation(e) => serde_json::to_value(e),
            CircuitError::Dependency(e) => serde_json::to_value(e),
            CircuitError::Evaluation(e) => serde_json::to_value(e),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            context: self.context(),
        }
    }
}

/// Serializable failure shape handed to hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Map<String, Value>,
}
