//! # logicsim
//!
//! **Deterministic digital-logic evaluation**
//!
//! Takes one generation of a circuit (gates, wires, per-gate state) and
//! returns the next: every gate evaluated in dependency order, outputs
//! propagated onto wires, sequential state carried forward in metadata.
//! The caller drives time by calling [`evaluate`] once per tick.
//!
//! ## Quick Start
//!
//! ```rust
//! use logicsim::{evaluate, Circuit, EvaluationConfig, Gate, GateKind, PinRef, Wire};
//!
//! let circuit = Circuit::new(
//!     vec![
//!         Gate::input("a", true),
//!         Gate::input("b", true),
//!         Gate::new("and", GateKind::And),
//!         Gate::new("led", GateKind::Output),
//!     ],
//!     vec![
//!         Wire::new("w0", PinRef::output("a", 0), PinRef::input("and", 0)),
//!         Wire::new("w1", PinRef::output("b", 0), PinRef::input("and", 1)),
//!         Wire::new("w2", PinRef::output("and", 0), PinRef::input("led", 0)),
//!     ],
//! );
//!
//! let config = EvaluationConfig::default().with_fixed_time(0.0);
//! let result = evaluate(&circuit, &config).unwrap();
//! assert!(result.circuit.gate("led").unwrap().output);
//! println!("generation identity: blake3:{}", result.circuit.hash());
//! ```
//!
//! ## Key Concepts
//!
//! - **Gate**: stateless logic, CLOCK, D flip-flop, SR latch or a custom gate
//! - **Wire**: signed pin references, `>= 0` input pins and `-k` output slots
//! - **Two-phase commit**: coupled flip-flops latch from a common snapshot
//! - **Custom gate**: a nested circuit or a truth table behind declared pins

pub mod config;
pub mod custom;
pub mod engine;
pub mod error;
pub mod gate_eval;
pub mod generate;
pub mod graph;
pub mod model;
pub mod sequential;
pub mod truth_table;
pub mod validate;

pub use config::{EvaluationConfig, FixedTime, SystemClock, TimeProvider, TwoPhasePolicy};
pub use engine::{evaluate, EvaluationResult, EvaluationStats, TraceEntry};
pub use error::{
    CircuitError, DependencyError, ErrorKind, ErrorReport, EvaluationError, ValidationError,
};
pub use graph::DependencyGraph;
pub use model::{Circuit, CircuitHash, CustomGateDefinition, Gate, GateKind, PinRef, Wire};
pub use truth_table::TruthTable;
pub use validate::{ValidationReport, ValidationWarning};
