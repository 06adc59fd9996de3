//! # Circuit model
//!
//! Value shapes shared by every stage of the evaluator: [`Gate`], [`Wire`],
//! [`Circuit`] and the custom-gate definition types. They serialize to the
//! camelCase JSON produced by the canvas and the custom-gate authoring tools.
//!
//! Pin indices are signed: `>= 0` addresses an input pin, `-1` the first
//! output, `-2` the second, and so on.
//!
//! ```rust
//! use logicsim::model::{Circuit, Gate, GateKind, PinRef, Wire};
//!
//! let circuit = Circuit::new(
//!     vec![Gate::input("a", true), Gate::new("out", GateKind::Output)],
//!     vec![Wire::new("w0", PinRef::output("a", 0), PinRef::input("out", 0))],
//! );
//! assert_eq!(circuit.gate("a").map(|g| g.output), Some(true));
//! assert_eq!(circuit.hash(), circuit.clone().hash());
//! ```

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hex-encoded BLAKE3 digest of a circuit's canonical JSON bytes.
pub type CircuitHash = String;

/// One generation of a circuit: gates plus the wires between their pins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    #[serde(default)]
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub wires: Vec<Wire>,
}

impl Circuit {
    pub fn new(gates: Vec<Gate>, wires: Vec<Wire>) -> Self {
        Circuit { gates, wires }
    }

    pub fn gate(&self, id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.id == id)
    }

    pub fn gate_mut(&mut self, id: &str) -> Option<&mut Gate> {
        self.gates.iter_mut().find(|g| g.id == id)
    }

    pub fn wire(&self, id: &str) -> Option<&Wire> {
        self.wires.iter().find(|w| w.id == id)
    }

    /// Identity of this generation. Two circuits with the same gates, wires,
    /// outputs and metadata hash identically.
    pub fn hash(&self) -> CircuitHash {
        let canon = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Hasher::new();
        hasher.update(&canon);
        hex::encode(hasher.finalize().as_bytes())
    }
}

/// Closed set of gate kinds.
///
/// Unrecognized type tags deserialize to [`GateKind::Unknown`] so that the
/// validator can reject them by gate id instead of failing the whole parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GateKind {
    Input,
    Output,
    And,
    Or,
    Not,
    Xor,
    Nand,
    Nor,
    /// Two data inputs and a select line: `(I0, I1, SEL)`
    Mux,
    Clock,
    /// D-type flip-flop with inputs `(D, CLK)` and outputs `(Q, Q̄)`
    DFlipFlop,
    /// Set/reset latch with inputs `(S, R)` and outputs `(Q, Q̄)`
    SrLatch,
    Custom,
    Unknown,
}

impl GateKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "INPUT" => GateKind::Input,
            "OUTPUT" => GateKind::Output,
            "AND" => GateKind::And,
            "OR" => GateKind::Or,
            "NOT" => GateKind::Not,
            "XOR" => GateKind::Xor,
            "NAND" => GateKind::Nand,
            "NOR" => GateKind::Nor,
            "MUX" => GateKind::Mux,
            "CLOCK" => GateKind::Clock,
            "D_FLIPFLOP" | "D-FF" | "D_FF" => GateKind::DFlipFlop,
            "SR_LATCH" | "SR-LATCH" => GateKind::SrLatch,
            "CUSTOM" => GateKind::Custom,
            _ => GateKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::Input => "INPUT",
            GateKind::Output => "OUTPUT",
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Not => "NOT",
            GateKind::Xor => "XOR",
            GateKind::Nand => "NAND",
            GateKind::Nor => "NOR",
            GateKind::Mux => "MUX",
            GateKind::Clock => "CLOCK",
            GateKind::DFlipFlop => "D_FLIPFLOP",
            GateKind::SrLatch => "SR_LATCH",
            GateKind::Custom => "CUSTOM",
            GateKind::Unknown => "UNKNOWN",
        }
    }

    /// Static input pin count. Custom gates take theirs from the definition.
    pub fn input_arity(&self) -> usize {
        match self {
            GateKind::Input | GateKind::Clock | GateKind::Custom | GateKind::Unknown => 0,
            GateKind::Output | GateKind::Not => 1,
            GateKind::And
            | GateKind::Or
            | GateKind::Xor
            | GateKind::Nand
            | GateKind::Nor
            | GateKind::DFlipFlop
            | GateKind::SrLatch => 2,
            GateKind::Mux => 3,
        }
    }

    /// Static output pin count. Custom gates take theirs from the definition.
    pub fn output_arity(&self) -> usize {
        match self {
            GateKind::DFlipFlop | GateKind::SrLatch => 2,
            GateKind::Custom | GateKind::Unknown => 0,
            _ => 1,
        }
    }
}

impl From<String> for GateKind {
    fn from(tag: String) -> Self {
        GateKind::from_tag(&tag)
    }
}

impl From<GateKind> for String {
    fn from(kind: GateKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas position. Opaque to evaluation; only checked for finiteness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A gate and everything the evaluator carries forward between generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gate {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: GateKind,
    #[serde(default)]
    pub position: Position,
    /// Display strings of the input values sampled by the last evaluation
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Primary output (for INPUT gates: the externally toggled flag)
    #[serde(default)]
    pub output: bool,
    /// All outputs, for kinds with more than one output pin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "GateMetadata::is_empty")]
    pub metadata: GateMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_gate_definition: Option<CustomGateDefinition>,
}

impl Gate {
    pub fn new(id: impl Into<String>, kind: GateKind) -> Self {
        Gate {
            id: id.into(),
            kind,
            position: Position::default(),
            inputs: Vec::new(),
            output: false,
            outputs: None,
            metadata: GateMetadata::default(),
            custom_gate_definition: None,
        }
    }

    /// An INPUT gate publishing `value`.
    pub fn input(id: impl Into<String>, value: bool) -> Self {
        let mut gate = Gate::new(id, GateKind::Input);
        gate.output = value;
        gate
    }

    pub fn custom(id: impl Into<String>, definition: CustomGateDefinition) -> Self {
        let mut gate = Gate::new(id, GateKind::Custom);
        gate.custom_gate_definition = Some(definition);
        gate
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn with_metadata(mut self, metadata: GateMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn input_arity(&self) -> usize {
        match (&self.kind, &self.custom_gate_definition) {
            (GateKind::Custom, Some(def)) => def.inputs.len(),
            (kind, _) => kind.input_arity(),
        }
    }

    pub fn output_arity(&self) -> usize {
        match (&self.kind, &self.custom_gate_definition) {
            (GateKind::Custom, Some(def)) => def.outputs.len(),
            (kind, _) => kind.output_arity(),
        }
    }

    /// Value currently published on output slot `slot` (0-based).
    pub fn output_at(&self, slot: usize) -> bool {
        match &self.outputs {
            Some(values) => values.get(slot).copied().unwrap_or(false),
            None => slot == 0 && self.output,
        }
    }

    /// Value seen by a wire leaving this gate at `pin_index`.
    ///
    /// Non-negative source indices address the primary output.
    pub fn value_at(&self, pin_index: i32) -> bool {
        match output_slot(pin_index) {
            Some(slot) => self.output_at(slot),
            None => self.output,
        }
    }
}

/// Kind-specific state carried forward between generations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q_output: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q_bar_output: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_clock_state: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_first_evaluation: Option<bool>,
    /// CLOCK frequency in Hz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    /// CLOCK origin in milliseconds, as reported by the time provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_input: Option<usize>,
    /// Internal gates of a custom gate as settled by its last evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_gates: Option<Vec<Gate>>,
}

impl GateMetadata {
    pub fn is_empty(&self) -> bool {
        *self == GateMetadata::default()
    }

    pub fn clock(frequency: f64) -> Self {
        GateMetadata {
            frequency: Some(frequency),
            is_running: Some(true),
            ..GateMetadata::default()
        }
    }
}

/// A directed connection from an output pin to an input pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wire {
    pub id: String,
    pub from: PinRef,
    pub to: PinRef,
    /// Mirrors the source pin's value after the last evaluation
    #[serde(default)]
    pub is_active: bool,
}

impl Wire {
    pub fn new(id: impl Into<String>, from: PinRef, to: PinRef) -> Self {
        Wire {
            id: id.into(),
            from,
            to,
            is_active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRef {
    pub gate_id: String,
    pub pin_index: i32,
}

impl PinRef {
    pub fn input(gate_id: impl Into<String>, pin: usize) -> Self {
        PinRef {
            gate_id: gate_id.into(),
            pin_index: pin as i32,
        }
    }

    pub fn output(gate_id: impl Into<String>, slot: usize) -> Self {
        PinRef {
            gate_id: gate_id.into(),
            pin_index: -(slot as i32) - 1,
        }
    }

    pub fn input_pin(&self) -> Option<usize> {
        usize::try_from(self.pin_index).ok()
    }

    pub fn output_slot(&self) -> Option<usize> {
        output_slot(self.pin_index)
    }
}

fn output_slot(pin_index: i32) -> Option<usize> {
    if pin_index < 0 {
        usize::try_from(-(pin_index as i64) - 1).ok()
    } else {
        None
    }
}

/// User-authored gate backed by a nested circuit or a flat truth table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomGateDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub inputs: Vec<PinDefinition>,
    pub outputs: Vec<PinDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit: Option<InternalCircuit>,
    /// Input bit pattern (`"01"`) to output bit pattern (`"10"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_table: Option<BTreeMap<String, String>>,
}

/// Declared pin of a custom gate. `gate_id` optionally binds the pin to an
/// internal gate when no explicit mapping exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_id: Option<String>,
}

impl PinDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        PinDefinition {
            name: name.into(),
            gate_id: None,
        }
    }

    pub fn bound(name: impl Into<String>, gate_id: impl Into<String>) -> Self {
        PinDefinition {
            name: name.into(),
            gate_id: Some(gate_id.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalCircuit {
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub wires: Vec<Wire>,
    #[serde(default)]
    pub input_mappings: Vec<PinMapping>,
    #[serde(default)]
    pub output_mappings: Vec<PinMapping>,
}

/// Binds external pin `pin` to a pin of an internal gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinMapping {
    pub pin: usize,
    pub gate_id: String,
    #[serde(default = "primary_output_pin")]
    pub pin_index: i32,
}

impl PinMapping {
    pub fn new(pin: usize, gate_id: impl Into<String>, pin_index: i32) -> Self {
        PinMapping {
            pin,
            gate_id: gate_id.into(),
            pin_index,
        }
    }
}

fn primary_output_pin() -> i32 {
    -1
}

pub fn display_bit(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

pub fn parse_display_bit(text: &str) -> bool {
    matches!(text.trim(), "1" | "true" | "TRUE" | "True")
}
