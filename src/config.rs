//! Evaluation configuration and the injected time source.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 16;

/// Source of "now" for CLOCK gates and evaluation timings.
///
/// The evaluator never reads the wall clock itself; hosts inject
/// [`SystemClock`] for live simulation or [`FixedTime`] for reproducible runs.
pub trait TimeProvider: fmt::Debug + Send + Sync {
    /// Milliseconds since an arbitrary, provider-defined origin.
    fn now_ms(&self) -> f64;

    fn elapsed_ms(&self, since_ms: f64) -> f64 {
        (self.now_ms() - since_ms).max(0.0)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeProvider for SystemClock {
    fn now_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// A time source frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTime(pub f64);

impl TimeProvider for FixedTime {
    fn now_ms(&self) -> f64 {
        self.0
    }
}

/// When directly coupled flip-flops are evaluated with snapshot/commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TwoPhasePolicy {
    /// At least two D flip-flops with a wire running directly between two of them
    #[default]
    DirectCoupling,
    /// Any circuit containing a D flip-flop
    AnyFlipFlop,
    /// Never; flip-flops are evaluated in dependency order like other gates
    Disabled,
}

impl TwoPhasePolicy {
    pub fn from_str(name: &str) -> Option<Self> {
        match name {
            "direct" => Some(TwoPhasePolicy::DirectCoupling),
            "any" => Some(TwoPhasePolicy::AnyFlipFlop),
            "off" => Some(TwoPhasePolicy::Disabled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TwoPhasePolicy::DirectCoupling => "direct",
            TwoPhasePolicy::AnyFlipFlop => "any",
            TwoPhasePolicy::Disabled => "off",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Record a trace entry for every gate evaluation
    pub enable_debug: bool,
    /// Evaluate cyclic circuits in a single pass instead of rejecting them
    pub allow_circular_dependencies: bool,
    /// Full validation when true, the lightweight per-tick checks otherwise
    pub strict_validation: bool,
    /// Deepest custom-gate nesting that will be evaluated
    pub max_recursion_depth: usize,
    pub time_provider: Arc<dyn TimeProvider>,
    pub two_phase: TwoPhasePolicy,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            enable_debug: false,
            allow_circular_dependencies: false,
            strict_validation: true,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            time_provider: Arc::new(SystemClock),
            two_phase: TwoPhasePolicy::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.enable_debug = enabled;
        self
    }

    pub fn with_circular_dependencies(mut self, allowed: bool) -> Self {
        self.allow_circular_dependencies = allowed;
        self
    }

    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_time_provider(mut self, provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = provider;
        self
    }

    pub fn with_fixed_time(self, now_ms: f64) -> Self {
        self.with_time_provider(Arc::new(FixedTime(now_ms)))
    }

    pub fn with_two_phase(mut self, policy: TwoPhasePolicy) -> Self {
        self.two_phase = policy;
        self
    }
}
