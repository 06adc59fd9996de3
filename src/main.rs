use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use logicsim::config::{EvaluationConfig, TwoPhasePolicy, DEFAULT_MAX_RECURSION_DEPTH};
use logicsim::engine::evaluate;
use logicsim::error::CircuitError;
use logicsim::generate::random_circuit;
use logicsim::model::{display_bit, parse_display_bit, Circuit, GateKind};
use logicsim::truth_table;
use logicsim::validate::{validate, validate_light};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logicsim", version, about = "Deterministic digital-logic circuit evaluator")]
struct Cli {
    /// Tracing filter, e.g. `debug` or `logicsim::engine=debug`
    #[arg(long, global = true, default_value = "warn")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Validate {
        #[arg(long)]
        circuit: PathBuf,
        /// Only the per-tick checks (no wire checks, no warnings)
        #[arg(long, default_value_t = false)]
        light: bool,
    },
    Eval {
        #[arg(long)]
        circuit: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 0.0)]
        time_ms: f64,
        #[arg(long, default_value_t = 1)]
        ticks: usize,
        #[arg(long, default_value_t = 100.0)]
        tick_ms: f64,
        /// Force an INPUT gate before the first tick, as `id=1` or `id=0`
        #[arg(long = "set")]
        assignments: Vec<String>,
        /// Flip an INPUT gate before every tick after the first
        #[arg(long = "toggle")]
        toggles: Vec<String>,
        #[arg(long, default_value_t = false)]
        debug: bool,
        #[arg(long, default_value_t = false)]
        allow_cycles: bool,
        #[arg(long, default_value_t = DEFAULT_MAX_RECURSION_DEPTH)]
        max_depth: usize,
        #[arg(long, default_value = "direct")]
        two_phase: String,
    },
    TruthTable {
        #[arg(long)]
        circuit: PathBuf,
    },
    Hash {
        #[arg(long)]
        circuit: PathBuf,
    },
    Generate {
        #[arg(long)]
        seed: u64,
        #[arg(long, default_value_t = 4)]
        inputs: usize,
        #[arg(long, default_value_t = 16)]
        gates: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { circuit, light } => {
            let circuit = load_circuit(&circuit)?;
            let checked = if light {
                validate_light(&circuit)
            } else {
                validate(&circuit)
            };
            match checked {
                Ok(report) => {
                    println!("ok gates={} wires={}", circuit.gates.len(), circuit.wires.len());
                    for warning in &report.warnings {
                        println!("warning: {}", warning);
                    }
                }
                Err(err) => return Err(report_failure(err.into())),
            }
        }
        Commands::Eval {
            circuit,
            out,
            time_ms,
            ticks,
            tick_ms,
            assignments,
            toggles,
            debug,
            allow_cycles,
            max_depth,
            two_phase,
        } => {
            let policy = TwoPhasePolicy::from_str(&two_phase)
                .ok_or_else(|| anyhow!("unknown two-phase policy {:?}", two_phase))?;
            let plan = TickPlan {
                time_ms,
                ticks,
                tick_ms,
                assignments,
                toggles,
                debug,
                allow_cycles,
                max_depth,
                policy,
            };
            let (last, lines) = run_ticks(load_circuit(&circuit)?, &plan)?;
            for line in &lines {
                println!("{}", line);
            }
            if let Some(path) = out {
                write_circuit(&path, &last)?;
                println!("wrote {}", path.to_string_lossy());
            }
        }
        Commands::TruthTable { circuit } => {
            let circuit = load_circuit(&circuit)?;
            let cfg = EvaluationConfig::default().with_fixed_time(0.0);
            let table = truth_table::extract(&circuit, &cfg).map_err(report_failure)?;
            println!("{} | {}", table.inputs.join(" "), table.outputs.join(" "));
            for row in &table.rows {
                println!("{} | {}", bits(&row.inputs), bits(&row.outputs));
            }
        }
        Commands::Hash { circuit } => {
            let circuit = load_circuit(&circuit)?;
            println!("blake3:{}", circuit.hash());
        }
        Commands::Generate {
            seed,
            inputs,
            gates,
            out,
        } => {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let circuit = random_circuit(&mut rng, inputs, gates);
            match out {
                Some(path) => {
                    write_circuit(&path, &circuit)?;
                    println!(
                        "generated hash=blake3:{} path={}",
                        circuit.hash(),
                        path.to_string_lossy()
                    );
                }
                None => println!("{}", serde_json::to_string_pretty(&circuit)?),
            }
        }
    }
    Ok(())
}

/// The `eval` options that shape the tick loop.
struct TickPlan {
    time_ms: f64,
    ticks: usize,
    tick_ms: f64,
    assignments: Vec<String>,
    toggles: Vec<String>,
    debug: bool,
    allow_cycles: bool,
    max_depth: usize,
    policy: TwoPhasePolicy,
}

impl TickPlan {
    fn config_at(&self, now: f64) -> EvaluationConfig {
        EvaluationConfig::default()
            .with_fixed_time(now)
            .with_debug(self.debug)
            .with_circular_dependencies(self.allow_cycles)
            .with_max_recursion_depth(self.max_depth)
            .with_two_phase(self.policy)
    }
}

/// Evaluates `plan.ticks` generations starting from `circuit`. Returns the
/// last generation and the lines to print, one per tick plus trace entries.
fn run_ticks(mut current: Circuit, plan: &TickPlan) -> Result<(Circuit, Vec<String>)> {
    for assignment in &plan.assignments {
        let (id, value) = parse_assignment(assignment)?;
        set_input(&mut current, &id, value)?;
    }
    let mut lines = Vec::new();
    for tick in 0..plan.ticks {
        if tick > 0 {
            for id in &plan.toggles {
                let value = current.gate(id).map(|g| !g.output).unwrap_or(true);
                set_input(&mut current, id, value)?;
            }
        }
        let now = plan.time_ms + tick as f64 * plan.tick_ms;
        let result = evaluate(&current, &plan.config_at(now)).map_err(report_failure)?;
        debug!(tick, evaluated = result.evaluation_stats.evaluated_gates, "tick");
        lines.push(format!("tick={} t={} {}", tick, now, output_line(&result.circuit)));
        if let Some(trace) = &result.debug_trace {
            for entry in trace {
                lines.push(format!("  {}", serde_json::to_string(entry)?));
            }
        }
        current = result.circuit;
    }
    Ok((current, lines))
}

fn load_circuit(path: &Path) -> Result<Circuit> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.to_string_lossy()))?;
    let circuit = serde_json::from_str(&text)
        .with_context(|| format!("parsing circuit JSON in {}", path.to_string_lossy()))?;
    Ok(circuit)
}

fn write_circuit(path: &Path, circuit: &Circuit) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(circuit)?)?;
    Ok(())
}

fn parse_assignment(text: &str) -> Result<(String, bool)> {
    let (id, value) = text
        .split_once('=')
        .ok_or_else(|| anyhow!("expected id=value, got {:?}", text))?;
    let value = match value.trim() {
        "0" | "false" => false,
        other if parse_display_bit(other) => true,
        other => return Err(anyhow!("invalid value {:?} for {}", other, id)),
    };
    Ok((id.trim().to_string(), value))
}

fn set_input(circuit: &mut Circuit, id: &str, value: bool) -> Result<()> {
    let gate = circuit
        .gate_mut(id)
        .ok_or_else(|| anyhow!("no gate {:?}", id))?;
    if gate.kind != GateKind::Input {
        return Err(anyhow!("gate {:?} is {}, not INPUT", id, gate.kind));
    }
    gate.output = value;
    Ok(())
}

fn bits(values: &[bool]) -> String {
    values.iter().map(|&b| display_bit(b)).collect::<Vec<_>>().join(" ")
}

fn output_line(circuit: &Circuit) -> String {
    circuit
        .gates
        .iter()
        .filter(|g| g.kind == GateKind::Output)
        .map(|g| format!("{}={}", g.id, display_bit(g.output)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prints the structured report, then hands the error to anyhow.
fn report_failure(err: CircuitError) -> anyhow::Error {
    if let CircuitError::Evaluation(eval) = &err {
        if let Some(gate) = eval.gate_id() {
            warn!(gate, "evaluation failed");
        }
    }
    match serde_json::to_string(&err.report()) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{}", err),
    }
    err.into()
}
