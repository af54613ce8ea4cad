//! fxopt command-line harness.
//!
//! Provides the `fxopt` binary for working with serialized graph modules:
//! write a sample model, apply rewrite passes, run one inference example,
//! and time inference before and after a pass pipeline.
//!
//! Results go to stdout as JSON; diagnostics go to stderr through
//! `tracing`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, Level};

use fxopt_check::random::random_tensor;
use fxopt_check::{build_sample, run_module, time_inference, SampleConfig, Tensor};
use fxopt_core::{GraphModule, Layer};
use fxopt_passes::{compose_by_names, Transformation, PASS_NAMES};

/// Graph-module rewrite passes and inference timing.
#[derive(Parser)]
#[command(name = "fxopt", about = "Graph-module rewrite passes and inference timing")]
struct Cli {
    /// Log every rewrite, not just per-pass summaries.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Write the sample QA encoder as JSON.
    Sample {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 16)]
        hidden: usize,

        #[arg(long, default_value_t = 32)]
        intermediate: usize,

        #[arg(long, default_value_t = 2)]
        layers: usize,

        /// Leave out the batch norm after each output projection.
        #[arg(long)]
        no_batch_norm: bool,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Apply passes to a graph module and write the result.
    Transform {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Pass to apply; repeat to chain, applied in order.
        #[arg(short, long = "pass", required = true)]
        passes: Vec<String>,
    },

    /// Run one inference example on a seeded random input.
    Infer {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value_t = 8)]
        rows: usize,

        /// Input width (default: the first linear layer's input features).
        #[arg(long)]
        features: Option<usize>,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Time inference before and after a pass pipeline.
    Bench {
        #[arg(short, long)]
        input: PathBuf,

        /// Pass to apply; repeat to chain (default: every registered pass).
        #[arg(short, long = "pass")]
        passes: Vec<String>,

        #[arg(short = 'n', long, default_value_t = 100)]
        iterations: usize,

        #[arg(long, default_value_t = 8)]
        rows: usize,

        #[arg(long)]
        features: Option<usize>,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Sample {
            output,
            hidden,
            intermediate,
            layers,
            no_batch_norm,
            seed,
        } => {
            let config = SampleConfig {
                hidden,
                intermediate,
                layers,
                batch_norm: !no_batch_norm,
                seed,
                ..SampleConfig::default()
            };
            run_sample(&config, &output)
        }
        Commands::Transform {
            input,
            output,
            passes,
        } => run_transform(&input, &output, &passes),
        Commands::Infer {
            input,
            rows,
            features,
            seed,
        } => run_infer(&input, rows, features, seed),
        Commands::Bench {
            input,
            passes,
            iterations,
            rows,
            features,
            seed,
        } => run_bench(&input, &passes, iterations, rows, features, seed),
    };
    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Subcommands
//
// Each returns an exit code: 0 = success, 1 = pass or evaluation error,
// 3 = I/O or parse error.
// ---------------------------------------------------------------------------

fn run_sample(config: &SampleConfig, output: &Path) -> i32 {
    let module = match build_sample(config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: failed to build sample: {}", e);
            return 1;
        }
    };
    if let Err(code) = save_module(&module, output) {
        return code;
    }
    print_json(&json!({
        "output": output.display().to_string(),
        "nodes": module.graph.len(),
        "dropout_calls": module.dropout_call_count(),
        "parameters": module.root.parameter_count(),
    }));
    0
}

fn run_transform(input: &Path, output: &Path, passes: &[String]) -> i32 {
    let module = match load_module(input) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let chain = match compose_by_names(passes) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let nodes_before = module.graph.len();
    let dropout_before = module.dropout_call_count();
    let module = match chain.apply(module, true) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Err(code) = save_module(&module, output) {
        return code;
    }

    print_json(&json!({
        "passes": chain.names(),
        "nodes_before": nodes_before,
        "nodes_after": module.graph.len(),
        "dropout_calls_before": dropout_before,
        "dropout_calls_after": module.dropout_call_count(),
    }));
    0
}

fn run_infer(input: &Path, rows: usize, features: Option<usize>, seed: u64) -> i32 {
    let module = match load_module(input) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let inputs = match example_inputs(&module, rows, features, seed) {
        Ok(t) => t,
        Err(code) => return code,
    };
    let outputs = match run_module(&module, &inputs) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Inference error: {}", e);
            return 1;
        }
    };

    let spans: Vec<_> = outputs.iter().map(answer_span).collect();
    print_json(&json!({
        "outputs": outputs,
        "spans": spans,
    }));
    0
}

fn run_bench(
    input: &Path,
    passes: &[String],
    iterations: usize,
    rows: usize,
    features: Option<usize>,
    seed: u64,
) -> i32 {
    let module = match load_module(input) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let chain = if passes.is_empty() {
        compose_by_names(PASS_NAMES)
    } else {
        compose_by_names(passes)
    };
    let chain = match chain {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let inputs = match example_inputs(&module, rows, features, seed) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let baseline = match run_module(&module, &inputs)
        .and_then(|out| time_inference(&module, &inputs, iterations).map(|t| (out, t)))
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Inference error: {}", e);
            return 1;
        }
    };
    info!(mean_ms = baseline.1.mean_ms(), "baseline timed");

    let optimized_module = match chain.apply(module, true) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let optimized = match run_module(&optimized_module, &inputs)
        .and_then(|out| time_inference(&optimized_module, &inputs, iterations).map(|t| (out, t)))
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Inference error after passes: {}", e);
            return 1;
        }
    };
    info!(mean_ms = optimized.1.mean_ms(), "optimized timed");

    let max_abs_diff = match max_abs_diff(&baseline.0, &optimized.0) {
        Some(d) => d,
        None => {
            eprintln!("Error: passes changed the output shapes");
            return 1;
        }
    };
    let speedup = baseline.1.mean.as_secs_f64() / optimized.1.mean.as_secs_f64().max(f64::EPSILON);

    print_json(&json!({
        "passes": chain.names(),
        "preserves_computation": chain.preserves_computation(),
        "iterations": baseline.1.iterations,
        "baseline_ms": baseline.1.mean_ms(),
        "optimized_ms": optimized.1.mean_ms(),
        "speedup": speedup,
        "max_abs_diff": max_abs_diff,
    }));
    0
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_module(path: &Path) -> Result<GraphModule, i32> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })?;
    let module = GraphModule::from_json(&text).map_err(|e| {
        eprintln!("Error: failed to parse '{}': {}", path.display(), e);
        3
    })?;
    module.lint().map_err(|e| {
        eprintln!("Error: '{}' is not a valid graph module: {}", path.display(), e);
        1
    })?;
    Ok(module)
}

fn save_module(module: &GraphModule, path: &Path) -> Result<(), i32> {
    let json = module.to_json().map_err(|e| {
        eprintln!("Error: failed to serialize module: {}", e);
        1
    })?;
    fs::write(path, json).map_err(|e| {
        eprintln!("Error: failed to write '{}': {}", path.display(), e);
        3
    })
}

/// One seeded `rows x features` tensor per placeholder.
fn example_inputs(
    module: &GraphModule,
    rows: usize,
    features: Option<usize>,
    seed: u64,
) -> Result<Vec<Tensor>, i32> {
    let Some(features) = features.or_else(|| input_width(module)) else {
        eprintln!("Error: cannot infer the input width; pass --features");
        return Err(1);
    };
    Ok((0..module.graph.placeholders().len() as u64)
        .map(|i| random_tensor(rows, features, seed.wrapping_add(i)))
        .collect())
}

/// Input features of the first linear layer called in graph order.
fn input_width(module: &GraphModule) -> Option<usize> {
    module.graph.nodes().find_map(|(_, node)| {
        match &module.root.get(node.target()?)?.layer {
            Layer::Linear(l) => Some(l.in_features),
            _ => None,
        }
    })
}

/// For a start/end logit pair per row, the rows with the highest start and
/// end score.
fn answer_span(logits: &Tensor) -> Option<(usize, usize)> {
    if logits.cols != 2 || logits.rows == 0 {
        return None;
    }
    let best = |col: usize| {
        (0..logits.rows).fold(0, |best, r| {
            if logits.get(r, col) > logits.get(best, col) {
                r
            } else {
                best
            }
        })
    };
    Some((best(0), best(1)))
}

fn max_abs_diff(a: &[Tensor], b: &[Tensor]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    a.iter()
        .zip(b)
        .try_fold(0.0f32, |acc, (x, y)| Some(acc.max(x.max_abs_diff(y)?)))
}

fn print_json(value: &serde_json::Value) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}
