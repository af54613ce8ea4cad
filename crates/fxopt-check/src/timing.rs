//! Inference latency measurement.

use std::time::{Duration, Instant};

use fxopt_core::GraphModule;
use serde::Serialize;

use crate::interpreter::{Interpreter, InterpreterConfig, RuntimeError, Tensor};

/// Wall-clock timing of repeated inference runs.
#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    pub iterations: usize,
    pub total: Duration,
    pub mean: Duration,
}

impl Timing {
    pub fn mean_ms(&self) -> f64 {
        self.mean.as_secs_f64() * 1e3
    }
}

/// Runs `module` on `inputs` `iterations` times (at least once) and reports
/// total and mean duration. The first error aborts the measurement.
pub fn time_inference(
    module: &GraphModule,
    inputs: &[Tensor],
    iterations: usize,
) -> Result<Timing, RuntimeError> {
    let iterations = iterations.max(1);
    let mut interp = Interpreter::new(module, InterpreterConfig::default());
    let start = Instant::now();
    for _ in 0..iterations {
        interp.run(inputs)?;
    }
    let total = start.elapsed();
    let mean = mean_duration(total, iterations);
    tracing::debug!(iterations, ?mean, "timed inference");
    Ok(Timing {
        iterations,
        total,
        mean,
    })
}

/// `total / iterations` without narrowing the count to `u32`.
fn mean_duration(total: Duration, iterations: usize) -> Duration {
    total.div_f64(iterations.max(1) as f64)
}
