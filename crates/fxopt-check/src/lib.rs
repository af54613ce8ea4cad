//! Execution-side checks for fxopt graph modules.
//!
//! - [`interpreter`]: reference interpreter over tensors
//! - [`timing`]: inference latency measurement
//! - [`random`]: seeded inputs and weights
//! - [`sample`]: a small QA encoder fixture

pub mod interpreter;
pub mod random;
pub mod sample;
pub mod timing;

pub use interpreter::{run_module, Interpreter, InterpreterConfig, RuntimeError, Tensor, Value};
pub use sample::{build_sample, SampleConfig};
pub use timing::{time_inference, Timing};
