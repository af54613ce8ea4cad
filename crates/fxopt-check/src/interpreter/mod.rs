//! Reference interpreter for graph modules.
//!
//! Executes a [`GraphModule`](fxopt_core::GraphModule) on concrete inputs so
//! rewrites can be checked for numerical equivalence and inference can be
//! timed without any external runtime.
//!
//! - [`Interpreter`] evaluates each node once, in graph order.
//! - [`Tensor`] / [`Value`] are the runtime values.
//! - [`RuntimeError`] names the node that failed.
//! - [`TraceEntry`] records each evaluation when tracing is enabled.
//!
//! # Usage
//!
//! ```ignore
//! let mut interp = Interpreter::new(&module, InterpreterConfig::default());
//! let outputs = interp.run(&[input])?;
//! ```

pub mod error;
pub mod eval;
pub mod state;
pub mod trace;
pub mod value;

pub use error::RuntimeError;
pub use state::{run_module, Interpreter, InterpreterConfig};
pub use trace::TraceEntry;
pub use value::{Tensor, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use fxopt_core::{Argument, Function, Graph, GraphModule, Layer, Linear, OpKind, Submodule};

    /// x -> drop -> fc -> relu -> output
    fn build_mlp() -> GraphModule {
        let mut graph = Graph::new();
        let x = graph.placeholder("x").unwrap();
        let d = graph.call_module("drop", "drop", vec![x.into()]).unwrap();
        let y = graph.call_module("fc", "fc", vec![d.into()]).unwrap();
        let r = graph.call_function("relu", Function::Relu, vec![y.into()]).unwrap();
        graph.output(vec![r.into()]).unwrap();

        let fc = Linear::new(2, 2, vec![1.0, -1.0, -1.0, 1.0], Some(vec![0.0, 0.5])).unwrap();
        let root = Submodule::container()
            .with_child("drop", Submodule::new(Layer::Dropout { p: 0.1 }))
            .with_child("fc", Submodule::new(Layer::Linear(fc)));
        GraphModule::new(graph, root)
    }

    fn t(rows: usize, cols: usize, data: &[f32]) -> Tensor {
        Tensor::from_vec(rows, cols, data.to_vec()).unwrap()
    }

    #[test]
    fn run_mlp() {
        let gm = build_mlp();
        let out = run_module(&gm, &[t(2, 2, &[3.0, 1.0, 0.0, 2.0])]).unwrap();
        assert_eq!(out.len(), 1);
        // row 0: [3-1, -3+1+0.5] -> relu -> [2, 0]
        // row 1: [0-2, 0+2+0.5] -> relu -> [0, 2.5]
        assert_eq!(out[0], t(2, 2, &[2.0, 0.0, 0.0, 2.5]));
    }

    #[test]
    fn missing_input_errors() {
        let gm = build_mlp();
        let err = run_module(&gm, &[]).unwrap_err();
        match err {
            RuntimeError::MissingInput { node, index } => {
                assert_eq!(node, "x");
                assert_eq!(index, 0);
            }
            other => panic!("expected MissingInput, got {:?}", other),
        }
    }

    #[test]
    fn unknown_submodule_errors() {
        let mut gm = build_mlp();
        gm.delete_submodule("drop").unwrap();
        let err = run_module(&gm, &[t(1, 2, &[0.0, 0.0])]).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownSubmodule { .. }));
    }

    #[test]
    fn graph_without_output_errors() {
        let mut graph = Graph::new();
        graph.placeholder("x").unwrap();
        let gm = GraphModule::new(graph, Submodule::container());
        assert!(matches!(
            run_module(&gm, &[t(1, 1, &[0.0])]),
            Err(RuntimeError::NoOutput)
        ));
    }

    #[test]
    fn output_of_scalar_is_rejected() {
        let mut graph = Graph::new();
        graph.placeholder("x").unwrap();
        graph.output(vec![Argument::Float(1.0)]).unwrap();
        let gm = GraphModule::new(graph, Submodule::container());
        assert!(matches!(
            run_module(&gm, &[t(1, 1, &[0.0])]),
            Err(RuntimeError::BadArgument { .. })
        ));
    }

    #[test]
    fn trace_records_every_node() {
        let gm = build_mlp();
        let mut interp = Interpreter::new(
            &gm,
            InterpreterConfig {
                trace_enabled: true,
            },
        );
        interp.run(&[t(1, 2, &[1.0, 1.0])]).unwrap();
        let trace = interp.trace().unwrap();
        let names: Vec<&str> = trace.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["x", "drop", "fc", "relu", "output"]);
        assert_eq!(trace[2].shape, Some((1, 2)));
        assert_eq!(trace[4].kind, OpKind::Output);
        assert_eq!(trace[4].shape, None);
    }

    #[test]
    fn trace_disabled_by_default() {
        let gm = build_mlp();
        let mut interp = Interpreter::new(&gm, InterpreterConfig::default());
        interp.run(&[t(1, 2, &[1.0, 1.0])]).unwrap();
        assert!(interp.trace().is_none());
    }
}
