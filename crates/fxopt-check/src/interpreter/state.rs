//! Interpreter over a [`GraphModule`].
//!
//! Nodes are evaluated once each, in graph order. The graph invariant that
//! every argument refers to an earlier node means a single forward sweep
//! always has every input ready.

use std::collections::HashMap;

use fxopt_core::{Argument, GraphModule, NodeId, NodeOp};

use super::error::RuntimeError;
use super::eval::{eval_function, eval_layer};
use super::trace::TraceEntry;
use super::value::{Tensor, Value};

/// Configuration for the interpreter.
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// Whether to record execution traces.
    pub trace_enabled: bool,
}

/// The graph interpreter.
pub struct Interpreter<'g> {
    module: &'g GraphModule,
    trace: Option<Vec<TraceEntry>>,
}

impl<'g> Interpreter<'g> {
    pub fn new(module: &'g GraphModule, config: InterpreterConfig) -> Self {
        let trace = if config.trace_enabled {
            Some(Vec::new())
        } else {
            None
        };
        Interpreter { module, trace }
    }

    /// Evaluates the graph on `inputs` (one tensor per placeholder) and
    /// returns the output node's tensor arguments.
    pub fn run(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>, RuntimeError> {
        if let Some(trace) = self.trace.as_mut() {
            trace.clear();
        }
        let module = self.module;
        let graph = &module.graph;
        let mut values: HashMap<NodeId, Value> = HashMap::with_capacity(graph.len());

        for (id, node) in graph.nodes() {
            let args = node
                .args()
                .iter()
                .map(|arg| resolve(&node.name, arg, &values))
                .collect::<Result<Vec<Value>, RuntimeError>>()?;

            let value = match node.op() {
                NodeOp::Placeholder { index } => {
                    let input = inputs.get(*index).ok_or_else(|| RuntimeError::MissingInput {
                        node: node.name.clone(),
                        index: *index,
                    })?;
                    Value::Tensor(input.clone())
                }
                NodeOp::CallModule { target } => {
                    let callee = module.root.get(target).ok_or_else(|| {
                        RuntimeError::UnknownSubmodule {
                            node: node.name.clone(),
                            target: target.clone(),
                        }
                    })?;
                    eval_layer(&node.name, target, &callee.layer, &args)?
                }
                NodeOp::CallFunction { function } => eval_function(&node.name, *function, &args)?,
                NodeOp::Output => {
                    self.record(id, &node.name, node.kind(), None);
                    return args
                        .into_iter()
                        .enumerate()
                        .map(|(position, v)| match v {
                            Value::Tensor(t) => Ok(t),
                            other => Err(RuntimeError::BadArgument {
                                node: node.name.clone(),
                                position,
                                expected: "Tensor".into(),
                                got: other.type_name().into(),
                            }),
                        })
                        .collect();
                }
            };

            self.record(id, &node.name, node.kind(), value.as_tensor().map(Tensor::shape));
            values.insert(id, value);
        }

        Err(RuntimeError::NoOutput)
    }

    /// Recorded trace of the last run, when tracing is enabled.
    pub fn trace(&self) -> Option<&[TraceEntry]> {
        self.trace.as_deref()
    }

    fn record(
        &mut self,
        node_id: NodeId,
        name: &str,
        kind: fxopt_core::OpKind,
        shape: Option<(usize, usize)>,
    ) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceEntry {
                node_id,
                name: name.to_string(),
                kind,
                shape,
            });
        }
    }
}

fn resolve(node: &str, arg: &Argument, values: &HashMap<NodeId, Value>) -> Result<Value, RuntimeError> {
    match arg {
        Argument::Node(id) => values.get(id).cloned().ok_or_else(|| RuntimeError::InternalError {
            message: format!("node '{}' reads NodeId({}) before it was evaluated", node, id),
        }),
        other => Value::from_constant(other).ok_or_else(|| RuntimeError::InternalError {
            message: format!("unresolvable constant in node '{}'", node),
        }),
    }
}

/// Runs `module` once with default configuration.
pub fn run_module(module: &GraphModule, inputs: &[Tensor]) -> Result<Vec<Tensor>, RuntimeError> {
    Interpreter::new(module, InterpreterConfig::default()).run(inputs)
}
