//! Operation vocabulary for traced graphs.
//!
//! Every node carries a [`NodeOp`]: its operation kind tag plus the minimum
//! extra data needed to evaluate it (the dotted sub-module path of a module
//! call, the builtin of a function call, the input position of a
//! placeholder). Positional inputs live in the node's [`Argument`] list.
//!
//! # Kinds
//!
//! | [`OpKind`]      | meaning                                         |
//! |-----------------|-------------------------------------------------|
//! | `placeholder`   | reads one graph input                           |
//! | `call_module`   | calls a sub-module of the owning graph module   |
//! | `call_function` | calls a stateless builtin [`Function`]          |
//! | `output`        | returns its arguments as the graph outputs      |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Operation kind tag, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Placeholder,
    CallModule,
    CallFunction,
    Output,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Placeholder => "placeholder",
            OpKind::CallModule => "call_module",
            OpKind::CallFunction => "call_function",
            OpKind::Output => "output",
        };
        f.write_str(s)
    }
}

/// Stateless builtin functions callable from a graph.
///
/// Binary functions broadcast a `Float` argument over a tensor argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Add,
    Sub,
    Mul,
    TrueDiv,
    Relu,
    Tanh,
    /// Tanh approximation of GELU.
    Gelu,
}

impl Function {
    /// Number of positional arguments the builtin takes.
    pub fn arity(&self) -> usize {
        match self {
            Function::Add | Function::Sub | Function::Mul | Function::TrueDiv => 2,
            Function::Relu | Function::Tanh | Function::Gelu => 1,
        }
    }

    /// Lowercase name used when printing graphs.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Add => "add",
            Function::Sub => "sub",
            Function::Mul => "mul",
            Function::TrueDiv => "truediv",
            Function::Relu => "relu",
            Function::Tanh => "tanh",
            Function::Gelu => "gelu",
        }
    }
}

/// The operation a node performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeOp {
    /// Reads the graph input at `index`.
    Placeholder { index: usize },
    /// Calls the sub-module found at the dotted path `target`.
    CallModule { target: String },
    /// Calls a builtin function.
    CallFunction { function: Function },
    /// Graph outputs. Must be the last node.
    Output,
}

impl NodeOp {
    /// Returns the bare kind tag.
    pub fn kind(&self) -> OpKind {
        match self {
            NodeOp::Placeholder { .. } => OpKind::Placeholder,
            NodeOp::CallModule { .. } => OpKind::CallModule,
            NodeOp::CallFunction { .. } => OpKind::CallFunction,
            NodeOp::Output => OpKind::Output,
        }
    }

    /// Returns the sub-module path for module calls.
    pub fn module_target(&self) -> Option<&str> {
        match self {
            NodeOp::CallModule { target } => Some(target),
            _ => None,
        }
    }

    /// Returns the builtin for function calls.
    pub fn function(&self) -> Option<Function> {
        match self {
            NodeOp::CallFunction { function } => Some(*function),
            _ => None,
        }
    }
}

/// One positional argument of a node.
///
/// Only `Node` arguments create producer -> consumer edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    Node(NodeId),
    Float(f64),
    Bool(bool),
}

impl Argument {
    /// Returns the referenced node, if this argument is a node reference.
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Argument::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Argument::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<NodeId> for Argument {
    fn from(id: NodeId) -> Self {
        Argument::Node(id)
    }
}
