//! Graph nodes.
//!
//! A [`Node`] pairs a unique name with its operation and positional
//! arguments. The argument list is only mutable through
//! [`Graph`](crate::graph::Graph) methods, which keep the mirrored edges in
//! sync.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::ops::{Argument, NodeOp, OpKind};

/// One operation in a traced graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique name within the owning graph.
    pub name: String,
    pub(crate) op: NodeOp,
    pub(crate) args: Vec<Argument>,
}

impl Node {
    pub(crate) fn new(name: String, op: NodeOp, args: Vec<Argument>) -> Self {
        Node { name, op, args }
    }

    pub fn op(&self) -> &NodeOp {
        &self.op
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    /// Sub-module path, for module calls.
    pub fn target(&self) -> Option<&str> {
        self.op.module_target()
    }

    /// Positional arguments in call order.
    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    /// Node references among the arguments, in argument order (duplicates
    /// kept).
    pub fn input_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.args.iter().filter_map(Argument::as_node)
    }
}
