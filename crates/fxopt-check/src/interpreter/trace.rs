//! Execution trace recording for the graph interpreter.
//!
//! When tracing is enabled via [`InterpreterConfig::trace_enabled`], the
//! interpreter records a [`TraceEntry`] for every node evaluation.
//!
//! [`InterpreterConfig::trace_enabled`]: super::InterpreterConfig::trace_enabled

use fxopt_core::{NodeId, OpKind};
use serde::Serialize;

/// A single entry in the execution trace, recording one node evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub node_id: NodeId,
    pub name: String,
    pub kind: OpKind,
    /// Output shape, when the node produced a tensor.
    pub shape: Option<(usize, usize)>,
}
