//! Runtime error types for the graph interpreter.
//!
//! Every evaluation failure names the node that caused it, so a failing
//! rewrite can be traced back to the exact node it produced.

use serde::{Deserialize, Serialize};

/// Runtime errors produced by the interpreter.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum RuntimeError {
    #[error("missing graph input {index} for placeholder '{node}'")]
    MissingInput { node: String, index: usize },

    #[error("shape mismatch at node '{node}': {reason}")]
    ShapeMismatch { node: String, reason: String },

    #[error("bad argument {position} at node '{node}': expected {expected}, got {got}")]
    BadArgument {
        node: String,
        position: usize,
        expected: String,
        got: String,
    },

    #[error("node '{node}' takes {expected} argument(s), got {got}")]
    ArityMismatch {
        node: String,
        expected: usize,
        got: usize,
    },

    #[error("node '{node}' calls unknown submodule '{target}'")]
    UnknownSubmodule { node: String, target: String },

    #[error("node '{node}' calls '{target}', a {kind}, which is not callable")]
    NotCallable {
        node: String,
        target: String,
        kind: String,
    },

    #[error("graph has no output node")]
    NoOutput,

    #[error("invalid tensor: {reason}")]
    InvalidTensor { reason: String },

    #[error("internal error: {message}")]
    InternalError { message: String },
}
