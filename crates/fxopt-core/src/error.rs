//! Core error types for fxopt-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! the failure modes of graph construction, rewriting, and sub-module
//! lookup.

use crate::id::NodeId;
use thiserror::Error;

/// Core errors produced by the fxopt-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id was not found in the graph (never existed or was erased).
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// A node name is already taken within the graph.
    #[error("duplicate node name: '{name}'")]
    DuplicateNodeName { name: String },

    /// A node argument refers to a node that does not precede it.
    #[error("invalid argument {position} of node '{node}': {reason}")]
    InvalidArgument {
        node: String,
        position: usize,
        reason: String,
    },

    /// Attempt to erase a node whose output is still consumed.
    #[error("node '{name}' still has {users} user(s)")]
    NodeHasUsers { name: String, users: usize },

    /// A dotted target path does not resolve to a sub-module.
    #[error("submodule not found: '{path}'")]
    SubmoduleNotFound { path: String },

    /// A sub-module name is already taken under its parent.
    #[error("duplicate submodule: '{path}'")]
    DuplicateSubmodule { path: String },

    /// A sub-module path or child name is malformed.
    #[error("invalid submodule path: '{path}'")]
    InvalidPath { path: String },

    /// Layer parameters disagree with the declared shape.
    #[error("invalid layer: {reason}")]
    InvalidLayer { reason: String },

    /// A rewrite would break graph order or acyclicity.
    #[error("invalid rewrite: {reason}")]
    InvalidRewrite { reason: String },

    /// A structural graph invariant was violated.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },

    /// Graph module (de)serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
