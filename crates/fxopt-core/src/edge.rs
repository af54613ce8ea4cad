//! Edge weights of the traced graph.
//!
//! Edges are derived data: every [`Argument::Node`](crate::ops::Argument)
//! at position `i` of a consumer is mirrored by one edge
//! `producer -> consumer` carrying [`Use { position: i }`](Use). Walking the
//! outgoing edges of a node yields its users without scanning every argument
//! list in the graph.

use serde::{Deserialize, Serialize};

/// A producer -> consumer data dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Use {
    /// Index into the consumer's argument list.
    pub position: usize,
}
