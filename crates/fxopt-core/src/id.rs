//! Stable node identifier for traced graphs.
//!
//! [`NodeId`] is a newtype over `u32` bridged to petgraph's `NodeIndex<u32>`.
//! The graph is backed by a `StableGraph`, so an id keeps pointing at the
//! same node after other nodes are erased. Slots of erased nodes may be
//! reused by nodes appended later.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Stable node identifier. Maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<NodeIndex<u32>> for NodeId {
    fn from(idx: NodeIndex<u32>) -> Self {
        NodeId(idx.index() as u32)
    }
}

impl From<NodeId> for NodeIndex<u32> {
    fn from(id: NodeId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_and_from_node_index() {
        let back: NodeIndex<u32> = NodeId(3).into();
        assert_eq!(back.index(), 3);
        assert_eq!(NodeId::from(NodeIndex::<u32>::new(3)), NodeId(3));
    }

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "7");
    }

    #[test]
    fn node_ids_order_by_value() {
        assert!(NodeId(1) < NodeId(2));
    }

    #[test]
    fn serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&NodeId(42)).unwrap(), "42");
        assert_eq!(serde_json::from_str::<NodeId>("42").unwrap(), NodeId(42));
    }
}
