//! Graph: the ordered, index-stable computation graph of a traced module.
//!
//! [`Graph`] stores nodes in a petgraph `StableGraph` (an arena with
//! tombstones, so ids survive erasure of other nodes) and keeps the graph
//! order in an explicit `order` list. Every `Argument::Node` of a node is
//! mirrored by a [`Use`] edge from the producer, which makes
//! [`users`](Graph::users) a neighbour walk instead of a full scan.
//!
//! # Invariants
//!
//! - Every node argument refers to a node strictly earlier in `order`.
//!   Appending can only reference existing nodes, and every rewrite method
//!   re-checks positions, so the graph stays acyclic.
//! - Node names are unique.
//! - At most one `Output` node exists and nothing follows it.
//!
//! All mutations go through `Graph` methods; [`lint`](Graph::lint) re-checks
//! the invariants from scratch.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::edge::Use;
use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::Node;
use crate::ops::{Argument, Function, NodeOp, OpKind};

/// The ordered computation graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: StableGraph<Node, Use, Directed, u32>,
    /// Graph (topological) order of live nodes.
    order: Vec<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    // -----------------------------------------------------------------------
    // Builders
    // -----------------------------------------------------------------------

    /// Appends a node at the end of the graph order.
    ///
    /// Errors if the name is taken, if any node argument does not exist, or
    /// if the graph already ends with an `Output` node.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op: NodeOp,
        args: Vec<Argument>,
    ) -> Result<NodeId, CoreError> {
        let name = name.into();
        if self.node_by_name(&name).is_some() {
            return Err(CoreError::DuplicateNodeName { name });
        }
        if self.output_node().is_some() {
            return Err(CoreError::GraphInconsistency {
                reason: format!("cannot append '{}' after the output node", name),
            });
        }
        for (position, arg) in args.iter().enumerate() {
            if let Argument::Node(id) = arg {
                if !self.contains(*id) {
                    return Err(CoreError::InvalidArgument {
                        node: name,
                        position,
                        reason: format!("NodeId({}) does not exist", id),
                    });
                }
            }
        }

        let idx = self.nodes.add_node(Node::new(name, op, args.clone()));
        for (position, arg) in args.iter().enumerate() {
            if let Argument::Node(producer) = arg {
                self.nodes
                    .add_edge((*producer).into(), idx, Use { position });
            }
        }
        let id = NodeId::from(idx);
        self.order.push(id);
        Ok(id)
    }

    /// Appends a placeholder reading the next graph input.
    pub fn placeholder(&mut self, name: impl Into<String>) -> Result<NodeId, CoreError> {
        let index = self.placeholders().len();
        self.add_node(name, NodeOp::Placeholder { index }, Vec::new())
    }

    /// Appends a call to the sub-module at `target`.
    pub fn call_module(
        &mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        args: Vec<Argument>,
    ) -> Result<NodeId, CoreError> {
        self.add_node(
            name,
            NodeOp::CallModule {
                target: target.into(),
            },
            args,
        )
    }

    /// Appends a call to a builtin function.
    pub fn call_function(
        &mut self,
        name: impl Into<String>,
        function: Function,
        args: Vec<Argument>,
    ) -> Result<NodeId, CoreError> {
        self.add_node(name, NodeOp::CallFunction { function }, args)
    }

    /// Appends the output node, named `output`.
    pub fn output(&mut self, args: Vec<Argument>) -> Result<NodeId, CoreError> {
        self.add_node("output", NodeOp::Output, args)
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.node_weight(id.into())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of producer -> consumer edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.edge_count()
    }

    /// Node ids in graph order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    /// Nodes in graph order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.order
            .iter()
            .filter_map(move |&id| self.node(id).map(|n| (id, n)))
    }

    /// Position of a node in graph order.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes()
            .find(|(_, n)| n.name == name)
            .map(|(id, _)| id)
    }

    /// Distinct consumers of `id`, in graph order.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        let idx: NodeIndex<u32> = id.into();
        if self.nodes.node_weight(idx).is_none() {
            return Vec::new();
        }
        let consumers: HashSet<NodeId> = self
            .nodes
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| NodeId::from(e.target()))
            .collect();
        self.order
            .iter()
            .copied()
            .filter(|n| consumers.contains(n))
            .collect()
    }

    /// Placeholder nodes in graph order.
    pub fn placeholders(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, n)| n.kind() == OpKind::Placeholder)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn output_node(&self) -> Option<NodeId> {
        self.nodes()
            .find(|(_, n)| n.kind() == OpKind::Output)
            .map(|(id, _)| id)
    }

    /// Count of live nodes per operation kind.
    pub fn kind_counts(&self) -> HashMap<OpKind, usize> {
        let mut counts = HashMap::new();
        for (_, node) in self.nodes() {
            *counts.entry(node.kind()).or_insert(0) += 1;
        }
        counts
    }

    // -----------------------------------------------------------------------
    // Rewrites
    // -----------------------------------------------------------------------

    /// Makes every consumer of `old` consume `new` instead.
    ///
    /// `new` must precede every current user of `old` in graph order.
    /// Returns the number of rewritten argument slots (0 for an unused
    /// node).
    pub fn replace_all_uses_with(&mut self, old: NodeId, new: NodeId) -> Result<usize, CoreError> {
        if !self.contains(old) {
            return Err(CoreError::NodeNotFound { id: old });
        }
        let new_pos = self.position(new).ok_or(CoreError::NodeNotFound { id: new })?;
        if old == new {
            return Ok(0);
        }

        let uses: Vec<_> = self
            .nodes
            .edges_directed(old.into(), Direction::Outgoing)
            .map(|e| (e.id(), e.target(), *e.weight()))
            .collect();

        for &(_, user, _) in &uses {
            let user_id = NodeId::from(user);
            let user_pos = self.position(user_id).ok_or(CoreError::NodeNotFound { id: user_id })?;
            if user_pos <= new_pos {
                return Err(CoreError::InvalidRewrite {
                    reason: format!(
                        "'{}' does not precede user '{}' of '{}'",
                        self.nodes[NodeIndex::<u32>::from(new)].name,
                        self.nodes[user].name,
                        self.nodes[NodeIndex::<u32>::from(old)].name
                    ),
                });
            }
        }

        for &(edge, user, weight) in &uses {
            self.nodes.remove_edge(edge);
            self.nodes[user].args[weight.position] = Argument::Node(new);
            self.nodes.add_edge(new.into(), user, weight);
        }
        Ok(uses.len())
    }

    /// Like [`replace_all_uses_with`](Self::replace_all_uses_with), but the
    /// replacement may be any argument. A constant is written into each
    /// user's slot and the edge is dropped.
    pub fn replace_all_uses_with_arg(&mut self, old: NodeId, new: Argument) -> Result<usize, CoreError> {
        if let Argument::Node(new) = new {
            return self.replace_all_uses_with(old, new);
        }
        if !self.contains(old) {
            return Err(CoreError::NodeNotFound { id: old });
        }
        let uses: Vec<_> = self
            .nodes
            .edges_directed(old.into(), Direction::Outgoing)
            .map(|e| (e.id(), e.target(), e.weight().position))
            .collect();
        for &(edge, user, position) in &uses {
            self.nodes.remove_edge(edge);
            self.nodes[user].args[position] = new;
        }
        Ok(uses.len())
    }

    /// Removes a node that has no users. Returns the removed node.
    pub fn erase_node(&mut self, id: NodeId) -> Result<Node, CoreError> {
        let idx: NodeIndex<u32> = id.into();
        let node = self
            .nodes
            .node_weight(idx)
            .ok_or(CoreError::NodeNotFound { id })?;
        let users = self.users(id).len();
        if users > 0 {
            return Err(CoreError::NodeHasUsers {
                name: node.name.clone(),
                users,
            });
        }
        self.order.retain(|&n| n != id);
        self.nodes
            .remove_node(idx)
            .ok_or(CoreError::NodeNotFound { id })
    }

    /// Replaces a node's operation, returning the old one.
    ///
    /// The `Output` kind can be neither introduced nor removed this way.
    pub fn set_op(&mut self, id: NodeId, op: NodeOp) -> Result<NodeOp, CoreError> {
        let node = self
            .nodes
            .node_weight_mut(id.into())
            .ok_or(CoreError::NodeNotFound { id })?;
        if (node.kind() == OpKind::Output) != (op.kind() == OpKind::Output) {
            return Err(CoreError::InvalidRewrite {
                reason: format!("cannot change '{}' to or from an output", node.name),
            });
        }
        Ok(std::mem::replace(&mut node.op, op))
    }

    /// Replaces a node's arguments, returning the old ones.
    ///
    /// Every node argument must exist and precede `id` in graph order.
    pub fn set_args(&mut self, id: NodeId, args: Vec<Argument>) -> Result<Vec<Argument>, CoreError> {
        let pos = self.position(id).ok_or(CoreError::NodeNotFound { id })?;
        let idx: NodeIndex<u32> = id.into();
        for (position, arg) in args.iter().enumerate() {
            if let Argument::Node(producer) = arg {
                match self.position(*producer) {
                    Some(p) if p < pos => {}
                    _ => {
                        return Err(CoreError::InvalidArgument {
                            node: self.nodes[idx].name.clone(),
                            position,
                            reason: format!("NodeId({}) does not precede the node", producer),
                        })
                    }
                }
            }
        }

        let incoming: Vec<_> = self
            .nodes
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        for edge in incoming {
            self.nodes.remove_edge(edge);
        }
        for (position, arg) in args.iter().enumerate() {
            if let Argument::Node(producer) = arg {
                self.nodes.add_edge((*producer).into(), idx, Use { position });
            }
        }
        Ok(std::mem::replace(&mut self.nodes[idx].args, args))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Re-checks every structural invariant from scratch.
    pub fn lint(&self) -> Result<(), CoreError> {
        if self.order.len() != self.nodes.node_count() {
            return Err(CoreError::GraphInconsistency {
                reason: format!(
                    "order lists {} nodes but graph holds {}",
                    self.order.len(),
                    self.nodes.node_count()
                ),
            });
        }

        let mut seen: HashMap<NodeId, usize> = HashMap::new();
        let mut names: HashSet<&str> = HashSet::new();
        let mut expected_edges = 0usize;

        for (pos, &id) in self.order.iter().enumerate() {
            let node = self.node(id).ok_or(CoreError::NodeNotFound { id })?;
            if !names.insert(node.name.as_str()) {
                return Err(CoreError::DuplicateNodeName {
                    name: node.name.clone(),
                });
            }
            if node.kind() == OpKind::Output && pos + 1 != self.order.len() {
                return Err(CoreError::GraphInconsistency {
                    reason: format!("output node '{}' is not last", node.name),
                });
            }
            for (position, arg) in node.args.iter().enumerate() {
                if let Argument::Node(producer) = arg {
                    if !seen.contains_key(producer) {
                        return Err(CoreError::InvalidArgument {
                            node: node.name.clone(),
                            position,
                            reason: format!("NodeId({}) is not an earlier node", producer),
                        });
                    }
                    let mirrored = self
                        .nodes
                        .edges_directed(id.into(), Direction::Incoming)
                        .any(|e| {
                            NodeId::from(e.source()) == *producer && e.weight().position == position
                        });
                    if !mirrored {
                        return Err(CoreError::GraphInconsistency {
                            reason: format!(
                                "argument {} of '{}' has no matching edge",
                                position, node.name
                            ),
                        });
                    }
                    expected_edges += 1;
                }
            }
            seen.insert(id, pos);
        }

        if expected_edges != self.nodes.edge_count() {
            return Err(CoreError::GraphInconsistency {
                reason: format!(
                    "{} node arguments but {} edges",
                    expected_edges,
                    self.nodes.edge_count()
                ),
            });
        }
        Ok(())
    }

    fn format_arg(&self, arg: &Argument) -> String {
        match arg {
            Argument::Node(id) => match self.node(*id) {
                Some(n) => format!("%{}", n.name),
                None => format!("%<erased {}>", id),
            },
            Argument::Float(v) => format!("{:?}", v),
            Argument::Bool(b) => b.to_string(),
        }
    }
}

/// Prints one node per line in graph order, e.g.
/// `%y : call_module[target=fc](args = (%x,))`.
impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph():")?;
        for (_, node) in self.nodes() {
            let args: Vec<String> = node.args.iter().map(|a| self.format_arg(a)).collect();
            let args = match args.len() {
                0 => "()".to_string(),
                1 => format!("({},)", args[0]),
                _ => format!("({})", args.join(", ")),
            };
            match &node.op {
                NodeOp::Placeholder { index } => {
                    writeln!(f, "    %{} : placeholder[index={}]", node.name, index)?
                }
                NodeOp::CallModule { target } => writeln!(
                    f,
                    "    %{} : call_module[target={}](args = {})",
                    node.name, target, args
                )?,
                NodeOp::CallFunction { function } => writeln!(
                    f,
                    "    %{} : call_function[target={}](args = {})",
                    node.name,
                    function.name(),
                    args
                )?,
                NodeOp::Output => writeln!(f, "    return {}", args)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x -> drop -> fc -> output
    fn chain() -> (Graph, NodeId, NodeId, NodeId) {
        let mut g = Graph::new();
        let x = g.placeholder("x").unwrap();
        let d = g.call_module("d", "drop", vec![x.into()]).unwrap();
        let y = g.call_module("y", "fc", vec![d.into()]).unwrap();
        g.output(vec![y.into()]).unwrap();
        (g, x, d, y)
    }

    #[test]
    fn build_chain_and_query() {
        let (g, x, d, y) = chain();
        assert_eq!(g.len(), 4);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.users(x), vec![d]);
        assert_eq!(g.users(d), vec![y]);
        assert_eq!(g.placeholders(), vec![x]);
        assert_eq!(g.node_by_name("y"), Some(y));
        assert!(g.output_node().is_some());
        g.lint().unwrap();
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut g = Graph::new();
        g.placeholder("x").unwrap();
        assert!(matches!(
            g.placeholder("x"),
            Err(CoreError::DuplicateNodeName { .. })
        ));
    }

    #[test]
    fn dangling_argument_rejected() {
        let mut g = Graph::new();
        let err = g
            .call_module("d", "drop", vec![Argument::Node(NodeId(9))])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { position: 0, .. }));
    }

    #[test]
    fn nothing_after_output() {
        let (mut g, x, _, _) = chain();
        assert!(matches!(
            g.call_module("late", "fc", vec![x.into()]),
            Err(CoreError::GraphInconsistency { .. })
        ));
    }

    #[test]
    fn placeholders_are_numbered_in_order() {
        let mut g = Graph::new();
        let a = g.placeholder("a").unwrap();
        let b = g.placeholder("b").unwrap();
        assert_eq!(g.node(a).unwrap().op(), &NodeOp::Placeholder { index: 0 });
        assert_eq!(g.node(b).unwrap().op(), &NodeOp::Placeholder { index: 1 });
    }

    #[test]
    fn replace_all_uses_then_erase() {
        let (mut g, x, d, y) = chain();
        assert_eq!(g.replace_all_uses_with(d, x).unwrap(), 1);
        assert!(g.users(d).is_empty());
        assert_eq!(g.node(y).unwrap().args(), &[Argument::Node(x)]);

        let removed = g.erase_node(d).unwrap();
        assert_eq!(removed.name, "d");
        assert!(!g.contains(d));
        assert_eq!(g.len(), 3);
        assert_eq!(g.users(x), vec![y]);
        g.lint().unwrap();
    }

    #[test]
    fn replace_all_uses_of_unused_node_is_noop() {
        let mut g = Graph::new();
        let x = g.placeholder("x").unwrap();
        let d = g.call_module("d", "drop", vec![x.into()]).unwrap();
        assert_eq!(g.replace_all_uses_with(d, x).unwrap(), 0);
        g.erase_node(d).unwrap();
        g.lint().unwrap();
    }

    #[test]
    fn replace_all_uses_rewrites_every_slot() {
        let mut g = Graph::new();
        let x = g.placeholder("x").unwrap();
        let d = g.call_module("d", "drop", vec![x.into()]).unwrap();
        let s = g
            .call_function("s", Function::Add, vec![d.into(), d.into()])
            .unwrap();
        assert_eq!(g.replace_all_uses_with(d, x).unwrap(), 2);
        assert_eq!(g.node(s).unwrap().args(), &[Argument::Node(x), Argument::Node(x)]);
        assert_eq!(g.users(x), vec![d, s]);
        g.lint().unwrap();
    }

    #[test]
    fn replace_uses_with_constant_drops_edges() {
        let mut g = Graph::new();
        let x = g.placeholder("x").unwrap();
        let c = g.call_module("c", "drop", vec![Argument::Float(1.0)]).unwrap();
        let s = g
            .call_function("s", Function::Add, vec![x.into(), c.into()])
            .unwrap();
        let out = g.output(vec![c.into(), s.into()]).unwrap();

        assert_eq!(g.replace_all_uses_with_arg(c, Argument::Float(1.0)).unwrap(), 2);
        assert!(g.users(c).is_empty());
        assert_eq!(g.node(s).unwrap().args(), &[Argument::Node(x), Argument::Float(1.0)]);
        assert_eq!(g.node(out).unwrap().args(), &[Argument::Float(1.0), Argument::Node(s)]);
        g.erase_node(c).unwrap();
        assert_eq!(g.edge_count(), 2);
        g.lint().unwrap();
    }

    #[test]
    fn replace_uses_with_node_argument_delegates() {
        let (mut g, x, d, y) = chain();
        assert_eq!(g.replace_all_uses_with_arg(d, Argument::Node(x)).unwrap(), 1);
        assert_eq!(g.users(x), vec![d, y]);
        g.lint().unwrap();
    }

    #[test]
    fn replace_with_later_node_rejected() {
        let (mut g, x, d, y) = chain();
        // y does not precede d's user (y itself).
        let err = g.replace_all_uses_with(d, y).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRewrite { .. }));
        // Graph untouched.
        assert_eq!(g.users(d), vec![y]);
        assert_eq!(g.users(x), vec![d]);
        g.lint().unwrap();
    }

    #[test]
    fn erase_used_node_rejected() {
        let (mut g, _, d, _) = chain();
        assert!(matches!(
            g.erase_node(d),
            Err(CoreError::NodeHasUsers { users: 1, .. })
        ));
    }

    #[test]
    fn erase_missing_node_errors() {
        let (mut g, _, d, _) = chain();
        let x = g.placeholders()[0];
        g.replace_all_uses_with(d, x).unwrap();
        g.erase_node(d).unwrap();
        assert!(matches!(
            g.erase_node(d),
            Err(CoreError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn ids_stay_stable_after_erase() {
        let (mut g, x, d, y) = chain();
        g.replace_all_uses_with(d, x).unwrap();
        g.erase_node(d).unwrap();
        assert_eq!(g.node(y).unwrap().name, "y");
        assert_eq!(g.node_ids().collect::<Vec<_>>().len(), 3);
    }

    #[test]
    fn set_op_and_args() {
        let mut g = Graph::new();
        let x = g.placeholder("x").unwrap();
        let q = g
            .call_function("q", Function::TrueDiv, vec![x.into(), Argument::Float(4.0)])
            .unwrap();
        let old = g
            .set_op(q, NodeOp::CallFunction { function: Function::Mul })
            .unwrap();
        assert_eq!(old.function(), Some(Function::TrueDiv));
        g.set_args(q, vec![x.into(), Argument::Float(0.25)]).unwrap();
        assert_eq!(g.node(q).unwrap().args()[1], Argument::Float(0.25));
        g.lint().unwrap();
    }

    #[test]
    fn set_args_rejects_forward_reference() {
        let (mut g, x, d, y) = chain();
        let err = g.set_args(d, vec![y.into()]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert_eq!(g.node(d).unwrap().args(), &[Argument::Node(x)]);
    }

    #[test]
    fn set_op_cannot_touch_output() {
        let (mut g, _, _, _) = chain();
        let out = g.output_node().unwrap();
        assert!(g
            .set_op(out, NodeOp::Placeholder { index: 0 })
            .is_err());
    }

    #[test]
    fn kind_counts_by_kind() {
        let (g, _, _, _) = chain();
        let counts = g.kind_counts();
        assert_eq!(counts[&OpKind::CallModule], 2);
        assert_eq!(counts[&OpKind::Placeholder], 1);
        assert_eq!(counts[&OpKind::Output], 1);
    }

    #[test]
    fn display_prints_graph_order() {
        let (g, _, _, _) = chain();
        insta::assert_snapshot!(g.to_string().trim_end(), @r"
        graph():
            %x : placeholder[index=0]
            %d : call_module[target=drop](args = (%x,))
            %y : call_module[target=fc](args = (%d,))
            return (%y,)
        ");
    }

    #[test]
    fn serde_roundtrip_graph() {
        let (g, _, d, _) = chain();
        let json = serde_json::to_string(&g).unwrap();
        let back: Graph = serde_json::from_str(&json).unwrap();
        back.lint().unwrap();
        assert_eq!(back.to_string(), g.to_string());
        assert_eq!(back.node(d).unwrap().name, "d");
    }
}
