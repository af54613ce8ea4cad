//! GraphModule: a traced graph together with the sub-module tree it calls.
//!
//! This is the unit every rewrite pass consumes and returns. Module-call
//! nodes of [`Graph`] name their callee by dotted path into [`root`].
//!
//! [`root`]: GraphModule::root

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::graph::Graph;
use crate::module::Submodule;
use crate::ops::OpKind;

/// A graph-carrying module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphModule {
    pub graph: Graph,
    pub root: Submodule,
}

impl GraphModule {
    pub fn new(graph: Graph, root: Submodule) -> Self {
        GraphModule { graph, root }
    }

    /// Resolves a dotted target to its sub-module.
    pub fn get_submodule(&self, target: &str) -> Result<&Submodule, CoreError> {
        self.root
            .get(target)
            .ok_or_else(|| CoreError::SubmoduleNotFound {
                path: target.to_string(),
            })
    }

    pub fn get_submodule_mut(&mut self, target: &str) -> Result<&mut Submodule, CoreError> {
        self.root
            .get_mut(target)
            .ok_or_else(|| CoreError::SubmoduleNotFound {
                path: target.to_string(),
            })
    }

    /// Detaches the sub-module at `target`.
    ///
    /// Returns `Ok(false)` if it was already absent, so detaching twice is
    /// harmless. Errors only when the parent path does not resolve.
    pub fn delete_submodule(&mut self, target: &str) -> Result<bool, CoreError> {
        Ok(self.root.remove_child(target)?.is_some())
    }

    /// Whether any live node still calls `target`.
    pub fn is_called(&self, target: &str) -> bool {
        self.graph
            .nodes()
            .any(|(_, n)| n.target() == Some(target))
    }

    /// Graph invariants plus: every layer's buffers match its declared
    /// shape, and every module call resolves to a callable sub-module.
    pub fn lint(&self) -> Result<(), CoreError> {
        self.graph.lint()?;
        for (path, module) in self.root.named_modules() {
            module.layer.validate().map_err(|e| match e {
                CoreError::InvalidLayer { reason } => CoreError::InvalidLayer {
                    reason: format!("'{}': {}", path, reason),
                },
                other => other,
            })?;
        }
        for (_, node) in self.graph.nodes() {
            if let Some(target) = node.target() {
                let module = self.get_submodule(target)?;
                if !module.layer.is_callable() {
                    return Err(CoreError::GraphInconsistency {
                        reason: format!(
                            "node '{}' calls '{}', which is a {}",
                            node.name,
                            target,
                            module.layer.kind_name()
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of module-call nodes whose callee is a dropout layer.
    pub fn dropout_call_count(&self) -> usize {
        self.graph
            .nodes()
            .filter(|(_, n)| n.kind() == OpKind::CallModule)
            .filter_map(|(_, n)| n.target())
            .filter(|t| self.root.get(t).is_some_and(|m| m.layer.is_dropout()))
            .count()
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for GraphModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.graph)
    }
}
