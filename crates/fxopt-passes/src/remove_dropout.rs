//! Dropout removal.
//!
//! At inference time a dropout layer is the identity, so every single-input
//! call to one can be dropped: its users are rewired to its input and the
//! call node is erased. Once no remaining node calls the dropout's target,
//! the layer is detached from the sub-module tree.
//!
//! Only the single-argument call form is rewritten. Calls passing extra
//! arguments (for example an explicit training flag) are left as they are,
//! and so is the sub-module they call.

use fxopt_core::{split_target, Argument, GraphModule, NodeId};
use tracing::{debug, info};

use crate::error::PassError;
use crate::transform::Transformation;

const NAME: &str = "remove-dropout";

/// Removes single-input dropout calls and detaches unused dropout layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveDropout;

impl Transformation for RemoveDropout {
    fn name(&self) -> &'static str {
        NAME
    }

    fn preserves_computation(&self) -> bool {
        true
    }

    fn transform(&self, mut module: GraphModule) -> Result<GraphModule, PassError> {
        // Ids are stable, so a snapshot of the order stays valid while nodes
        // are erased behind it.
        let order: Vec<NodeId> = module.graph.node_ids().collect();
        let mut removed = 0usize;
        let mut detached = 0usize;

        for id in order {
            let Some(node) = module.graph.node(id) else {
                continue;
            };
            let Some(target) = node.target() else {
                continue;
            };
            let layer = &module.get_submodule(target).map_err(PassError::core(NAME))?.layer;
            if !layer.is_dropout() || node.args().len() != 1 {
                continue;
            }
            let input = node.args()[0];
            let name = node.name.clone();
            let target = target.to_string();

            let uses = module
                .graph
                .replace_all_uses_with_arg(id, input)
                .map_err(PassError::core(NAME))?;
            module.graph.erase_node(id).map_err(PassError::core(NAME))?;
            removed += 1;
            debug!(node = %name, target = %target, uses, "removed dropout call");

            if !module.is_called(&target) {
                let (parent, leaf) = split_target(&target);
                let parent_module = module.get_submodule_mut(parent).map_err(PassError::core(NAME))?;
                if parent_module.remove_child(leaf).map_err(PassError::core(NAME))?.is_some() {
                    detached += 1;
                    debug!(parent = %parent, leaf = %leaf, "detached dropout module");
                }
            }
        }

        info!(removed, detached, "remove-dropout finished");
        Ok(module)
    }
}
