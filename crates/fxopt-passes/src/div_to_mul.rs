//! Division by a constant rewritten as multiplication by its inverse.

use fxopt_core::{Argument, Function, GraphModule, NodeId, NodeOp};
use tracing::{debug, info};

use crate::error::PassError;
use crate::transform::Transformation;

const NAME: &str = "div-to-mul";

/// Turns `truediv(x, c)` into `mul(x, 1 / c)` for a finite non-zero float `c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeTrueDivToMulByInverse;

impl Transformation for ChangeTrueDivToMulByInverse {
    fn name(&self) -> &'static str {
        NAME
    }

    fn preserves_computation(&self) -> bool {
        true
    }

    fn transform(&self, mut module: GraphModule) -> Result<GraphModule, PassError> {
        let order: Vec<NodeId> = module.graph.node_ids().collect();
        let mut rewritten = 0usize;

        for id in order {
            let Some(node) = module.graph.node(id) else {
                continue;
            };
            if node.op().function() != Some(Function::TrueDiv) {
                continue;
            }
            let [numerator, Argument::Float(divisor)] = node.args() else {
                continue;
            };
            let inverse = 1.0 / *divisor;
            if *divisor == 0.0 || !inverse.is_finite() {
                continue;
            }
            let args = vec![*numerator, Argument::Float(inverse)];
            let name = node.name.clone();

            module
                .graph
                .set_op(id, NodeOp::CallFunction { function: Function::Mul })
                .map_err(PassError::core(NAME))?;
            module.graph.set_args(id, args).map_err(PassError::core(NAME))?;
            rewritten += 1;
            debug!(node = %name, inverse, "rewrote truediv as mul");
        }

        info!(rewritten, "div-to-mul finished");
        Ok(module)
    }
}
