//! Batch-norm folding into a preceding linear layer.
//!
//! In inference mode `BatchNorm1d` is a per-feature affine map
//! `x * scale + shift`, so `bn(linear(x))` equals a single linear layer with
//! row `r` of the weight multiplied by `scale[r]` and bias
//! `b[r] * scale[r] + shift[r]`.

use fxopt_core::{Argument, GraphModule, Layer, Linear, NodeId};
use tracing::{debug, info};

use crate::error::PassError;
use crate::transform::Transformation;

const NAME: &str = "fuse-batchnorm";

/// Folds `BatchNorm1d` calls into the `Linear` call feeding them.
///
/// A pair is folded only when the batch norm is the linear node's single
/// user, the linear sub-module is called from nowhere else, and the feature
/// counts agree.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuseBatchNormInLinear;

/// A foldable `(linear, batchnorm)` call pair.
struct Candidate {
    linear_node: NodeId,
    linear_target: String,
    bn_target: String,
    folded: Linear,
}

impl FuseBatchNormInLinear {
    fn candidate(module: &GraphModule, id: NodeId) -> Result<Option<Candidate>, PassError> {
        let Some(node) = module.graph.node(id) else {
            return Ok(None);
        };
        let Some(bn_target) = node.target() else {
            return Ok(None);
        };
        let Layer::BatchNorm1d(bn) = &module.get_submodule(bn_target).map_err(PassError::core(NAME))?.layer else {
            return Ok(None);
        };
        let [Argument::Node(producer)] = node.args() else {
            return Ok(None);
        };
        let producer = *producer;
        let Some(linear_target) = module.graph.node(producer).and_then(|n| n.target()) else {
            return Ok(None);
        };
        let Layer::Linear(linear) = &module.get_submodule(linear_target).map_err(PassError::core(NAME))?.layer else {
            return Ok(None);
        };
        if linear.out_features != bn.num_features || module.graph.users(producer) != [id] {
            return Ok(None);
        }
        let calls = module
            .graph
            .nodes()
            .filter(|(_, n)| n.target() == Some(linear_target))
            .count();
        if calls != 1 {
            return Ok(None);
        }

        Ok(Some(Candidate {
            linear_node: producer,
            linear_target: linear_target.to_string(),
            bn_target: bn_target.to_string(),
            folded: fold(linear, &bn.affine()),
        }))
    }
}

/// Applies per-output-feature `(scale, shift)` to a linear layer.
fn fold(linear: &Linear, affine: &[(f64, f64)]) -> Linear {
    let mut weight = linear.weight.clone();
    let mut bias = Vec::with_capacity(linear.out_features);
    for (row, &(scale, shift)) in affine.iter().enumerate() {
        let start = row * linear.in_features;
        for w in &mut weight[start..start + linear.in_features] {
            *w = (*w as f64 * scale) as f32;
        }
        let b = linear.bias.as_ref().map_or(0.0, |b| b[row] as f64);
        bias.push((b * scale + shift) as f32);
    }
    Linear {
        in_features: linear.in_features,
        out_features: linear.out_features,
        weight,
        bias: Some(bias),
    }
}

impl Transformation for FuseBatchNormInLinear {
    fn name(&self) -> &'static str {
        NAME
    }

    fn preserves_computation(&self) -> bool {
        true
    }

    fn transform(&self, mut module: GraphModule) -> Result<GraphModule, PassError> {
        let order: Vec<NodeId> = module.graph.node_ids().collect();
        let mut fused = 0usize;

        for id in order {
            let Some(c) = Self::candidate(&module, id)? else {
                continue;
            };
            module
                .get_submodule_mut(&c.linear_target)
                .map_err(PassError::core(NAME))?
                .layer = Layer::Linear(c.folded);
            module
                .graph
                .replace_all_uses_with(id, c.linear_node)
                .map_err(PassError::core(NAME))?;
            module.graph.erase_node(id).map_err(PassError::core(NAME))?;
            if !module.is_called(&c.bn_target) {
                module
                    .delete_submodule(&c.bn_target)
                    .map_err(PassError::core(NAME))?;
            }
            fused += 1;
            debug!(linear = %c.linear_target, batchnorm = %c.bn_target, "folded batchnorm");
        }

        info!(fused, "fuse-batchnorm finished");
        Ok(module)
    }
}
