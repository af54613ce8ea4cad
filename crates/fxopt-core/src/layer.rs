//! Layer payloads held by sub-modules.
//!
//! Parameters are stored as flat row-major `f32` buffers. Constructors that
//! take explicit parameters validate buffer lengths against the declared
//! shape and return [`CoreError::InvalidLayer`] on mismatch.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fully connected layer: `y = x W^T + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    /// Row-major `out_features x in_features`.
    pub weight: Vec<f32>,
    pub bias: Option<Vec<f32>>,
}

impl Linear {
    pub fn new(
        in_features: usize,
        out_features: usize,
        weight: Vec<f32>,
        bias: Option<Vec<f32>>,
    ) -> Result<Self, CoreError> {
        let linear = Linear {
            in_features,
            out_features,
            weight,
            bias,
        };
        linear.validate()?;
        Ok(linear)
    }

    /// Checks buffer lengths against the declared shape.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.weight.len() != self.in_features * self.out_features {
            return Err(CoreError::InvalidLayer {
                reason: format!(
                    "linear weight has {} values, expected {}x{}",
                    self.weight.len(),
                    self.out_features,
                    self.in_features
                ),
            });
        }
        if let Some(b) = &self.bias {
            if b.len() != self.out_features {
                return Err(CoreError::InvalidLayer {
                    reason: format!(
                        "linear bias has {} values, expected {}",
                        b.len(),
                        self.out_features
                    ),
                });
            }
        }
        Ok(())
    }

    /// Weight of output feature `row` for input feature `col`.
    pub fn weight_at(&self, row: usize, col: usize) -> f32 {
        self.weight[row * self.in_features + col]
    }
}

/// Batch normalization over features, evaluated with running statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm1d {
    pub num_features: usize,
    pub eps: f64,
    pub running_mean: Vec<f32>,
    pub running_var: Vec<f32>,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

impl BatchNorm1d {
    /// Identity statistics: mean 0, variance 1, unit scale, zero shift.
    pub fn new(num_features: usize) -> Self {
        BatchNorm1d {
            num_features,
            eps: 1e-5,
            running_mean: vec![0.0; num_features],
            running_var: vec![1.0; num_features],
            weight: vec![1.0; num_features],
            bias: vec![0.0; num_features],
        }
    }

    pub fn with_stats(
        eps: f64,
        running_mean: Vec<f32>,
        running_var: Vec<f32>,
        weight: Vec<f32>,
        bias: Vec<f32>,
    ) -> Result<Self, CoreError> {
        let bn = BatchNorm1d {
            num_features: running_mean.len(),
            eps,
            running_mean,
            running_var,
            weight,
            bias,
        };
        bn.validate()?;
        Ok(bn)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let n = self.num_features;
        if self.running_mean.len() != n
            || self.running_var.len() != n
            || self.weight.len() != n
            || self.bias.len() != n
        {
            return Err(CoreError::InvalidLayer {
                reason: format!(
                    "batchnorm over {} features has buffers: mean {}, var {}, weight {}, bias {}",
                    n,
                    self.running_mean.len(),
                    self.running_var.len(),
                    self.weight.len(),
                    self.bias.len()
                ),
            });
        }
        if self.running_var.iter().any(|v| *v < 0.0) {
            return Err(CoreError::InvalidLayer {
                reason: "batchnorm running variance must be non-negative".into(),
            });
        }
        Ok(())
    }

    /// Per-feature `(scale, shift)` such that `bn(x) = x * scale + shift`.
    pub fn affine(&self) -> Vec<(f64, f64)> {
        (0..self.num_features)
            .map(|i| {
                let inv_std = 1.0 / (self.running_var[i] as f64 + self.eps).sqrt();
                let scale = self.weight[i] as f64 * inv_std;
                let shift = self.bias[i] as f64 - self.running_mean[i] as f64 * scale;
                (scale, shift)
            })
            .collect()
    }
}

/// Normalization over the last dimension of each row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerNorm {
    pub normalized_shape: usize,
    pub eps: f64,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

impl LayerNorm {
    pub fn new(normalized_shape: usize) -> Self {
        LayerNorm {
            normalized_shape,
            eps: 1e-12,
            weight: vec![1.0; normalized_shape],
            bias: vec![0.0; normalized_shape],
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.weight.len() != self.normalized_shape || self.bias.len() != self.normalized_shape {
            return Err(CoreError::InvalidLayer {
                reason: format!(
                    "layernorm over {} features has weight {} and bias {}",
                    self.normalized_shape,
                    self.weight.len(),
                    self.bias.len()
                ),
            });
        }
        Ok(())
    }
}

/// What a sub-module is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Layer {
    /// Pure grouping node; not callable.
    Container,
    Linear(Linear),
    /// Identity at inference time. `p` is kept for reporting only.
    Dropout { p: f64 },
    BatchNorm1d(BatchNorm1d),
    LayerNorm(LayerNorm),
    Relu,
    Tanh,
}

impl Layer {
    /// Type name used in logs and printed hierarchies.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Layer::Container => "Container",
            Layer::Linear(_) => "Linear",
            Layer::Dropout { .. } => "Dropout",
            Layer::BatchNorm1d(_) => "BatchNorm1d",
            Layer::LayerNorm(_) => "LayerNorm",
            Layer::Relu => "ReLU",
            Layer::Tanh => "Tanh",
        }
    }

    pub fn is_dropout(&self) -> bool {
        matches!(self, Layer::Dropout { .. })
    }

    pub fn is_callable(&self) -> bool {
        !matches!(self, Layer::Container)
    }

    /// Checks parameter buffers against the declared shapes. Run by
    /// [`lint`] over the whole tree.
    ///
    /// [`lint`]: crate::GraphModule::lint
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Layer::Linear(l) => l.validate(),
            Layer::BatchNorm1d(bn) => bn.validate(),
            Layer::LayerNorm(ln) => ln.validate(),
            Layer::Container | Layer::Dropout { .. } | Layer::Relu | Layer::Tanh => Ok(()),
        }
    }

    /// Number of learnable parameters and buffers held directly by this layer.
    pub fn parameter_count(&self) -> usize {
        match self {
            Layer::Linear(l) => l.weight.len() + l.bias.as_ref().map_or(0, Vec::len),
            Layer::BatchNorm1d(bn) => 4 * bn.num_features,
            Layer::LayerNorm(ln) => 2 * ln.normalized_shape,
            Layer::Container | Layer::Dropout { .. } | Layer::Relu | Layer::Tanh => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_rejects_bad_weight_len() {
        let err = Linear::new(2, 3, vec![0.0; 5], None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidLayer { .. }));
    }

    #[test]
    fn linear_rejects_bad_bias_len() {
        let err = Linear::new(2, 2, vec![0.0; 4], Some(vec![0.0; 3])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidLayer { .. }));
    }

    #[test]
    fn linear_weight_at_is_row_major() {
        let l = Linear::new(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], None).unwrap();
        assert_eq!(l.weight_at(0, 2), 3.0);
        assert_eq!(l.weight_at(1, 0), 4.0);
    }

    #[test]
    fn identity_batchnorm_affine_is_near_identity() {
        let bn = BatchNorm1d::new(2);
        for (scale, shift) in bn.affine() {
            assert!((scale - 1.0).abs() < 1e-4);
            assert_eq!(shift, 0.0);
        }
    }

    #[test]
    fn batchnorm_affine_folds_stats() {
        let bn = BatchNorm1d::with_stats(0.0, vec![1.0], vec![4.0], vec![2.0], vec![0.5]).unwrap();
        let (scale, shift) = bn.affine()[0];
        // (x - 1) / 2 * 2 + 0.5 = x - 0.5
        assert!((scale - 1.0).abs() < 1e-12);
        assert!((shift + 0.5).abs() < 1e-12);
    }

    #[test]
    fn batchnorm_rejects_mismatched_buffers() {
        let err = BatchNorm1d::with_stats(1e-5, vec![0.0; 2], vec![1.0; 3], vec![1.0; 2], vec![0.0; 2])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidLayer { .. }));
    }

    #[test]
    fn validate_catches_edited_shapes() {
        let mut l = Linear::new(2, 2, vec![0.0; 4], None).unwrap();
        l.out_features = 3;
        assert!(matches!(
            Layer::Linear(l).validate(),
            Err(CoreError::InvalidLayer { .. })
        ));

        let mut bn = BatchNorm1d::new(2);
        bn.num_features = 3;
        assert!(Layer::BatchNorm1d(bn).validate().is_err());

        let mut ln = LayerNorm::new(4);
        ln.bias.pop();
        assert!(Layer::LayerNorm(ln).validate().is_err());

        assert!(Layer::Dropout { p: 0.1 }.validate().is_ok());
    }

    #[test]
    fn parameter_counts() {
        let l = Linear::new(4, 2, vec![0.0; 8], Some(vec![0.0; 2])).unwrap();
        assert_eq!(Layer::Linear(l).parameter_count(), 10);
        assert_eq!(Layer::Dropout { p: 0.1 }.parameter_count(), 0);
        assert_eq!(Layer::BatchNorm1d(BatchNorm1d::new(3)).parameter_count(), 12);
    }

    #[test]
    fn container_is_not_callable() {
        assert!(!Layer::Container.is_callable());
        assert!(Layer::Dropout { p: 0.5 }.is_callable());
        assert!(Layer::Dropout { p: 0.5 }.is_dropout());
    }
}
