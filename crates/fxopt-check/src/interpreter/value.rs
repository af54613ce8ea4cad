//! Runtime values for the graph interpreter.
//!
//! [`Tensor`] is a dense row-major `rows x cols` matrix of `f32`: one row
//! per example, one column per feature. [`Value`] is what flows between
//! nodes: a tensor, or a scalar constant lifted from a node argument.

use serde::{Deserialize, Serialize};

use fxopt_core::Argument;

use super::error::RuntimeError;

/// Dense row-major 2-D tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, RuntimeError> {
        if data.len() != rows * cols {
            return Err(RuntimeError::InvalidTensor {
                reason: format!("{} values for a {}x{} tensor", data.len(), rows, cols),
            });
        }
        Ok(Tensor { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Tensor {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Elementwise combination; `None` when shapes differ.
    pub fn zip_with(&self, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Option<Tensor> {
        if self.shape() != other.shape() {
            return None;
        }
        Some(Tensor {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Largest absolute elementwise difference; `None` when shapes differ.
    pub fn max_abs_diff(&self, other: &Tensor) -> Option<f32> {
        self.zip_with(other, |a, b| (a - b).abs())
            .map(|d| d.data.into_iter().fold(0.0f32, f32::max))
    }

    /// Column index of the largest value in each row.
    pub fn argmax_rows(&self) -> Vec<usize> {
        (0..self.rows)
            .map(|r| {
                self.row(r)
                    .iter()
                    .enumerate()
                    .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 {
                            (i, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}

/// A value produced or consumed by node evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Tensor(Tensor),
    Float(f64),
    Bool(bool),
}

impl Value {
    /// Lifts a constant argument. Node references are resolved by the
    /// interpreter, not here.
    pub fn from_constant(arg: &Argument) -> Option<Value> {
        match arg {
            Argument::Float(v) => Some(Value::Float(*v)),
            Argument::Bool(b) => Some(Value::Bool(*b)),
            Argument::Node(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Tensor(_) => "Tensor",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Bool",
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }
}
