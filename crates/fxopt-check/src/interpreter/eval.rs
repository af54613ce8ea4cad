//! Per-node evaluation for the graph interpreter.
//!
//! [`eval_layer`] runs a module call against its resolved [`Layer`] and
//! [`eval_function`] runs a builtin. Both see already-resolved argument
//! values; graph walking and placeholder/output handling live in
//! `state.rs`. Layers are always evaluated in inference mode.

use fxopt_core::{BatchNorm1d, Function, Layer, LayerNorm, Linear};

use super::error::RuntimeError;
use super::value::{Tensor, Value};

/// Evaluates a module call.
pub fn eval_layer(
    node: &str,
    target: &str,
    layer: &Layer,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match layer {
        Layer::Container => Err(RuntimeError::NotCallable {
            node: node.to_string(),
            target: target.to_string(),
            kind: layer.kind_name().to_string(),
        }),
        // Inference mode: identity on the input, any extra arguments ignored.
        Layer::Dropout { .. } => {
            if args.is_empty() {
                return Err(RuntimeError::ArityMismatch {
                    node: node.to_string(),
                    expected: 1,
                    got: 0,
                });
            }
            Ok(Value::Tensor(tensor_arg(node, args, 0)?.clone()))
        }
        Layer::Linear(linear) => {
            let x = single_tensor(node, args)?;
            Ok(Value::Tensor(linear_forward(node, linear, x)?))
        }
        Layer::BatchNorm1d(bn) => {
            let x = single_tensor(node, args)?;
            Ok(Value::Tensor(batch_norm_forward(node, bn, x)?))
        }
        Layer::LayerNorm(ln) => {
            let x = single_tensor(node, args)?;
            Ok(Value::Tensor(layer_norm_forward(node, ln, x)?))
        }
        Layer::Relu => Ok(Value::Tensor(single_tensor(node, args)?.map(relu))),
        Layer::Tanh => Ok(Value::Tensor(single_tensor(node, args)?.map(f32::tanh))),
    }
}

/// Evaluates a builtin function call.
pub fn eval_function(node: &str, function: Function, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != function.arity() {
        return Err(RuntimeError::ArityMismatch {
            node: node.to_string(),
            expected: function.arity(),
            got: args.len(),
        });
    }
    match function {
        Function::Add => binary(node, args, |a, b| a + b),
        Function::Sub => binary(node, args, |a, b| a - b),
        Function::Mul => binary(node, args, |a, b| a * b),
        Function::TrueDiv => binary(node, args, |a, b| a / b),
        Function::Relu => Ok(Value::Tensor(tensor_arg(node, args, 0)?.map(relu))),
        Function::Tanh => Ok(Value::Tensor(tensor_arg(node, args, 0)?.map(f32::tanh))),
        Function::Gelu => Ok(Value::Tensor(tensor_arg(node, args, 0)?.map(gelu))),
    }
}

fn relu(v: f32) -> f32 {
    v.max(0.0)
}

fn gelu(v: f32) -> f32 {
    let c = (2.0f32 / std::f32::consts::PI).sqrt();
    0.5 * v * (1.0 + (c * (v + 0.044715 * v * v * v)).tanh())
}

fn tensor_arg<'a>(node: &str, args: &'a [Value], position: usize) -> Result<&'a Tensor, RuntimeError> {
    match args.get(position) {
        Some(Value::Tensor(t)) => Ok(t),
        Some(other) => Err(RuntimeError::BadArgument {
            node: node.to_string(),
            position,
            expected: "Tensor".into(),
            got: other.type_name().into(),
        }),
        None => Err(RuntimeError::ArityMismatch {
            node: node.to_string(),
            expected: position + 1,
            got: args.len(),
        }),
    }
}

fn single_tensor<'a>(node: &str, args: &'a [Value]) -> Result<&'a Tensor, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::ArityMismatch {
            node: node.to_string(),
            expected: 1,
            got: args.len(),
        });
    }
    tensor_arg(node, args, 0)
}

/// Elementwise binary op with scalar broadcasting.
fn binary(node: &str, args: &[Value], f: impl Fn(f32, f32) -> f32) -> Result<Value, RuntimeError> {
    match (&args[0], &args[1]) {
        (Value::Tensor(a), Value::Tensor(b)) => a
            .zip_with(b, f)
            .map(Value::Tensor)
            .ok_or_else(|| RuntimeError::ShapeMismatch {
                node: node.to_string(),
                reason: format!("{:?} vs {:?}", a.shape(), b.shape()),
            }),
        (Value::Tensor(a), Value::Float(s)) => {
            let s = *s as f32;
            Ok(Value::Tensor(a.map(|v| f(v, s))))
        }
        (Value::Float(s), Value::Tensor(b)) => {
            let s = *s as f32;
            Ok(Value::Tensor(b.map(|v| f(s, v))))
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(f(*a as f32, *b as f32) as f64)),
        (Value::Bool(_), _) => Err(RuntimeError::BadArgument {
            node: node.to_string(),
            position: 0,
            expected: "Tensor or Float".into(),
            got: "Bool".into(),
        }),
        (_, Value::Bool(_)) => Err(RuntimeError::BadArgument {
            node: node.to_string(),
            position: 1,
            expected: "Tensor or Float".into(),
            got: "Bool".into(),
        }),
    }
}

fn linear_forward(node: &str, linear: &Linear, x: &Tensor) -> Result<Tensor, RuntimeError> {
    if x.cols != linear.in_features {
        return Err(RuntimeError::ShapeMismatch {
            node: node.to_string(),
            reason: format!(
                "linear expects {} input features, got {}",
                linear.in_features, x.cols
            ),
        });
    }
    let mut out = Tensor::zeros(x.rows, linear.out_features);
    for r in 0..x.rows {
        let row = x.row(r);
        for o in 0..linear.out_features {
            let w = &linear.weight[o * linear.in_features..(o + 1) * linear.in_features];
            let mut acc: f32 = row.iter().zip(w).map(|(a, b)| a * b).sum();
            if let Some(bias) = &linear.bias {
                acc += bias[o];
            }
            out.data[r * linear.out_features + o] = acc;
        }
    }
    Ok(out)
}

fn batch_norm_forward(node: &str, bn: &BatchNorm1d, x: &Tensor) -> Result<Tensor, RuntimeError> {
    if x.cols != bn.num_features {
        return Err(RuntimeError::ShapeMismatch {
            node: node.to_string(),
            reason: format!("batchnorm expects {} features, got {}", bn.num_features, x.cols),
        });
    }
    let mut out = x.clone();
    for r in 0..x.rows {
        for c in 0..x.cols {
            let v = x.get(r, c) as f64;
            let norm = (v - bn.running_mean[c] as f64) / (bn.running_var[c] as f64 + bn.eps).sqrt();
            out.data[r * x.cols + c] = (norm * bn.weight[c] as f64 + bn.bias[c] as f64) as f32;
        }
    }
    Ok(out)
}

fn layer_norm_forward(node: &str, ln: &LayerNorm, x: &Tensor) -> Result<Tensor, RuntimeError> {
    if x.cols != ln.normalized_shape {
        return Err(RuntimeError::ShapeMismatch {
            node: node.to_string(),
            reason: format!(
                "layernorm expects {} features, got {}",
                ln.normalized_shape, x.cols
            ),
        });
    }
    let mut out = x.clone();
    let n = x.cols as f64;
    for r in 0..x.rows {
        let row = x.row(r);
        let mean = row.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = row.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        let inv_std = 1.0 / (var + ln.eps).sqrt();
        for c in 0..x.cols {
            let norm = (row[c] as f64 - mean) * inv_std;
            out.data[r * x.cols + c] = (norm * ln.weight[c] as f64 + ln.bias[c] as f64) as f32;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(rows: usize, cols: usize, data: &[f32]) -> Value {
        Value::Tensor(Tensor::from_vec(rows, cols, data.to_vec()).unwrap())
    }

    #[test]
    fn dropout_is_identity() {
        let x = t(1, 3, &[1.0, -2.0, 3.0]);
        let out = eval_layer("d", "drop", &Layer::Dropout { p: 0.9 }, &[x.clone()]).unwrap();
        assert_eq!(out, x);
    }

    #[test]
    fn dropout_ignores_extra_arguments() {
        let x = t(1, 2, &[1.0, 2.0]);
        let out = eval_layer(
            "d",
            "drop",
            &Layer::Dropout { p: 0.5 },
            &[x.clone(), Value::Bool(false)],
        )
        .unwrap();
        assert_eq!(out, x);
    }

    #[test]
    fn linear_forward_matches_hand_computation() {
        // W = [[1, 2], [3, 4], [5, 6]], b = [0.5, 0, -1]
        let linear = Linear::new(
            2,
            3,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            Some(vec![0.5, 0.0, -1.0]),
        )
        .unwrap();
        let out = eval_layer("y", "fc", &Layer::Linear(linear), &[t(1, 2, &[1.0, 1.0])]).unwrap();
        assert_eq!(out, t(1, 3, &[3.5, 7.0, 10.0]));
    }

    #[test]
    fn linear_shape_mismatch() {
        let linear = Linear::new(3, 1, vec![1.0; 3], None).unwrap();
        let err = eval_layer("y", "fc", &Layer::Linear(linear), &[t(1, 2, &[1.0, 1.0])]).unwrap_err();
        assert!(matches!(err, RuntimeError::ShapeMismatch { .. }));
    }

    #[test]
    fn container_not_callable() {
        let err = eval_layer("c", "block", &Layer::Container, &[t(1, 1, &[0.0])]).unwrap_err();
        assert!(matches!(err, RuntimeError::NotCallable { .. }));
    }

    #[test]
    fn layer_norm_zero_mean_unit_var() {
        let out = eval_layer(
            "n",
            "norm",
            &Layer::LayerNorm(LayerNorm::new(2)),
            &[t(1, 2, &[1.0, 3.0])],
        )
        .unwrap();
        let out = out.as_tensor().unwrap();
        assert!((out.get(0, 0) + 1.0).abs() < 1e-5);
        assert!((out.get(0, 1) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn batch_norm_uses_running_stats() {
        let bn = BatchNorm1d::with_stats(0.0, vec![1.0], vec![4.0], vec![2.0], vec![0.5]).unwrap();
        let out = eval_layer("b", "bn", &Layer::BatchNorm1d(bn), &[t(2, 1, &[3.0, 1.0])]).unwrap();
        assert_eq!(out, t(2, 1, &[2.5, 0.5]));
    }

    #[test]
    fn binary_broadcasts_scalars() {
        let x = t(1, 2, &[2.0, 4.0]);
        let out = eval_function("q", Function::TrueDiv, &[x.clone(), Value::Float(2.0)]).unwrap();
        assert_eq!(out, t(1, 2, &[1.0, 2.0]));
        let out = eval_function("s", Function::Sub, &[Value::Float(1.0), x]).unwrap();
        assert_eq!(out, t(1, 2, &[-1.0, -3.0]));
    }

    #[test]
    fn binary_shape_mismatch() {
        let err = eval_function(
            "a",
            Function::Add,
            &[t(1, 2, &[0.0, 0.0]), t(2, 1, &[0.0, 0.0])],
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::ShapeMismatch { .. }));
    }

    #[test]
    fn function_arity_checked() {
        let err = eval_function("r", Function::Relu, &[]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ArityMismatch {
                expected: 1,
                got: 0,
                ..
            }
        ));
    }

    #[test]
    fn gelu_fixed_points() {
        assert_eq!(gelu(0.0), 0.0);
        assert!((gelu(10.0) - 10.0).abs() < 1e-4);
        assert!(gelu(-10.0).abs() < 1e-4);
    }
}
