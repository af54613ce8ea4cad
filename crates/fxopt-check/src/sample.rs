//! A small question-answering encoder used as a fixture and CLI sample.
//!
//! The shape follows a BERT-style span-prediction model, scaled down:
//! embedding dropout, then per layer a feed-forward block
//! (`dense -> truediv -> gelu -> dense -> batchnorm -> dropout`) with a
//! residual add and layer norm, then a 2-logit `qa_outputs` head producing
//! start/end scores. Weights are seeded, so a config always yields the same
//! module.

use fxopt_core::{
    Argument, BatchNorm1d, CoreError, Function, Graph, GraphModule, Layer, LayerNorm, Linear,
    Submodule,
};
use rand_chacha::ChaCha8Rng;

use crate::random::{rng, uniform_values};

/// Parameters of the sample model.
#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub hidden: usize,
    pub intermediate: usize,
    pub layers: usize,
    pub dropout: f64,
    /// Insert a `BatchNorm1d` after each output projection.
    pub batch_norm: bool,
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        SampleConfig {
            hidden: 16,
            intermediate: 32,
            layers: 2,
            dropout: 0.1,
            batch_norm: true,
            seed: 42,
        }
    }
}

fn random_linear(rng: &mut ChaCha8Rng, in_features: usize, out_features: usize) -> Result<Linear, CoreError> {
    let scale = 1.0 / (in_features as f32).sqrt();
    let weight = uniform_values(rng, in_features * out_features, scale);
    let bias = uniform_values(rng, out_features, scale);
    Linear::new(in_features, out_features, weight, Some(bias))
}

fn random_batch_norm(rng: &mut ChaCha8Rng, features: usize) -> Result<BatchNorm1d, CoreError> {
    let mean = uniform_values(rng, features, 0.2);
    let var = uniform_values(rng, features, 0.5)
        .into_iter()
        .map(|v| 1.0 + v)
        .collect();
    let weight = uniform_values(rng, features, 0.2)
        .into_iter()
        .map(|v| 1.0 + v)
        .collect();
    let bias = uniform_values(rng, features, 0.1);
    BatchNorm1d::with_stats(1e-5, mean, var, weight, bias)
}

/// Builds the sample module. One placeholder (`input`, `rows x hidden`),
/// one output (`rows x 2`).
pub fn build_sample(config: &SampleConfig) -> Result<GraphModule, CoreError> {
    let mut rng = rng(config.seed);
    let mut graph = Graph::new();
    let dropout = || Submodule::new(Layer::Dropout { p: config.dropout });

    let input = graph.placeholder("input")?;
    let mut prev = graph.call_module("embeddings_dropout", "embeddings.dropout", vec![input.into()])?;

    let mut layers = Submodule::container();
    for l in 0..config.layers {
        let path = format!("encoder.layer.{}", l);
        let name = format!("layer_{}", l);

        let dense = graph.call_module(
            format!("{}_dense", name),
            format!("{}.intermediate.dense", path),
            vec![prev.into()],
        )?;
        let scaled = graph.call_function(
            format!("{}_scaled", name),
            Function::TrueDiv,
            vec![dense.into(), Argument::Float((config.intermediate as f64).sqrt())],
        )?;
        let act = graph.call_function(format!("{}_act", name), Function::Gelu, vec![scaled.into()])?;
        let mut out = graph.call_module(
            format!("{}_output", name),
            format!("{}.output.dense", path),
            vec![act.into()],
        )?;

        let mut output = Submodule::container().with_child(
            "dense",
            Submodule::new(Layer::Linear(random_linear(
                &mut rng,
                config.intermediate,
                config.hidden,
            )?)),
        );
        if config.batch_norm {
            out = graph.call_module(
                format!("{}_bn", name),
                format!("{}.output.bn", path),
                vec![out.into()],
            )?;
            output.add_child(
                "bn",
                Submodule::new(Layer::BatchNorm1d(random_batch_norm(&mut rng, config.hidden)?)),
            )?;
        }
        let drop = graph.call_module(
            format!("{}_dropout", name),
            format!("{}.output.dropout", path),
            vec![out.into()],
        )?;
        let residual = graph.call_function(
            format!("{}_residual", name),
            Function::Add,
            vec![drop.into(), prev.into()],
        )?;
        prev = graph.call_module(
            format!("{}_norm", name),
            format!("{}.output.layer_norm", path),
            vec![residual.into()],
        )?;

        output.add_child("dropout", dropout())?;
        output.add_child("layer_norm", Submodule::new(Layer::LayerNorm(LayerNorm::new(config.hidden))))?;
        let intermediate = Submodule::container().with_child(
            "dense",
            Submodule::new(Layer::Linear(random_linear(
                &mut rng,
                config.hidden,
                config.intermediate,
            )?)),
        );
        layers.add_child(
            l.to_string(),
            Submodule::container()
                .with_child("intermediate", intermediate)
                .with_child("output", output),
        )?;
    }

    let logits = graph.call_module("qa_outputs", "qa_outputs", vec![prev.into()])?;
    graph.output(vec![logits.into()])?;

    let root = Submodule::container()
        .with_child("embeddings", Submodule::container().with_child("dropout", dropout()))
        .with_child("encoder", Submodule::container().with_child("layer", layers))
        .with_child(
            "qa_outputs",
            Submodule::new(Layer::Linear(random_linear(&mut rng, config.hidden, 2)?)),
        );

    let module = GraphModule::new(graph, root);
    module.lint()?;
    Ok(module)
}
