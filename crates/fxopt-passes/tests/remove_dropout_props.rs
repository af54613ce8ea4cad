//! Property tests for dropout removal over randomly built graph modules.
//!
//! Graphs are built from a small step vocabulary: single-argument dropout
//! calls (each with its own layer), calls to one shared dropout layer, the
//! same shared layer called with an extra flag argument, relu, add, and a
//! shared 3x3 linear layer. Every step reads from nodes already built, so
//! any generated sequence is a valid graph.

use fxopt_check::random::{random_tensor, rng, uniform_values};
use fxopt_check::run_module;
use fxopt_core::{Argument, Function, Graph, GraphModule, Layer, Linear, NodeId, Submodule};
use fxopt_passes::{RemoveDropout, Transformation};
use proptest::prelude::*;

const WIDTH: usize = 3;

#[derive(Debug, Clone)]
enum Step {
    Dropout(usize),
    SharedDropout(usize),
    FlaggedDropout(usize),
    Relu(usize),
    Add(usize, usize),
    Linear(usize),
}

fn any_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..64usize).prop_map(Step::Dropout),
        (0..64usize).prop_map(Step::SharedDropout),
        (0..64usize).prop_map(Step::FlaggedDropout),
        plain_step(),
    ]
}

fn plain_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..64usize).prop_map(Step::Relu),
        (0..64usize, 0..64usize).prop_map(|(a, b)| Step::Add(a, b)),
        (0..64usize).prop_map(Step::Linear),
    ]
}

fn build(steps: &[Step]) -> GraphModule {
    let mut graph = Graph::new();
    let mut built: Vec<NodeId> = vec![graph.placeholder("x").unwrap()];
    let mut drops = Submodule::container();

    for (i, step) in steps.iter().enumerate() {
        let pick = |k: usize| Argument::Node(built[k % built.len()]);
        let name = format!("n{}", i);
        let id = match step {
            Step::Dropout(k) => {
                let target = format!("drops.{}", i);
                drops
                    .add_child(i.to_string(), Submodule::new(Layer::Dropout { p: 0.5 }))
                    .unwrap();
                graph.call_module(name, target, vec![pick(*k)])
            }
            Step::SharedDropout(k) => graph.call_module(name, "shared", vec![pick(*k)]),
            Step::FlaggedDropout(k) => {
                graph.call_module(name, "shared", vec![pick(*k), Argument::Bool(false)])
            }
            Step::Relu(k) => graph.call_function(name, Function::Relu, vec![pick(*k)]),
            Step::Add(a, b) => graph.call_function(name, Function::Add, vec![pick(*a), pick(*b)]),
            Step::Linear(k) => graph.call_module(name, "fc", vec![pick(*k)]),
        }
        .unwrap();
        built.push(id);
    }
    let last = *built.last().unwrap();
    graph.output(vec![last.into()]).unwrap();

    let mut weights = rng(7);
    let fc = Linear::new(
        WIDTH,
        WIDTH,
        uniform_values(&mut weights, WIDTH * WIDTH, 0.5),
        Some(uniform_values(&mut weights, WIDTH, 0.5)),
    )
    .unwrap();
    let root = Submodule::container()
        .with_child("drops", drops)
        .with_child("shared", Submodule::new(Layer::Dropout { p: 0.1 }))
        .with_child("fc", Submodule::new(Layer::Linear(fc)));
    GraphModule::new(graph, root)
}

fn single_arg_dropout_calls(module: &GraphModule) -> usize {
    module
        .graph
        .nodes()
        .filter(|(_, n)| n.args().len() == 1)
        .filter_map(|(_, n)| n.target())
        .filter(|t| module.get_submodule(t).unwrap().layer.is_dropout())
        .count()
}

proptest! {
    #[test]
    fn removes_every_single_argument_dropout(steps in prop::collection::vec(any_step(), 0..24)) {
        let module = build(&steps);
        let expected = single_arg_dropout_calls(&module);
        let before = module.graph.len();

        let module = RemoveDropout.apply(module, true).unwrap();
        prop_assert_eq!(single_arg_dropout_calls(&module), 0);
        prop_assert_eq!(module.graph.len(), before - expected);
        // Every dropout layer still in the tree is still called.
        for (path, sub) in module.root.named_modules() {
            if sub.layer.is_dropout() {
                prop_assert!(
                    path == "shared" || module.is_called(&path),
                    "orphaned dropout layer {}", path
                );
            }
        }
    }

    #[test]
    fn rewrite_is_idempotent(steps in prop::collection::vec(any_step(), 0..24)) {
        let once = RemoveDropout.apply(build(&steps), true).unwrap();
        let printed = once.to_string();
        let root = once.root.clone();
        let twice = RemoveDropout.apply(once, true).unwrap();
        prop_assert_eq!(twice.to_string(), printed);
        prop_assert_eq!(twice.root, root);
    }

    #[test]
    fn outputs_are_unchanged(
        steps in prop::collection::vec(any_step(), 0..24),
        seed in any::<u64>(),
    ) {
        let module = build(&steps);
        let inputs = [random_tensor(2, WIDTH, seed)];
        let expected = run_module(&module, &inputs).unwrap();

        let module = RemoveDropout.apply(module, true).unwrap();
        prop_assert_eq!(run_module(&module, &inputs).unwrap(), expected);
    }

    #[test]
    fn graphs_without_dropout_are_untouched(steps in prop::collection::vec(plain_step(), 0..24)) {
        let module = build(&steps);
        let printed = module.to_string();
        let root = module.root.clone();

        let module = RemoveDropout.apply(module, true).unwrap();
        prop_assert_eq!(module.to_string(), printed);
        prop_assert_eq!(module.root, root);
    }
}
