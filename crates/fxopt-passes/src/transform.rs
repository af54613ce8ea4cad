//! The [`Transformation`] trait and sequential composition.
//!
//! A transformation takes a [`GraphModule`] by value and hands back the
//! rewritten module. [`Compose`] applies an ordered list of transformations,
//! each receiving the previous one's output, and stops at the first error.

use fxopt_core::GraphModule;
use tracing::info;

use crate::error::PassError;

/// A rewrite pass over graph modules.
pub trait Transformation {
    /// Registry name, e.g. `"remove-dropout"`.
    fn name(&self) -> &'static str;

    /// Whether the rewritten module computes the same outputs as its input
    /// (up to floating point rounding).
    fn preserves_computation(&self) -> bool {
        false
    }

    fn transform(&self, module: GraphModule) -> Result<GraphModule, PassError>;

    /// Runs [`transform`](Self::transform), then optionally lints the
    /// result.
    fn apply(&self, module: GraphModule, lint: bool) -> Result<GraphModule, PassError> {
        let module = self.transform(module)?;
        if lint {
            module.lint().map_err(|source| PassError::Lint {
                pass: self.name(),
                source,
            })?;
        }
        Ok(module)
    }
}

impl<T: Transformation + ?Sized> Transformation for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn preserves_computation(&self) -> bool {
        (**self).preserves_computation()
    }

    fn transform(&self, module: GraphModule) -> Result<GraphModule, PassError> {
        (**self).transform(module)
    }
}

/// Ordered sequence of transformations applied one after another.
#[derive(Default)]
pub struct Compose {
    passes: Vec<Box<dyn Transformation>>,
}

impl Compose {
    pub fn new(passes: Vec<Box<dyn Transformation>>) -> Self {
        Compose { passes }
    }

    /// Appends a pass to the end of the sequence.
    pub fn then(mut self, pass: impl Transformation + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

impl Transformation for Compose {
    fn name(&self) -> &'static str {
        "compose"
    }

    fn preserves_computation(&self) -> bool {
        self.passes.iter().all(|p| p.preserves_computation())
    }

    fn transform(&self, module: GraphModule) -> Result<GraphModule, PassError> {
        self.passes.iter().try_fold(module, |module, pass| {
            let before = module.graph.len();
            let module = pass.transform(module)?;
            info!(
                pass = pass.name(),
                nodes_before = before,
                nodes_after = module.graph.len(),
                "applied pass"
            );
            Ok(module)
        })
    }
}
