//! Rewrite passes over fxopt graph modules.
//!
//! Every pass implements [`Transformation`]: it takes a [`GraphModule`] by
//! value and returns the rewritten module. Passes are chained with
//! [`Compose`] or looked up by name through [`pass_by_name`].
//!
//! [`GraphModule`]: fxopt_core::GraphModule

pub mod div_to_mul;
pub mod error;
pub mod fuse_batchnorm;
pub mod registry;
pub mod remove_dropout;
pub mod transform;

pub use div_to_mul::ChangeTrueDivToMulByInverse;
pub use error::PassError;
pub use fuse_batchnorm::FuseBatchNormInLinear;
pub use registry::{compose_by_names, pass_by_name, PASS_NAMES};
pub use remove_dropout::RemoveDropout;
pub use transform::{Compose, Transformation};
