//! Lookup of passes by their command-line names.

use crate::div_to_mul::ChangeTrueDivToMulByInverse;
use crate::error::PassError;
use crate::fuse_batchnorm::FuseBatchNormInLinear;
use crate::remove_dropout::RemoveDropout;
use crate::transform::{Compose, Transformation};

/// Every registered pass name, in the order they are usually applied.
pub const PASS_NAMES: &[&str] = &["remove-dropout", "fuse-batchnorm", "div-to-mul"];

pub fn pass_by_name(name: &str) -> Result<Box<dyn Transformation>, PassError> {
    match name {
        "remove-dropout" => Ok(Box::new(RemoveDropout)),
        "fuse-batchnorm" => Ok(Box::new(FuseBatchNormInLinear)),
        "div-to-mul" => Ok(Box::new(ChangeTrueDivToMulByInverse)),
        _ => Err(PassError::UnknownPass {
            name: name.to_string(),
            expected: PASS_NAMES.join(", "),
        }),
    }
}

/// Builds a [`Compose`] applying the named passes in the given order.
pub fn compose_by_names<S: AsRef<str>>(names: &[S]) -> Result<Compose, PassError> {
    let passes = names
        .iter()
        .map(|n| pass_by_name(n.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Compose::new(passes))
}
