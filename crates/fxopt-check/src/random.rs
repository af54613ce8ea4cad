//! Seeded random tensors and parameters.
//!
//! All randomness goes through `ChaCha8Rng` so a seed reproduces the same
//! inputs and weights on every platform.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::interpreter::Tensor;

pub fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// `len` values drawn uniformly from `[-scale, scale)`.
pub fn uniform_values(rng: &mut ChaCha8Rng, len: usize, scale: f32) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-scale..scale)).collect()
}

/// A `rows x cols` tensor of values in `[-1, 1)`.
pub fn random_tensor(rows: usize, cols: usize, seed: u64) -> Tensor {
    let mut rng = rng(seed);
    Tensor {
        rows,
        cols,
        data: uniform_values(&mut rng, rows * cols, 1.0),
    }
}
