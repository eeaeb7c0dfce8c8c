//! Reproducible input generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gpusum_types::{HarnessError, HarnessResult};

/// The two kernel inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPair {
    pub a: Vec<f32>,
    pub b: Vec<f32>,
}

/// Generates two sequences of `n` values uniform in `[0, max)`.
///
/// The same seed always produces the same pair.
pub fn generate_inputs(n: usize, seed: u64, max: f32) -> HarnessResult<InputPair> {
    if !(max.is_finite() && max > 0.0) {
        return Err(HarnessError::InvalidConfig(format!(
            "input upper bound must be positive and finite, got {max}"
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = Vec::new();
    let mut b = Vec::new();
    for v in [&mut a, &mut b] {
        v.try_reserve_exact(n).map_err(|e| {
            HarnessError::AllocationFailure(format!("input of {n} elements: {e}"))
        })?;
    }
    a.extend((0..n).map(|_| rng.gen_range(0.0..max)));
    b.extend((0..n).map(|_| rng.gen_range(0.0..max)));
    Ok(InputPair { a, b })
}
