//! Sequential windowed sum of squares.
//!
//! For inputs `a`, `b` of length `N` and radius `R`:
//!
//! ```text
//! out[i] = (1 / (2R + 1)) * Σ_{j=-R..R} ( a[c(i+j)]² + b[c(i+j)]² )
//! ```
//!
//! where `c` clamps an index into `[0, N-1]`. Terms are accumulated in the
//! same order the device kernel uses, `a` before `b` at each offset.

use gpusum_types::{HarnessError, HarnessResult};

/// Clamps a possibly out-of-range index into `[0, n-1]`.
///
/// `n` must be non-zero.
#[inline]
pub fn clamp_index(k: isize, n: usize) -> usize {
    debug_assert!(n > 0, "clamp_index on an empty sequence");
    if k < 0 {
        0
    } else if k as usize >= n {
        n - 1
    } else {
        k as usize
    }
}

/// Computes the windowed sum into a new vector.
pub fn windowed_sum(a: &[f32], b: &[f32], radius: usize) -> HarnessResult<Vec<f32>> {
    let mut out = vec![0.0; a.len()];
    windowed_sum_into(a, b, radius, &mut out)?;
    Ok(out)
}

/// Computes the windowed sum into `out`.
///
/// All three slices must have the same length. An empty input yields an
/// empty output.
pub fn windowed_sum_into(a: &[f32], b: &[f32], radius: usize, out: &mut [f32]) -> HarnessResult<()> {
    let n = a.len();
    if b.len() != n {
        return Err(HarnessError::SizeMismatch {
            expected: n,
            actual: b.len(),
        });
    }
    if out.len() != n {
        return Err(HarnessError::SizeMismatch {
            expected: n,
            actual: out.len(),
        });
    }

    let r = radius as isize;
    let scale = (2 * radius + 1) as f32;
    for (i, o) in out.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for j in -r..=r {
            let k = clamp_index(i as isize + j, n);
            acc += a[k] * a[k];
            acc += b[k] * b[k];
        }
        *o = acc / scale;
    }
    Ok(())
}
