//! Native work-item functions standing in for compiled device code.
//!
//! Each entry point is evaluated once per work item, in parallel, with no
//! shared state between items.

use gpusum_types::constants::{WINDOW_LEN, WINDOW_RADIUS};

/// Computes one output element: `work_item(gid, global_size, inputs)`.
///
/// `inputs` holds the buffers bound to the kernel's input slots, in the
/// order of [`NativeKernel::inputs`], each at least `global_size` long.
pub(crate) type WorkItemFn = fn(usize, usize, &[&[f32]]) -> f32;

/// A kernel entry point the emulated device can execute.
#[derive(Debug)]
pub(crate) struct NativeKernel {
    pub name: &'static str,
    /// Number of positional parameters.
    pub params: u32,
    /// Index of the single output buffer parameter.
    pub output: u32,
    /// Indices of buffer parameters that are read, in the order the work
    /// item receives them.
    pub inputs: &'static [u32],
    pub work_item: WorkItemFn,
}

static NATIVE_KERNELS: &[NativeKernel] = &[NativeKernel {
    name: "sum",
    params: 3,
    output: 2,
    inputs: &[0, 1],
    work_item: windowed_sum_item,
}];

/// Looks up a native implementation by entry-point name.
pub(crate) fn native_kernel(name: &str) -> Option<&'static NativeKernel> {
    NATIVE_KERNELS.iter().find(|k| k.name == name)
}

/// `sum` entry point. Accumulates with fused multiply-add and scales by a
/// precomputed reciprocal, as `-cl-mad-enable -cl-fast-relaxed-math` allows.
fn windowed_sum_item(gid: usize, global_size: usize, inputs: &[&[f32]]) -> f32 {
    let (a, b) = (inputs[0], inputs[1]);
    let last = global_size as isize - 1;
    let radius = WINDOW_RADIUS as isize;

    let mut acc = 0.0f32;
    for j in -radius..=radius {
        let k = (gid as isize + j).clamp(0, last) as usize;
        let x = a[k];
        let y = b[k];
        acc = x.mul_add(x, acc);
        acc = y.mul_add(y, acc);
    }
    acc * (1.0 / WINDOW_LEN as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_is_registered() {
        let k = native_kernel("sum").unwrap();
        assert_eq!(k.params, 3);
        assert_eq!(k.output, 2);
        assert!(native_kernel("missing").is_none());
    }

    #[test]
    fn single_element_domain_clamps_everything_to_zero() {
        let a = [2.0f32];
        let b = [1.0f32];
        let v = windowed_sum_item(0, 1, &[&a[..], &b[..]]);
        // 41 * (4 + 1) / 41
        assert!((v - 5.0).abs() < 1e-5);
    }
}
