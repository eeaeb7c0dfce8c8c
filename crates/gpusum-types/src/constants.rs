//! Harness constants and defaults.

/// Default problem domain size: 16 Mi single-precision elements.
pub const DEFAULT_PROBLEM_SIZE: usize = 16 * 1024 * 1024;

/// Half-width of the summation window. The window spans `2 * R + 1` elements.
pub const WINDOW_RADIUS: usize = 20;

/// Number of elements in one window (41).
pub const WINDOW_LEN: usize = 2 * WINDOW_RADIUS + 1;

/// Default comparison tolerance, calibrated for single-precision
/// accumulation of 41 squared terms.
pub const DEFAULT_EPSILON: f32 = 5.0e-5;

/// Upper bound (exclusive) of generated input values.
pub const DEFAULT_INPUT_MAX: f32 = 10.0;

/// Seed for reproducible input generation.
pub const DEFAULT_SEED: u64 = 0x5EED_0041;

/// Conventional kernel source location.
pub const DEFAULT_KERNEL_PATH: &str = "kernels/sum.cl";

/// Kernel entry point name.
pub const KERNEL_ENTRY_POINT: &str = "sum";

/// Positional arguments of the entry point: input A, input B, output.
pub const KERNEL_ARG_COUNT: u32 = 3;

/// Build options passed verbatim to the compiler: warnings as errors,
/// fused multiply-add, relaxed IEEE conformance.
pub const DEFAULT_BUILD_OPTIONS: &str = "-Werror -cl-mad-enable -cl-fast-relaxed-math";
