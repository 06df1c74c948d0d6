//! Dense row-major kernels. Every kernel is expected to run inside the
//! device's rayon pool.

pub(crate) mod elementwise;
pub(crate) mod matmul;
pub(crate) mod reduce;
pub(crate) mod reshape;

// rows handed to a single rayon task for row-wise kernels
pub(crate) const MIN_ROWS_PER_TASK: usize = 64;
