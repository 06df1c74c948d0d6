use thiserror::Error;
use vidar_runtime::generic::runtime::VidarExecutionError;

#[derive(Error, Debug)]
pub enum CpuError {
    #[error("Failed to build the worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to downcast device type")]
    DeviceDowncast,

    #[error("Failed to downcast buffer type")]
    BufferDowncast,

    #[error("Plan slot `{0}` was read after it was freed")]
    FreedSlot(usize),

    #[error("`table` index ({0}, {1}) is outside of a {2}x{3} table")]
    TableIndexOutOfRange(f64, f64, usize, usize),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl From<CpuError> for VidarExecutionError {
    fn from(err: CpuError) -> Self {
        match err {
            CpuError::BufferDowncast | CpuError::DeviceDowncast => {
                VidarExecutionError::InappropriatePlan
            }
            err => VidarExecutionError::Generic(err.to_string()),
        }
    }
}
