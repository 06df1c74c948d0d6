use thiserror::Error;
use vidar_cpu::CpuError;
use vidar_ir::{
    ir::VidarShape,
    util::error::{IRError, ShapeError},
};
use vidar_runtime::generic::{
    array::VidarArrayError, device::DeviceError, runtime::VidarExecutionError,
};

#[derive(Error, Debug)]
pub enum VidarError {
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Execution error: {0}")]
    Execution(#[from] VidarExecutionError),

    #[error("Array error: {0}")]
    Array(#[from] VidarArrayError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("IR error: {0}")]
    IR(#[from] IRError),

    #[error("CPU backend error: {0}")]
    Backend(#[from] CpuError),

    #[error("The session this matrix belongs to has been closed")]
    SessionClosed,

    #[error("Matrices from different sessions cannot be combined")]
    ContextMismatch,

    #[error("Expected a 1x1 result, found a `{0}` matrix")]
    NotAScalar(VidarShape),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Backend returned {1} result(s) for {0} requested output(s)")]
    ResultCount(usize, usize),
}

#[macro_export]
macro_rules! config_err {
    ($($arg:tt)*) => {
        Err($crate::error::VidarError::Config(format!($($arg)*)))
    };
}
