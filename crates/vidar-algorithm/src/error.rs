use thiserror::Error;
use vidar::{VidarError, VidarShape};

#[derive(Error, Debug)]
pub enum AlgorithmError {
    #[error("Vidar error: {0}")]
    Vidar(#[from] VidarError),

    #[error("Labels must be a column vector with one row per sample, found a `{0}` matrix for {1} samples")]
    LabelShape(VidarShape, usize),

    #[error("Class labels must be greater than zero, found {0}")]
    NonPositiveLabels(f64),

    #[error("Class labels must be finite, found {0} NaN label(s) with range [{1}, {2}]")]
    NonFiniteLabels(f64, f64, f64),

    #[error("At least two classes are required, found {0}")]
    TooFewClasses(f64),

    #[error("Betas with {0} rows expect {0} or {1} feature columns, found {2}")]
    FeatureMismatch(usize, usize, usize),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[macro_export]
macro_rules! param_err {
    ($($arg:tt)*) => {
        Err($crate::error::AlgorithmError::InvalidParameter(format!($($arg)*)))
    };
}
