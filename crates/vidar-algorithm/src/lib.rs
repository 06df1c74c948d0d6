pub mod confusion;
pub mod error;
pub mod multi_log_reg;

pub use confusion::confusion_matrix;
pub use error::AlgorithmError;
pub use multi_log_reg::{
    MultiLogRegParams, multi_log_reg,
    predict::{Prediction, multi_log_reg_predict},
};
