//! Sessions and lazy matrix handles.
//!
//! A [`VidarContext`] ingests host data into [`Matrix`] handles. Operations on
//! handles only record an expression; `compute` lowers the expression into an
//! operation graph and runs it on the session's backend.

pub mod config;
pub mod context;
pub mod dense;
pub mod error;
pub mod matrix;

pub use config::VidarConfig;
pub use context::{SessionStats, VidarContext};
pub use dense::{ComputeResult, DenseMatrix};
pub use error::VidarError;
pub use matrix::{Compute, Matrix, Operand, materialize_many};
pub use vidar_ir::{io::VidarIRData, ir::VidarShape};
