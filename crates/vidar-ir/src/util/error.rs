use thiserror::Error;

use crate::{
    graph::NodeId,
    ir::{VidarBinOp, VidarShape},
};

#[derive(Error, Debug)]
pub enum IRError {
    #[error("IR IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IR serialization error: {0}")]
    Serialization(String),

    #[error("IR deserialization error: {0}")]
    Deserialization(String),

    #[error("IR validation error: {0}")]
    Validation(String),

    #[error("Error during multiple IR passes:\n{0}")]
    MultiPass(#[from] MultiPassError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Cannot multiply a `{0}` matrix with a `{1}` matrix")]
    MatMul(VidarShape, VidarShape),

    #[error("Operands of `{0:?}` have incompatible shapes `{1}` and `{2}`")]
    Broadcast(VidarBinOp, VidarShape, VidarShape),

    #[error("Cannot cbind a `{0}` matrix with a `{1}` matrix, row counts differ")]
    Cbind(VidarShape, VidarShape),

    #[error("Slice rows {0:?} cols {1:?} is out of bounds for a `{2}` matrix")]
    SliceOutOfBounds((usize, usize), (usize, usize), VidarShape),

    #[error("Expected a column vector for `{0}`, instead found a `{1}` matrix")]
    NotAColumnVector(&'static str, VidarShape),

    #[error("Index columns for `table` have different lengths `{0}` and `{1}`")]
    TableLengthMismatch(usize, usize),

    #[error("`{0}` would produce an empty matrix")]
    Empty(&'static str),

    #[error("Sequence {0}..={1} is empty")]
    EmptySeq(i64, i64),

    #[error("`{0}` expects {1} input(s), received {2}")]
    Arity(&'static str, usize, usize),

    #[error("Node `{0}` references node `{1}` which is not defined before it")]
    DanglingInput(NodeId, NodeId),

    #[error("Node `{0}` records shape `{1}` but its inputs produce `{2}`")]
    RecordedShapeMismatch(NodeId, VidarShape, VidarShape),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrunePassError {
    #[error("Requested output node `{0}` does not exist in a graph of {1} nodes")]
    UnknownOutput(NodeId, usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstFoldPassError {
    #[error("Folding `{0}` produced a shape mismatch: {1}")]
    Shape(&'static str, ShapeError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MultiPassError {
    #[error("Graph shape check failed:\n{0}")]
    Shape(ShapeError),

    #[error("Failed during the prune pass: {0}")]
    Prune(PrunePassError),

    #[error("Failed during the constant folding pass: {0}")]
    ConstFold(ConstFoldPassError),
}

#[macro_export]
macro_rules! ir_validation_err {
    ($($arg:tt)*) => {
        Err($crate::util::error::IRError::Validation(format!($($arg)*)))
    };
}
