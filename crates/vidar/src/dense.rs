use std::fmt;

use vidar_ir::ir::VidarShape;

use crate::error::VidarError;

/// Host copy of a computed matrix, row-major. Outlives the session it came
/// from.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    shape: VidarShape,
    data: Vec<f64>,
}

impl DenseMatrix {
    pub(crate) fn new(shape: VidarShape, data: Vec<f64>) -> Self {
        debug_assert_eq!(shape.len(), data.len());
        Self { shape, data }
    }

    pub fn shape(&self) -> VidarShape {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape.rows
    }

    pub fn cols(&self) -> usize {
        self.shape.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.shape.rows && col < self.shape.cols {
            Some(self.data[row * self.shape.cols + col])
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        let cols = self.shape.cols;
        self.data.get(row * cols..(row + 1) * cols)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn as_scalar(&self) -> Result<f64, VidarError> {
        if self.shape.is_scalar() {
            Ok(self.data[0])
        } else {
            Err(VidarError::NotAScalar(self.shape))
        }
    }
}

impl fmt::Display for DenseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} matrix", self.shape)?;
        for row in self.data.chunks(self.shape.cols) {
            let cells = row.iter().map(|v| format!("{v:.4}")).collect::<Vec<_>>();
            writeln!(f, "  [{}]", cells.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComputeResult {
    Matrix(DenseMatrix),
    Scalar(f64),
}

impl From<DenseMatrix> for ComputeResult {
    fn from(m: DenseMatrix) -> Self {
        if m.shape.is_scalar() {
            ComputeResult::Scalar(m.data[0])
        } else {
            ComputeResult::Matrix(m)
        }
    }
}

impl ComputeResult {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ComputeResult::Scalar(v) => Some(*v),
            ComputeResult::Matrix(_) => None,
        }
    }

    pub fn into_matrix(self) -> DenseMatrix {
        match self {
            ComputeResult::Matrix(m) => m,
            ComputeResult::Scalar(v) => DenseMatrix::new(VidarShape::SCALAR, vec![v]),
        }
    }
}
