use std::{
    fmt,
    ops::Range,
    sync::{Arc, Weak},
};

use vidar_ir::{
    ir::{VidarAggOp, VidarBinOp, VidarOp, VidarShape, VidarUnOp},
    util::shape::infer_shape,
};
use vidar_runtime::generic::array::VidarBuffer;

use crate::{context::ContextInner, dense::DenseMatrix, error::VidarError};

pub(crate) mod lower;
mod ops;

use lower::Lowered;

pub(crate) struct ExprNode {
    pub(crate) op: VidarOp,
    pub(crate) inputs: Vec<Arc<ExprNode>>,
    pub(crate) shape: VidarShape,
    // set for `Input` nodes only
    pub(crate) data: Option<VidarBuffer>,
}

// Unlinks uniquely owned inputs one at a time so that dropping a long chain
// does not recurse once per level.
impl Drop for ExprNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.inputs);
        while let Some(node) = pending.pop() {
            if let Some(mut inner) = Arc::into_inner(node) {
                pending.append(&mut inner.inputs);
            }
        }
    }
}

/// Lazy handle to a matrix expression.
///
/// Cloning is cheap. Nothing is evaluated until [`Matrix::compute`],
/// [`Matrix::materialize`] or one of the session level compute calls.
#[derive(Clone)]
pub struct Matrix {
    pub(crate) ctx: Weak<ContextInner>,
    pub(crate) node: Arc<ExprNode>,
}

/// Right hand side of element-wise operations.
#[derive(Clone)]
pub enum Operand {
    Matrix(Matrix),
    Scalar(f64),
}

impl From<&Matrix> for Operand {
    fn from(m: &Matrix) -> Self {
        Operand::Matrix(m.clone())
    }
}

impl From<Matrix> for Operand {
    fn from(m: Matrix) -> Self {
        Operand::Matrix(m)
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("op", &self.node.op.name())
            .field("shape", &self.node.shape)
            .finish()
    }
}

impl Matrix {
    pub(crate) fn input(ctx: Weak<ContextInner>, array: u64, buffer: VidarBuffer) -> Self {
        let shape = buffer.shape();
        Self {
            ctx,
            node: Arc::new(ExprNode {
                op: VidarOp::Input { array, shape },
                inputs: vec![],
                shape,
                data: Some(buffer),
            }),
        }
    }

    pub(crate) fn leaf(ctx: Weak<ContextInner>, op: VidarOp, shape: VidarShape) -> Self {
        Self {
            ctx,
            node: Arc::new(ExprNode {
                op,
                inputs: vec![],
                shape,
                data: None,
            }),
        }
    }

    pub(crate) fn check_context(&self, ctx: &Arc<ContextInner>) -> Result<(), VidarError> {
        if std::ptr::eq(self.ctx.as_ptr(), Arc::as_ptr(ctx)) {
            Ok(())
        } else {
            Err(VidarError::ContextMismatch)
        }
    }

    // node whose shape is already known to be valid
    fn unchecked(&self, op: VidarOp, inputs: Vec<Arc<ExprNode>>, shape: VidarShape) -> Matrix {
        Matrix {
            ctx: self.ctx.clone(),
            node: Arc::new(ExprNode {
                op,
                inputs,
                shape,
                data: None,
            }),
        }
    }

    fn derive(&self, op: VidarOp, others: &[&Matrix]) -> Result<Matrix, VidarError> {
        let mut shapes = Vec::with_capacity(others.len() + 1);
        let mut inputs = Vec::with_capacity(others.len() + 1);
        shapes.push(self.shape());
        inputs.push(self.node.clone());

        for other in others {
            if !Weak::ptr_eq(&self.ctx, &other.ctx) {
                return Err(VidarError::ContextMismatch);
            }
            shapes.push(other.shape());
            inputs.push(other.node.clone());
        }

        let shape = infer_shape(&op, &shapes)?;
        Ok(self.unchecked(op, inputs, shape))
    }

    fn map(&self, op: VidarUnOp) -> Matrix {
        self.unchecked(VidarOp::Unary(op), vec![self.node.clone()], self.shape())
    }

    fn agg(&self, op: VidarAggOp) -> Matrix {
        self.unchecked(
            VidarOp::Agg(op),
            vec![self.node.clone()],
            op.output_shape(self.shape()),
        )
    }

    // `self op value`, or `value op self` when `scalar_first`
    pub(crate) fn with_scalar(&self, op: VidarBinOp, value: f64, scalar_first: bool) -> Matrix {
        let scalar = Matrix::leaf(
            self.ctx.clone(),
            VidarOp::fill(value, VidarShape::SCALAR),
            VidarShape::SCALAR,
        );
        let inputs = if scalar_first {
            vec![scalar.node, self.node.clone()]
        } else {
            vec![self.node.clone(), scalar.node]
        };
        self.unchecked(VidarOp::Binary(op), inputs, self.shape())
    }

    fn binary(&self, op: VidarBinOp, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        match rhs.into() {
            Operand::Matrix(m) => self.derive(VidarOp::Binary(op), &[&m]),
            Operand::Scalar(v) => Ok(self.with_scalar(op, v, false)),
        }
    }

    pub fn shape(&self) -> VidarShape {
        self.node.shape
    }

    pub fn rows(&self) -> usize {
        self.node.shape.rows
    }

    pub fn cols(&self) -> usize {
        self.node.shape.cols
    }

    pub fn matmul(&self, rhs: &Matrix) -> Result<Matrix, VidarError> {
        self.derive(VidarOp::MatMul, &[rhs])
    }

    pub fn t(&self) -> Matrix {
        self.unchecked(
            VidarOp::Transpose,
            vec![self.node.clone()],
            self.shape().transposed(),
        )
    }

    pub fn exp(&self) -> Matrix {
        self.map(VidarUnOp::Exp)
    }

    pub fn log(&self) -> Matrix {
        self.map(VidarUnOp::Log)
    }

    pub fn sqrt(&self) -> Matrix {
        self.map(VidarUnOp::Sqrt)
    }

    pub fn abs(&self) -> Matrix {
        self.map(VidarUnOp::Abs)
    }

    pub fn not(&self) -> Matrix {
        self.map(VidarUnOp::Not)
    }

    pub fn is_nan(&self) -> Matrix {
        self.map(VidarUnOp::IsNaN)
    }

    pub fn pow(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Pow, rhs)
    }

    pub fn elem_min(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Min, rhs)
    }

    pub fn elem_max(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Max, rhs)
    }

    pub fn lt(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Lt, rhs)
    }

    pub fn le(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Lte, rhs)
    }

    pub fn gt(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Gt, rhs)
    }

    pub fn ge(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Gte, rhs)
    }

    pub fn equals(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Eq, rhs)
    }

    pub fn not_equals(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Ne, rhs)
    }

    pub fn and(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::And, rhs)
    }

    pub fn or(&self, rhs: impl Into<Operand>) -> Result<Matrix, VidarError> {
        self.binary(VidarBinOp::Or, rhs)
    }

    pub fn sum(&self) -> Matrix {
        self.agg(VidarAggOp::Sum)
    }

    pub fn min_value(&self) -> Matrix {
        self.agg(VidarAggOp::MinValue)
    }

    pub fn max_value(&self) -> Matrix {
        self.agg(VidarAggOp::MaxValue)
    }

    pub fn row_sums(&self) -> Matrix {
        self.agg(VidarAggOp::RowSums)
    }

    pub fn col_sums(&self) -> Matrix {
        self.agg(VidarAggOp::ColSums)
    }

    pub fn row_maxs(&self) -> Matrix {
        self.agg(VidarAggOp::RowMaxs)
    }

    /// 1-based column index of the first maximum of every row.
    pub fn row_index_max(&self) -> Matrix {
        self.agg(VidarAggOp::RowIndexMax)
    }

    pub fn cbind(&self, rhs: &Matrix) -> Result<Matrix, VidarError> {
        self.derive(VidarOp::Cbind, &[rhs])
    }

    /// Zero-based, half open row and column ranges.
    pub fn slice(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Matrix, VidarError> {
        self.derive(
            VidarOp::Slice {
                rows: (rows.start, rows.end),
                cols: (cols.start, cols.end),
            },
            &[],
        )
    }

    pub fn slice_rows(&self, rows: Range<usize>) -> Result<Matrix, VidarError> {
        self.slice(rows, 0..self.cols())
    }

    pub fn slice_cols(&self, cols: Range<usize>) -> Result<Matrix, VidarError> {
        self.slice(0..self.rows(), cols)
    }

    pub fn replace_nan(&self, value: f64) -> Matrix {
        self.unchecked(
            VidarOp::replace_nan(value),
            vec![self.node.clone()],
            self.shape(),
        )
    }

    /// Column vector to diagonal matrix.
    pub fn diag(&self) -> Result<Matrix, VidarError> {
        self.derive(VidarOp::Diag, &[])
    }

    /// Contingency table counting the pairs `(self[i], cols[i])` of 1-based
    /// indices into a `rows x cols` matrix.
    pub fn table(
        &self,
        col_index: &Matrix,
        rows: usize,
        cols: usize,
    ) -> Result<Matrix, VidarError> {
        self.derive(VidarOp::Table { rows, cols }, &[col_index])
    }

    pub fn compute(&self) -> Result<DenseMatrix, VidarError> {
        let mut out = compute_many(&[self])?;
        out.pop().ok_or(VidarError::ResultCount(1, 0))
    }

    pub fn compute_scalar(&self) -> Result<f64, VidarError> {
        if !self.shape().is_scalar() {
            return Err(VidarError::NotAScalar(self.shape()));
        }
        self.compute()?.as_scalar()
    }

    /// Evaluates the expression and returns a handle bound to the result, so
    /// further expressions start from a single input instead of the whole
    /// history.
    pub fn materialize(&self) -> Result<Matrix, VidarError> {
        let mut out = materialize_many(&[self])?;
        out.pop().ok_or(VidarError::ResultCount(1, 0))
    }
}

fn execute(outputs: &[&Matrix]) -> Result<(Arc<ContextInner>, Vec<VidarBuffer>), VidarError> {
    let Some(first) = outputs.first() else {
        return Err(VidarError::ResultCount(0, 0));
    };
    let ctx = first.ctx.upgrade().ok_or(VidarError::SessionClosed)?;
    for output in outputs {
        output.check_context(&ctx)?;
    }

    let lowered = Lowered::new(outputs)?;
    let buffers = ctx.execute(&lowered.graph, &lowered.outputs, &lowered.arrays)?;
    Ok((ctx, buffers))
}

pub(crate) fn compute_many(outputs: &[&Matrix]) -> Result<Vec<DenseMatrix>, VidarError> {
    let (_, buffers) = execute(outputs)?;
    Ok(buffers
        .into_iter()
        .map(|b| DenseMatrix::new(b.shape(), b.to_vec()))
        .collect())
}

/// Evaluates all handles in one execution and rebinds each to its result.
pub fn materialize_many(outputs: &[&Matrix]) -> Result<Vec<Matrix>, VidarError> {
    let (ctx, buffers) = execute(outputs)?;
    Ok(buffers
        .into_iter()
        .map(|b| Matrix::input(Arc::downgrade(&ctx), ctx.next_array_id(), b))
        .collect())
}

/// Evaluation of several handles at once.
pub trait Compute {
    type Output;

    fn compute(&self) -> Result<Self::Output, VidarError>;
}

impl Compute for (Matrix, Matrix) {
    type Output = (DenseMatrix, DenseMatrix);

    fn compute(&self) -> Result<Self::Output, VidarError> {
        let [a, b]: [DenseMatrix; 2] = compute_many(&[&self.0, &self.1])?
            .try_into()
            .map_err(|v: Vec<DenseMatrix>| VidarError::ResultCount(2, v.len()))?;
        Ok((a, b))
    }
}

impl Compute for (Matrix, Matrix, Matrix) {
    type Output = (DenseMatrix, DenseMatrix, DenseMatrix);

    fn compute(&self) -> Result<Self::Output, VidarError> {
        let [a, b, c]: [DenseMatrix; 3] = compute_many(&[&self.0, &self.1, &self.2])?
            .try_into()
            .map_err(|v: Vec<DenseMatrix>| VidarError::ResultCount(3, v.len()))?;
        Ok((a, b, c))
    }
}

impl Compute for [Matrix] {
    type Output = Vec<DenseMatrix>;

    fn compute(&self) -> Result<Self::Output, VidarError> {
        compute_many(&self.iter().collect::<Vec<_>>())
    }
}
