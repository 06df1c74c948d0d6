use crate::{
    ir::{VidarBinOp, VidarOp, VidarShape},
    util::error::ShapeError,
};

/// Output shape of an element-wise binary op.
///
/// Operands broadcast when they are equal, when either is a 1x1 scalar, or
/// when one side is a row (column) vector matching the other's columns (rows).
pub fn broadcast_shape(
    op: VidarBinOp,
    lhs: VidarShape,
    rhs: VidarShape,
) -> Result<VidarShape, ShapeError> {
    if lhs == rhs || rhs.is_scalar() {
        return Ok(lhs);
    }
    if lhs.is_scalar() {
        return Ok(rhs);
    }
    if (rhs.is_row_vector() && rhs.cols == lhs.cols) || (rhs.is_col_vector() && rhs.rows == lhs.rows)
    {
        return Ok(lhs);
    }
    if (lhs.is_row_vector() && lhs.cols == rhs.cols) || (lhs.is_col_vector() && lhs.rows == rhs.rows)
    {
        return Ok(rhs);
    }

    Err(ShapeError::Broadcast(op, lhs, rhs))
}

pub fn infer_shape(op: &VidarOp, inputs: &[VidarShape]) -> Result<VidarShape, ShapeError> {
    if inputs.len() != op.arity() {
        return Err(ShapeError::Arity(op.name(), op.arity(), inputs.len()));
    }

    let shape = match op {
        VidarOp::Input { shape, .. } | VidarOp::Fill { shape, .. } => *shape,
        VidarOp::Seq { from, to } => {
            if to < from {
                return Err(ShapeError::EmptySeq(*from, *to));
            }
            VidarShape::new((to - from + 1) as usize, 1)
        }
        VidarOp::Unary(_) | VidarOp::ReplaceNaN { .. } => inputs[0],
        VidarOp::Binary(bin_op) => broadcast_shape(*bin_op, inputs[0], inputs[1])?,
        VidarOp::MatMul => {
            let (a, b) = (inputs[0], inputs[1]);
            if a.cols != b.rows {
                return Err(ShapeError::MatMul(a, b));
            }
            VidarShape::new(a.rows, b.cols)
        }
        VidarOp::Transpose => inputs[0].transposed(),
        VidarOp::Agg(agg) => agg.output_shape(inputs[0]),
        VidarOp::Cbind => {
            let (a, b) = (inputs[0], inputs[1]);
            if a.rows != b.rows {
                return Err(ShapeError::Cbind(a, b));
            }
            VidarShape::new(a.rows, a.cols + b.cols)
        }
        VidarOp::Slice { rows, cols } => {
            let input = inputs[0];
            if rows.0 >= rows.1 || cols.0 >= cols.1 || rows.1 > input.rows || cols.1 > input.cols
            {
                return Err(ShapeError::SliceOutOfBounds(*rows, *cols, input));
            }
            VidarShape::new(rows.1 - rows.0, cols.1 - cols.0)
        }
        VidarOp::Table { rows, cols } => {
            let (a, b) = (inputs[0], inputs[1]);
            if !a.is_col_vector() {
                return Err(ShapeError::NotAColumnVector("table", a));
            }
            if !b.is_col_vector() {
                return Err(ShapeError::NotAColumnVector("table", b));
            }
            if a.rows != b.rows {
                return Err(ShapeError::TableLengthMismatch(a.rows, b.rows));
            }
            VidarShape::new(*rows, *cols)
        }
        VidarOp::Diag => {
            let input = inputs[0];
            if !input.is_col_vector() {
                return Err(ShapeError::NotAColumnVector("diag", input));
            }
            VidarShape::new(input.rows, input.rows)
        }
    };

    if shape.is_empty() {
        return Err(ShapeError::Empty(op.name()));
    }

    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VidarAggOp;

    #[test]
    fn broadcast_rules() {
        let m = VidarShape::new(4, 3);
        assert_eq!(
            broadcast_shape(VidarBinOp::Add, m, VidarShape::SCALAR),
            Ok(m)
        );
        assert_eq!(
            broadcast_shape(VidarBinOp::Mul, VidarShape::new(4, 1), m),
            Ok(m)
        );
        assert_eq!(
            broadcast_shape(VidarBinOp::Div, m, VidarShape::new(1, 3)),
            Ok(m)
        );
        assert!(broadcast_shape(VidarBinOp::Sub, m, VidarShape::new(3, 4)).is_err());
    }

    #[test]
    fn matmul_requires_inner_dims() {
        let a = VidarShape::new(5, 3);
        let b = VidarShape::new(3, 2);
        assert_eq!(infer_shape(&VidarOp::MatMul, &[a, b]), Ok(VidarShape::new(5, 2)));
        assert_eq!(
            infer_shape(&VidarOp::MatMul, &[b, a]),
            Err(ShapeError::MatMul(b, a))
        );
    }

    #[test]
    fn aggregates_and_slices() {
        let m = VidarShape::new(6, 4);
        assert_eq!(
            infer_shape(&VidarOp::Agg(VidarAggOp::ColSums), &[m]),
            Ok(VidarShape::new(1, 4))
        );
        assert_eq!(
            infer_shape(&VidarOp::Agg(VidarAggOp::RowIndexMax), &[m]),
            Ok(VidarShape::new(6, 1))
        );
        let slice = VidarOp::Slice {
            rows: (0, 6),
            cols: (0, 3),
        };
        assert_eq!(infer_shape(&slice, &[m]), Ok(VidarShape::new(6, 3)));
        let bad = VidarOp::Slice {
            rows: (0, 7),
            cols: (0, 3),
        };
        assert!(matches!(
            infer_shape(&bad, &[m]),
            Err(ShapeError::SliceOutOfBounds(..))
        ));
    }

    #[test]
    fn seq_and_arity() {
        assert_eq!(
            infer_shape(&VidarOp::Seq { from: 1, to: 10 }, &[]),
            Ok(VidarShape::new(10, 1))
        );
        assert_eq!(
            infer_shape(&VidarOp::Seq { from: 3, to: 2 }, &[]),
            Err(ShapeError::EmptySeq(3, 2))
        );
        assert_eq!(
            infer_shape(&VidarOp::Transpose, &[]),
            Err(ShapeError::Arity("t", 1, 0))
        );
    }
}
