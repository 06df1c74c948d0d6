use rayon::prelude::*;
use vidar_ir::ir::{VidarBinOp, VidarShape, VidarUnOp};

use super::MIN_ROWS_PER_TASK;

#[derive(Clone, Copy)]
enum Broadcast {
    Full,
    Scalar,
    Row,
    Col,
}

impl Broadcast {
    fn of(shape: VidarShape, out: VidarShape) -> Self {
        if shape == out {
            Self::Full
        } else if shape.is_scalar() {
            Self::Scalar
        } else if shape.is_row_vector() {
            Self::Row
        } else {
            Self::Col
        }
    }

    #[inline]
    fn get(self, data: &[f64], cols: usize, i: usize, j: usize) -> f64 {
        match self {
            Broadcast::Full => data[i * cols + j],
            Broadcast::Scalar => data[0],
            Broadcast::Row => data[j],
            Broadcast::Col => data[i],
        }
    }
}

pub(crate) fn unary(op: VidarUnOp, x: &[f64]) -> Vec<f64> {
    x.par_iter().map(|v| op.apply(*v)).collect()
}

pub(crate) fn replace_nan(x: &[f64], value: f64) -> Vec<f64> {
    x.par_iter()
        .map(|v| if v.is_nan() { value } else { *v })
        .collect()
}

/// Element-wise `lhs op rhs`, broadcasting scalars, rows and columns to `out`.
pub(crate) fn binary(
    op: VidarBinOp,
    lhs: &[f64],
    lhs_shape: VidarShape,
    rhs: &[f64],
    rhs_shape: VidarShape,
    out_shape: VidarShape,
) -> Vec<f64> {
    if lhs_shape == rhs_shape {
        return lhs
            .par_iter()
            .zip(rhs.par_iter())
            .map(|(a, b)| op.apply(*a, *b))
            .collect();
    }

    let cols = out_shape.cols;
    let l = Broadcast::of(lhs_shape, out_shape);
    let r = Broadcast::of(rhs_shape, out_shape);
    let mut out = vec![0.0; out_shape.len()];

    out.par_chunks_mut(cols)
        .with_min_len(MIN_ROWS_PER_TASK)
        .enumerate()
        .for_each(|(i, row)| {
            for (j, o) in row.iter_mut().enumerate() {
                *o = op.apply(l.get(lhs, cols, i, j), r.get(rhs, cols, i, j));
            }
        });

    out
}
