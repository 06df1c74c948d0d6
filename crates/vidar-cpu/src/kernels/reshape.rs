use rayon::prelude::*;
use vidar_ir::ir::VidarShape;

use super::MIN_ROWS_PER_TASK;
use crate::runtime::error::CpuError;

pub(crate) fn transpose(x: &[f64], shape: VidarShape) -> Vec<f64> {
    let (rows, cols) = (shape.rows, shape.cols);
    let mut out = vec![0.0; x.len()];

    // one output row per input column
    out.par_chunks_mut(rows)
        .with_min_len(MIN_ROWS_PER_TASK)
        .enumerate()
        .for_each(|(j, out_row)| {
            for (i, o) in out_row.iter_mut().enumerate() {
                *o = x[i * cols + j];
            }
        });

    out
}

pub(crate) fn cbind(a: &[f64], a_shape: VidarShape, b: &[f64], b_shape: VidarShape) -> Vec<f64> {
    let (ac, bc) = (a_shape.cols, b_shape.cols);
    let mut out = vec![0.0; a_shape.rows * (ac + bc)];

    out.par_chunks_mut(ac + bc)
        .with_min_len(MIN_ROWS_PER_TASK)
        .enumerate()
        .for_each(|(i, row)| {
            row[..ac].copy_from_slice(&a[i * ac..(i + 1) * ac]);
            row[ac..].copy_from_slice(&b[i * bc..(i + 1) * bc]);
        });

    out
}

pub(crate) fn slice(
    x: &[f64],
    shape: VidarShape,
    rows: (usize, usize),
    cols: (usize, usize),
) -> Vec<f64> {
    let width = cols.1 - cols.0;
    let mut out = vec![0.0; (rows.1 - rows.0) * width];

    out.par_chunks_mut(width)
        .with_min_len(MIN_ROWS_PER_TASK)
        .enumerate()
        .for_each(|(i, row)| {
            let start = (rows.0 + i) * shape.cols + cols.0;
            row.copy_from_slice(&x[start..start + width]);
        });

    out
}

/// Contingency table: `out[r - 1, c - 1] += 1` for every pair of 1-based
/// indices `(r, c)`.
pub(crate) fn table(
    row_idx: &[f64],
    col_idx: &[f64],
    out_shape: VidarShape,
) -> Result<Vec<f64>, CpuError> {
    let mut out = vec![0.0; out_shape.len()];

    for (r, c) in row_idx.iter().zip(col_idx) {
        let (ri, ci) = (r.round(), c.round());
        // NaN fails both lower bounds
        if !(ri >= 1.0 && ci >= 1.0) || ri as usize > out_shape.rows || ci as usize > out_shape.cols
        {
            return Err(CpuError::TableIndexOutOfRange(
                *r,
                *c,
                out_shape.rows,
                out_shape.cols,
            ));
        }
        out[(ri as usize - 1) * out_shape.cols + (ci as usize - 1)] += 1.0;
    }

    Ok(out)
}

pub(crate) fn diag(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut out = vec![0.0; n * n];
    for (i, v) in x.iter().enumerate() {
        out[i * n + i] = *v;
    }
    out
}

pub(crate) fn seq(from: i64, to: i64) -> Vec<f64> {
    (from..=to).map(|v| v as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_cbind_slice() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let shape = VidarShape::new(2, 3);

        assert_eq!(transpose(&x, shape), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(
            cbind(&x, shape, &[7.0, 8.0], VidarShape::new(2, 1)),
            vec![1.0, 2.0, 3.0, 7.0, 4.0, 5.0, 6.0, 8.0]
        );
        assert_eq!(slice(&x, shape, (1, 2), (1, 3)), vec![5.0, 6.0]);
    }

    #[test]
    fn table_builds_indicators() {
        let rows = seq(1, 3);
        let labels = [2.0, 1.0, 2.0];
        assert_eq!(
            table(&rows, &labels, VidarShape::new(3, 2)).unwrap(),
            vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0]
        );
        assert!(matches!(
            table(&rows, &[0.0, 1.0, 1.0], VidarShape::new(3, 2)),
            Err(CpuError::TableIndexOutOfRange(..))
        ));
    }

    #[test]
    fn non_finite_indices_are_out_of_range() {
        let rows = seq(1, 2);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                table(&rows, &[1.0, bad], VidarShape::new(2, 2)),
                Err(CpuError::TableIndexOutOfRange(..))
            ));
            assert!(matches!(
                table(&[bad, 1.0], &rows, VidarShape::new(2, 2)),
                Err(CpuError::TableIndexOutOfRange(..))
            ));
        }
    }

    #[test]
    fn diag_places_values() {
        assert_eq!(diag(&[2.0, 3.0]), vec![2.0, 0.0, 0.0, 3.0]);
    }
}
