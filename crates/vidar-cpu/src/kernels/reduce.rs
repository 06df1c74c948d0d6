use rayon::prelude::*;
use vidar_ir::ir::{VidarAggOp, VidarShape};

use super::MIN_ROWS_PER_TASK;

pub(crate) fn aggregate(op: VidarAggOp, x: &[f64], shape: VidarShape) -> Vec<f64> {
    let cols = shape.cols;
    match op {
        VidarAggOp::Sum => vec![x.par_iter().sum()],
        VidarAggOp::MinValue => vec![x.par_iter().copied().reduce(|| f64::INFINITY, f64::min)],
        VidarAggOp::MaxValue => {
            vec![x.par_iter().copied().reduce(|| f64::NEG_INFINITY, f64::max)]
        }
        VidarAggOp::RowSums => x
            .par_chunks(cols)
            .with_min_len(MIN_ROWS_PER_TASK)
            .map(|row| row.iter().sum())
            .collect(),
        VidarAggOp::RowMaxs => x
            .par_chunks(cols)
            .with_min_len(MIN_ROWS_PER_TASK)
            .map(|row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            .collect(),
        VidarAggOp::RowIndexMax => x
            .par_chunks(cols)
            .with_min_len(MIN_ROWS_PER_TASK)
            .map(row_index_max)
            .collect(),
        VidarAggOp::ColSums => x
            .par_chunks(cols)
            .with_min_len(MIN_ROWS_PER_TASK)
            .fold(
                || vec![0.0; cols],
                |mut acc, row| {
                    for (a, v) in acc.iter_mut().zip(row) {
                        *a += v;
                    }
                    acc
                },
            )
            .reduce(
                || vec![0.0; cols],
                |mut lhs, rhs| {
                    for (l, r) in lhs.iter_mut().zip(rhs) {
                        *l += r;
                    }
                    lhs
                },
            ),
    }
}

// 1-based, first maximum wins
fn row_index_max(row: &[f64]) -> f64 {
    let mut best = 0;
    for (j, v) in row.iter().enumerate().skip(1) {
        if *v > row[best] {
            best = j;
        }
    }
    (best + 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_and_column_aggregates() {
        let x = [1.0, 9.0, 3.0, 7.0, 2.0, 7.0];
        let shape = VidarShape::new(2, 3);

        assert_eq!(aggregate(VidarAggOp::Sum, &x, shape), vec![29.0]);
        assert_eq!(aggregate(VidarAggOp::MinValue, &x, shape), vec![1.0]);
        assert_eq!(aggregate(VidarAggOp::MaxValue, &x, shape), vec![9.0]);
        assert_eq!(aggregate(VidarAggOp::RowSums, &x, shape), vec![13.0, 16.0]);
        assert_eq!(aggregate(VidarAggOp::ColSums, &x, shape), vec![8.0, 11.0, 10.0]);
        assert_eq!(aggregate(VidarAggOp::RowMaxs, &x, shape), vec![9.0, 7.0]);
    }

    #[test]
    fn row_index_max_prefers_first_tie() {
        let x = [1.0, 9.0, 3.0, 7.0, 2.0, 7.0];
        assert_eq!(
            aggregate(VidarAggOp::RowIndexMax, &x, VidarShape::new(2, 3)),
            vec![2.0, 1.0]
        );
    }
}
