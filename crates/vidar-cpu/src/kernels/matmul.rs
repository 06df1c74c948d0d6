use rayon::prelude::*;
use vidar_ir::ir::VidarShape;

use super::MIN_ROWS_PER_TASK;

/// `A %*% B`
pub(crate) fn matmul(a: &[f64], a_shape: VidarShape, b: &[f64], b_shape: VidarShape) -> Vec<f64> {
    let (n, k) = (a_shape.cols, b_shape.cols);
    let mut out = vec![0.0; a_shape.rows * k];

    out.par_chunks_mut(k)
        .with_min_len(MIN_ROWS_PER_TASK)
        .enumerate()
        .for_each(|(i, out_row)| {
            let a_row = &a[i * n..(i + 1) * n];
            for (p, &a_ip) in a_row.iter().enumerate() {
                // pixel data is mostly zeros
                if a_ip == 0.0 {
                    continue;
                }
                let b_row = &b[p * k..(p + 1) * k];
                for (o, &b_pj) in out_row.iter_mut().zip(b_row) {
                    *o += a_ip * b_pj;
                }
            }
        });

    out
}

/// `t(A) %*% B` without materializing `t(A)`.
pub(crate) fn matmul_tn(a: &[f64], a_shape: VidarShape, b: &[f64], b_shape: VidarShape) -> Vec<f64> {
    let (d, k) = (a_shape.cols, b_shape.cols);

    a.par_chunks(d)
        .zip(b.par_chunks(k))
        .with_min_len(MIN_ROWS_PER_TASK)
        .fold(
            || vec![0.0; d * k],
            |mut acc, (a_row, b_row)| {
                for (p, &a_ip) in a_row.iter().enumerate() {
                    if a_ip == 0.0 {
                        continue;
                    }
                    let acc_row = &mut acc[p * k..(p + 1) * k];
                    for (o, &b_ij) in acc_row.iter_mut().zip(b_row) {
                        *o += a_ip * b_ij;
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![0.0; d * k],
            |mut lhs, rhs| {
                for (l, r) in lhs.iter_mut().zip(rhs) {
                    *l += r;
                }
                lhs
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_products() {
        // [[1, 2], [3, 4], [5, 6]]
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let a_shape = VidarShape::new(3, 2);
        // [[1, 0, 2], [0, 1, 3]]
        let b = [1.0, 0.0, 2.0, 0.0, 1.0, 3.0];
        let b_shape = VidarShape::new(2, 3);

        assert_eq!(
            matmul(&a, a_shape, &b, b_shape),
            vec![1.0, 2.0, 8.0, 3.0, 4.0, 18.0, 5.0, 6.0, 28.0]
        );

        // t(A) %*% A = [[35, 44], [44, 56]]
        assert_eq!(matmul_tn(&a, a_shape, &a, a_shape), vec![35.0, 44.0, 44.0, 56.0]);
    }

    #[test]
    fn tn_matches_explicit_transpose_on_many_rows() {
        let n = 500;
        let a = (0..n * 3).map(|v| (v % 7) as f64 - 3.0).collect::<Vec<_>>();
        let b = (0..n * 2).map(|v| (v % 5) as f64).collect::<Vec<_>>();

        let mut at = vec![0.0; n * 3];
        for i in 0..n {
            for j in 0..3 {
                at[j * n + i] = a[i * 3 + j];
            }
        }

        let fused = matmul_tn(&a, VidarShape::new(n, 3), &b, VidarShape::new(n, 2));
        let explicit = matmul(&at, VidarShape::new(3, n), &b, VidarShape::new(n, 2));
        assert_eq!(fused, explicit);
    }
}
