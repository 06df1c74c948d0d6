use vidar::{Compute, DenseMatrix, Matrix, VidarContext};

use crate::error::AlgorithmError;

/// Lazy outputs of [`multi_log_reg_predict`].
#[derive(Debug, Clone)]
pub struct Prediction {
    /// N x (K + 1) class probabilities, the baseline class last.
    pub m: Matrix,
    /// N x 1 predicted labels, 1-based.
    pub predicted_y: Matrix,
    /// Percentage of correctly predicted labels.
    pub accuracy: Matrix,
}

impl Prediction {
    /// Evaluates all three outputs in a single execution.
    pub fn compute(&self) -> Result<(DenseMatrix, DenseMatrix, f64), AlgorithmError> {
        let (m, predicted_y, accuracy) = (
            self.m.clone(),
            self.predicted_y.clone(),
            self.accuracy.clone(),
        )
            .compute()?;
        Ok((m, predicted_y, accuracy.as_scalar()?))
    }
}

/// Scores `x` with betas from [`multi_log_reg`](super::multi_log_reg).
///
/// `x` may omit the intercept column, in which case one is appended. `y`
/// holds the true labels, all of them positive.
pub fn multi_log_reg_predict(
    ctx: &VidarContext,
    x: &Matrix,
    b: &Matrix,
    y: &Matrix,
    verbose: bool,
) -> Result<Prediction, AlgorithmError> {
    if !y.shape().is_col_vector() || y.rows() != x.rows() {
        return Err(AlgorithmError::LabelShape(y.shape(), x.rows()));
    }

    let min_y = y.min_value().compute_scalar()?;
    if min_y <= 0.0 {
        return Err(AlgorithmError::NonPositiveLabels(min_y));
    }

    let x = if x.cols() == b.rows() {
        x.clone()
    } else if x.cols() + 1 == b.rows() {
        x.cbind(&ctx.fill(1.0, x.rows(), 1)?)?
    } else {
        return Err(AlgorithmError::FeatureMismatch(
            b.rows(),
            b.rows().saturating_sub(1),
            x.cols(),
        ));
    };

    let lt = x.matmul(b)?;
    // shifting every row by max(row, 0) keeps exp() finite
    let shift = lt.row_maxs().elem_max(0.0)?;
    let exp_lt = (&lt - &shift)?.exp();
    let baseline = (-&shift).exp();
    let denom = (exp_lt.row_sums() + &baseline)?;
    let m = (&exp_lt / &denom)?.cbind(&(&baseline / &denom)?)?;

    let predicted_y = m.row_index_max();
    let accuracy = predicted_y.equals(y)?.sum() / y.rows() as f64 * 100.0;

    if verbose {
        log::info!("Accuracy (%): {}", accuracy.compute_scalar()?);
    }

    Ok(Prediction {
        m,
        predicted_y,
        accuracy,
    })
}
