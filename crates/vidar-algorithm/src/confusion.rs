use vidar::{Compute, DenseMatrix, Matrix};

use crate::error::AlgorithmError;

/// Counts of label pairs: entry `(i, j)` is the number of samples of class
/// `j + 1` that were predicted as class `i + 1`. Both inputs are column
/// vectors of positive labels.
pub fn confusion_matrix(predicted: &Matrix, actual: &Matrix) -> Result<DenseMatrix, AlgorithmError> {
    if !actual.shape().is_col_vector() || actual.shape() != predicted.shape() {
        return Err(AlgorithmError::LabelShape(actual.shape(), predicted.rows()));
    }

    let bounds = [
        predicted.min_value(),
        actual.min_value(),
        predicted.max_value(),
        actual.max_value(),
    ]
    .as_slice()
    .compute()?
    .iter()
    .map(|m| m.as_scalar())
    .collect::<Result<Vec<_>, _>>()?;

    let min = bounds[0].min(bounds[1]);
    if min <= 0.0 {
        return Err(AlgorithmError::NonPositiveLabels(min));
    }
    let dim = bounds[2].max(bounds[3]).round() as usize;

    Ok(predicted.table(actual, dim, dim)?.compute()?)
}
