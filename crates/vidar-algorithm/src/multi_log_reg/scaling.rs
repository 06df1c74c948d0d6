use vidar::{Matrix, VidarContext, VidarError, materialize_many};

/// Column standardization applied implicitly, so `X` itself stays
/// untouched: the model works with `X %*% diag(scale) + shift`, where the
/// last (intercept) column keeps scale 1 and shift 0.
pub(crate) struct Scaling {
    pub(crate) scale: Matrix,
    pub(crate) shift: Matrix,
    // D x 1 indicator of the intercept row
    intercept_row: Matrix,
}

impl Scaling {
    /// `x` must already carry its trailing intercept column.
    pub(crate) fn fit(ctx: &VidarContext, x: &Matrix) -> Result<Self, VidarError> {
        let (n, d) = (x.rows() as f64, x.cols());

        let mut indicator = vec![0.0; d];
        indicator[d - 1] = 1.0;
        let intercept_row = ctx.from_vec(indicator, d, 1)?;
        let features = 1.0 - &intercept_row;

        let avg = x.col_sums().t() / n;
        let var = (x.pow(2.0)?.col_sums().t() - &(avg.pow(2.0)? * n))? / (n - 1.0);
        // constant columns are left unscaled
        let is_unsafe = var.le(0.0)?;
        let scale = 1.0 / ((&var * &(1.0 - &is_unsafe))? + &is_unsafe)?.sqrt();
        let scale = ((&scale * &features)? + &intercept_row)?;
        let shift = ((-&avg * &scale)? * &features)?;

        let mut fitted = materialize_many(&[&scale, &shift])?.into_iter();
        match (fitted.next(), fitted.next()) {
            (Some(scale), Some(shift)) => Ok(Self {
                scale,
                shift,
                intercept_row,
            }),
            _ => Err(VidarError::ResultCount(2, 0)),
        }
    }

    /// Row sums of the squared scaled features.
    pub(crate) fn row_sums_sq(&self, x: &Matrix) -> Result<Matrix, VidarError> {
        let quad = x.pow(2.0)?.matmul(&self.scale.pow(2.0)?)?;
        let cross = x.matmul(&((&self.scale * &self.shift)? * 2.0))?;
        (quad + cross)? + self.shift.pow(2.0)?.sum()
    }

    /// `diag(scale) %*% m` with `t(shift) %*% m` added to the intercept row.
    /// Maps coefficients of the scaled problem onto the raw features.
    pub(crate) fn apply(&self, m: &Matrix) -> Result<Matrix, VidarError> {
        let intercept = self.intercept_row.matmul(&self.shift.t().matmul(m)?)?;
        (&self.scale * m)? + intercept
    }

    /// `diag(scale) %*% g + shift %*% g[D, ]`, the transpose of [`Scaling::apply`].
    pub(crate) fn apply_t(&self, g: &Matrix) -> Result<Matrix, VidarError> {
        let d = g.rows();
        let last = g.slice_rows(d - 1..d)?;
        (&self.scale * g)? + self.shift.matmul(&last)?
    }
}

#[cfg(test)]
mod tests {
    use vidar::VidarConfig;

    use super::*;

    #[test]
    fn standardizes_columns_and_keeps_intercept() {
        let ctx = VidarContext::with_config(VidarConfig::default().with_threads(1)).unwrap();
        // columns: mean 2 var 1, constant 5, intercept
        let x = ctx
            .from_slice(&[1.0, 5.0, 1.0, 2.0, 5.0, 1.0, 3.0, 5.0, 1.0], 3, 3)
            .unwrap();
        let scaling = Scaling::fit(&ctx, &x).unwrap();

        assert_eq!(scaling.scale.compute().unwrap().data(), &[1.0, 1.0, 1.0]);
        assert_eq!(scaling.shift.compute().unwrap().data(), &[-2.0, -5.0, 0.0]);

        // (x - 2)^2 + 0 + 1 per row
        assert_eq!(
            scaling.row_sums_sq(&x).unwrap().compute().unwrap().data(),
            &[2.0, 1.0, 2.0]
        );

        let b = ctx.from_slice(&[1.0, 2.0, 3.0], 3, 1).unwrap();
        // intercept row picks up t(shift) %*% b = -2 - 10
        assert_eq!(
            scaling.apply(&b).unwrap().compute().unwrap().data(),
            &[1.0, 2.0, -9.0]
        );
        // shift %*% b[3] added to the scaled rows
        assert_eq!(
            scaling.apply_t(&b).unwrap().compute().unwrap().data(),
            &[-5.0, -13.0, 3.0]
        );
    }
}
