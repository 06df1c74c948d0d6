//! Multinomial logistic regression trained with a trust region Newton method.
//!
//! Each outer iteration approximately solves the trust region sub-problem
//! with conjugate gradient, then accepts or rejects the step based on the
//! ratio of actual to predicted objective reduction. The last class is the
//! baseline, so `K + 1` classes yield `K` coefficient columns.

use vidar::{Compute, Matrix, VidarContext, VidarError, materialize_many};

use crate::error::AlgorithmError;

mod params;
pub mod predict;
mod scaling;

pub use params::MultiLogRegParams;
use scaling::Scaling;

// step acceptance and trust region update
const ETA0: f64 = 0.0001;
const ETA1: f64 = 0.25;
const ETA2: f64 = 0.75;
const SIGMA1: f64 = 0.25;
const SIGMA2: f64 = 0.5;
const SIGMA3: f64 = 4.0;
// inner solve stops once the residual is this fraction of the gradient norm
const PSI: f64 = 0.1;

fn sum_sq(m: &Matrix) -> Result<f64, VidarError> {
    m.pow(2.0)?.sum().compute_scalar()
}

fn dot(a: &Matrix, b: &Matrix) -> Result<f64, VidarError> {
    (a * b)?.sum().compute_scalar()
}

// `a + alpha * b`, evaluated
fn axpy(a: &Matrix, alpha: f64, b: &Matrix) -> Result<Matrix, VidarError> {
    (a + &(b * alpha))?.materialize()
}

fn pair(mut results: Vec<Matrix>) -> Result<(Matrix, Matrix), VidarError> {
    let second = results.pop();
    let first = results.pop();
    match (first, second) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(VidarError::ResultCount(2, results.len())),
    }
}

/// Data and regularization of one training problem.
struct Problem {
    // features, with the intercept column when requested
    x: Matrix,
    // N x (K + 1) class indicators
    y: Matrix,
    // D x 1, zero for the intercept
    lambda: Matrix,
    zeros: Matrix,
    scaling: Option<Scaling>,
    k: usize,
}

impl Problem {
    fn to_scaled(&self, m: &Matrix) -> Result<Matrix, VidarError> {
        match &self.scaling {
            Some(s) => s.apply(m),
            None => Ok(m.clone()),
        }
    }

    fn from_scaled(&self, g: &Matrix) -> Result<Matrix, VidarError> {
        match &self.scaling {
            Some(s) => s.apply_t(g),
            None => Ok(g.clone()),
        }
    }

    fn gradient(&self, p: &Matrix, b: &Matrix) -> Result<Matrix, VidarError> {
        let residual = (p.slice_cols(0..self.k)? - self.y.slice_cols(0..self.k)?)?;
        let grad = self.from_scaled(&self.x.t().matmul(&residual)?)?;
        grad + (&self.lambda * b)?
    }

    // Hessian of the objective at `p_1k` times `v`
    fn hessian_vec(&self, p_1k: &Matrix, v: &Matrix) -> Result<Matrix, VidarError> {
        let q = (p_1k * &self.x.matmul(&self.to_scaled(v)?)?)?;
        let centered = (&q - &(p_1k * &q.row_sums())?)?;
        let hv = self.from_scaled(&self.x.t().matmul(&centered)?)?;
        hv + (&self.lambda * v)?
    }

    /// Class probabilities and objective value for the coefficients `b`.
    fn evaluate(&self, b: &Matrix) -> Result<(Matrix, f64), VidarError> {
        let lt = self.x.matmul(&self.to_scaled(b)?)?.cbind(&self.zeros)?;
        let lt = (&lt - &lt.row_maxs())?;
        let exp_lt = lt.exp();
        let row_sums = exp_lt.row_sums();
        let p = (&exp_lt / &row_sums)?;

        let fit = (row_sums.log().sum() - (&self.y * &lt)?.sum())?;
        let penalty = (&self.lambda * &b.pow(2.0)?)?.sum() * 0.5;
        let obj = (fit + penalty)?;

        let (p, obj) = pair(materialize_many(&[&p, &obj])?)?;
        Ok((p, obj.compute_scalar()?))
    }
}

/// Fits a multinomial logistic regression model of `y` on `x`.
///
/// `y` holds one class label per row of `x`, labels `1..=max(y)`. Labels
/// `<= 0` are folded into an extra class `max(y) + 1`. The returned betas
/// (`D x K`) apply to the raw features; with an intercept its coefficients
/// are the last row.
pub fn multi_log_reg(
    ctx: &VidarContext,
    x: &Matrix,
    y: &Matrix,
    params: &MultiLogRegParams,
) -> Result<Matrix, AlgorithmError> {
    params.validate()?;

    let n = x.rows();
    if !y.shape().is_col_vector() || y.rows() != n {
        return Err(AlgorithmError::LabelShape(y.shape(), n));
    }

    let nan_count = x.is_nan().sum().compute_scalar()?;
    let x = if nan_count > 0.0 {
        log::warn!("multi_log_reg: replacing {nan_count} NaN value(s) in X with 0");
        x.replace_nan(0.0)
    } else {
        x.clone()
    };

    let (min_y, max_y, nan_y) = (y.min_value(), y.max_value(), y.is_nan().sum()).compute()?;
    let (min_y, mut max_y) = (min_y.as_scalar()?, max_y.as_scalar()?);
    let nan_y = nan_y.as_scalar()?;
    if nan_y > 0.0 || !min_y.is_finite() || !max_y.is_finite() {
        return Err(AlgorithmError::NonFiniteLabels(nan_y, min_y, max_y));
    }
    let y = if min_y <= 0.0 {
        max_y += 1.0;
        (y + &((-y + max_y) * &y.le(0.0)?)?)?
    } else {
        y.clone()
    };

    let classes = max_y.round();
    if !(classes >= 2.0) {
        return Err(AlgorithmError::TooFewClasses(classes));
    }
    let classes = classes as usize;
    let k = classes - 1;

    let intercept = params.icpt > 0;
    let x = if intercept {
        x.cbind(&ctx.fill(1.0, n, 1)?)?
    } else {
        x
    };
    let d = x.cols();
    let x = x.materialize()?;

    let scaling = if params.icpt == 2 {
        Some(Scaling::fit(ctx, &x)?)
    } else {
        None
    };
    let row_sums_sq = match &scaling {
        Some(s) => s.row_sums_sq(&x)?,
        None => x.pow(2.0)?.row_sums(),
    };

    let y = ctx
        .seq(1, n as i64)?
        .table(&y, n, classes)?
        .materialize()?;

    let lambda = (0..d)
        .map(|i| if intercept && i == d - 1 { 0.0 } else { params.reg })
        .collect::<Vec<_>>();

    let problem = Problem {
        x,
        y,
        lambda: ctx.from_vec(lambda, d, 1)?,
        zeros: ctx.fill(0.0, n, 1)?,
        scaling,
        k,
    };

    let mut delta =
        0.5 * (d as f64).sqrt() / row_sums_sq.sqrt().max_value().compute_scalar()?;

    let mut b = ctx.fill(0.0, d, k)?;
    let mut p = ctx.fill(1.0 / (k as f64 + 1.0), n, classes)?;
    let mut obj = n as f64 * (k as f64 + 1.0).ln();
    let mut grad = problem.gradient(&p, &b)?.materialize()?;
    let mut norm_grad = sum_sq(&grad)?.sqrt();
    let norm_grad_initial = norm_grad;

    let maxii = if params.maxii == 0 { d * k } else { params.maxii };
    let mut iter = 1;
    let mut converge = norm_grad < params.tol || iter > params.maxi;

    if params.verbose {
        log::info!("-- Initially:  Objective = {obj},  Gradient Norm = {norm_grad},  Trust Delta = {delta}");
    }

    while !converge {
        // trust region sub-problem
        let mut s = ctx.fill(0.0, d, k)?;
        let mut r = (-&grad).materialize()?;
        let mut v = r.clone();
        let delta2 = delta * delta;
        let mut inner_iter = 1;
        let mut norm_r2 = sum_sq(&r)?;
        let mut inner_converge = norm_r2.sqrt() <= PSI * norm_grad;
        let mut boundary_reached = false;
        let p_1k = p.slice_cols(0..k)?.materialize()?;

        while !inner_converge {
            let hv = problem.hessian_vec(&p_1k, &v)?.materialize()?;
            let alpha = norm_r2 / dot(&v, &hv)?;
            let s_new = axpy(&s, alpha, &v)?;

            if sum_sq(&s_new)? <= delta2 {
                s = s_new;
                r = axpy(&r, -alpha, &hv)?;
                let old_norm_r2 = norm_r2;
                norm_r2 = sum_sq(&r)?;
                v = axpy(&r, norm_r2 / old_norm_r2, &v)?;
                inner_converge = norm_r2.sqrt() <= PSI * norm_grad;
            } else {
                // step to the trust region boundary along `v`
                boundary_reached = true;
                let (sv, v2, s2) = (dot(&s, &v)?, sum_sq(&v)?, sum_sq(&s)?);
                let rad = (sv * sv + v2 * (delta2 - s2)).sqrt();
                let alpha = if sv >= 0.0 {
                    (delta2 - s2) / (sv + rad)
                } else {
                    (rad - sv) / v2
                };
                s = axpy(&s, alpha, &v)?;
                r = axpy(&r, -alpha, &hv)?;
                inner_converge = true;
            }

            inner_iter += 1;
            inner_converge = inner_converge || inner_iter > maxii;
        }

        let gs = dot(&s, &grad)?;
        let qk = -0.5 * (gs - dot(&s, &r)?);
        let b_new = (&b + &s)?.materialize()?;
        let (p_new, obj_new) = problem.evaluate(&b_new)?;

        let actred = obj - obj_new;
        let rho = actred / qk;
        let snorm = sum_sq(&s)?.sqrt();

        if iter == 1 {
            delta = delta.min(snorm);
        }

        let alpha2 = obj_new - obj - gs;
        let alpha = if alpha2 <= 0.0 {
            SIGMA3
        } else {
            SIGMA1.max(-0.5 * gs / alpha2)
        };

        delta = if rho < ETA0 {
            (alpha.max(SIGMA1) * snorm).min(SIGMA2 * delta)
        } else if rho < ETA1 {
            (SIGMA1 * delta).max((alpha * snorm).min(SIGMA2 * delta))
        } else if rho < ETA2 {
            (SIGMA1 * delta).max((alpha * snorm).min(SIGMA3 * delta))
        } else {
            delta.max((alpha * snorm).min(SIGMA3 * delta))
        };

        if params.verbose {
            log::info!(
                "-- Outer Iteration {iter}: Had {} CG iterations{}",
                inner_iter - 1,
                if boundary_reached {
                    ", trust bound REACHED"
                } else {
                    ""
                }
            );
            log::info!(
                "   -- Obj.Reduction:  Actual = {actred},  Predicted = {qk}  (A/P: {:.4}),  Trust Delta = {delta}",
                rho
            );
        }

        if rho > ETA0 {
            b = b_new;
            p = p_new;
            grad = problem.gradient(&p, &b)?.materialize()?;
            norm_grad = sum_sq(&grad)?.sqrt();
            obj = obj_new;

            if params.verbose {
                log::info!(
                    "   -- New Objective = {obj},  Beta Change Norm = {snorm},  Gradient Norm = {norm_grad}"
                );
            }
        }

        iter += 1;
        converge = norm_grad < params.tol * norm_grad_initial
            || iter > params.maxi
            || (!boundary_reached && actred.abs() < (obj.abs() + obj_new.abs()) * 1e-14);

        if converge && params.verbose {
            log::info!("Termination / Convergence condition satisfied.");
        }
    }

    let betas = problem.to_scaled(&b)?;
    Ok(betas.materialize()?)
}

#[cfg(test)]
mod tests {
    use vidar::VidarConfig;
    use vidar_datasets::synthetic_blobs;

    use super::*;
    use crate::multi_log_reg::predict::multi_log_reg_predict;

    fn ctx() -> VidarContext {
        VidarContext::with_config(VidarConfig::default().with_threads(2)).unwrap()
    }

    #[test]
    fn separable_blobs_are_learned() {
        let ctx = ctx();
        let blobs = synthetic_blobs(300, 4, 3, 7);
        let x = ctx.from_slice(&blobs.features, 300, 4).unwrap();
        let y = ctx.from_slice(&blobs.labels, 300, 1).unwrap();

        let params = MultiLogRegParams::default().with_tol(1e-4).with_verbose(false);
        let betas = multi_log_reg(&ctx, &x, &y, &params).unwrap();
        assert_eq!(betas.shape(), vidar::VidarShape::new(5, 2));

        let prediction = multi_log_reg_predict(&ctx, &x, &betas, &y, false).unwrap();
        let (_, _, accuracy) = prediction.compute().unwrap();
        assert!(accuracy > 95.0, "training accuracy {accuracy}");
    }

    #[test]
    fn every_intercept_mode_fits() {
        let ctx = ctx();
        let blobs = synthetic_blobs(120, 3, 2, 11);
        let x = ctx.from_slice(&blobs.features, 120, 3).unwrap();
        let y = ctx.from_slice(&blobs.labels, 120, 1).unwrap();

        for icpt in 0..=2u8 {
            let params = MultiLogRegParams::default()
                .with_icpt(icpt)
                .with_verbose(false);
            let betas = multi_log_reg(&ctx, &x, &y, &params).unwrap();
            let rows = if icpt == 0 { 3 } else { 4 };
            assert_eq!(betas.shape(), vidar::VidarShape::new(rows, 1));
        }
    }

    #[test]
    fn non_positive_labels_become_the_last_class() {
        let ctx = ctx();
        let x = ctx
            .from_slice(&[0.0, 0.1, 0.2, 5.0, 5.1, 5.2], 6, 1)
            .unwrap();
        // 0 is folded into class 2
        let y = ctx
            .from_slice(&[1.0, 1.0, 1.0, 0.0, 0.0, 0.0], 6, 1)
            .unwrap();

        let params = MultiLogRegParams::default().with_verbose(false);
        let betas = multi_log_reg(&ctx, &x, &y, &params).unwrap();
        assert_eq!(betas.shape(), vidar::VidarShape::new(2, 1));

        let labels = ctx
            .from_slice(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0], 6, 1)
            .unwrap();
        let (_, predicted, accuracy) = multi_log_reg_predict(&ctx, &x, &betas, &labels, false)
            .unwrap()
            .compute()
            .unwrap();
        assert_eq!(predicted.data(), &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        assert_eq!(accuracy, 100.0);
    }

    #[test]
    fn rejects_bad_inputs() {
        let ctx = ctx();
        let x = ctx.fill(1.0, 4, 2).unwrap();
        let params = MultiLogRegParams::default().with_verbose(false);

        let wrong_rows = ctx.fill(1.0, 3, 1).unwrap();
        assert!(matches!(
            multi_log_reg(&ctx, &x, &wrong_rows, &params),
            Err(AlgorithmError::LabelShape(..))
        ));

        let one_class = ctx.fill(1.0, 4, 1).unwrap();
        assert!(matches!(
            multi_log_reg(&ctx, &x, &one_class, &params),
            Err(AlgorithmError::TooFewClasses(_))
        ));

        assert!(matches!(
            multi_log_reg(&ctx, &x, &one_class, &params.with_icpt(7)),
            Err(AlgorithmError::InvalidParameter(_))
        ));
    }

    #[test]
    fn retraining_on_new_data_compiles_no_new_plans() {
        // a single worker keeps the parallel sums in a fixed order
        let ctx = VidarContext::with_config(VidarConfig::default().with_threads(1)).unwrap();
        let n = 40;
        let features = (0..n)
            .flat_map(|i| [(i % 7) as f64 - 3.0, ((i * 3) % 5) as f64 - 2.0, 1.0])
            .collect::<Vec<_>>();
        let labels = (0..n)
            .map(|i| (1 + (i * 7 + i / 3) % 3) as f64)
            .collect::<Vec<_>>();
        let y = ctx.from_slice(&labels, n, 1).unwrap();
        let params = MultiLogRegParams::default()
            .with_icpt(0)
            .with_reg(0.0)
            .with_maxi(20)
            .with_verbose(false);

        let x = ctx.from_slice(&features, n, 3).unwrap();
        let betas = multi_log_reg(&ctx, &x, &y, &params).unwrap().compute().unwrap();
        let compiled = ctx.compiled_plans();

        // doubled features walk the same path with every step size scaled
        let doubled = features.iter().map(|v| v * 2.0).collect::<Vec<_>>();
        let x = ctx.from_slice(&doubled, n, 3).unwrap();
        let halved = multi_log_reg(&ctx, &x, &y, &params).unwrap().compute().unwrap();

        assert_eq!(ctx.compiled_plans(), compiled);
        for (b, h) in betas.data().iter().zip(halved.data()) {
            assert!((b - 2.0 * h).abs() <= 1e-9 * b.abs().max(1.0), "{b} vs {h}");
        }
    }

    #[test]
    fn non_finite_labels_are_rejected() {
        let ctx = ctx();
        let x = ctx.from_slice(&[0.0, 0.1, 5.0, 5.1], 4, 1).unwrap();
        let params = MultiLogRegParams::default().with_verbose(false);

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let y = ctx.from_slice(&[1.0, bad, 2.0, 2.0], 4, 1).unwrap();
            assert!(matches!(
                multi_log_reg(&ctx, &x, &y, &params),
                Err(AlgorithmError::NonFiniteLabels(..))
            ));
        }
    }

    #[test]
    fn nan_features_are_zeroed() {
        let ctx = ctx();
        let x = ctx
            .from_slice(&[f64::NAN, 0.1, 0.2, 5.0, 5.1, 5.2], 6, 1)
            .unwrap();
        let y = ctx
            .from_slice(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0], 6, 1)
            .unwrap();

        let params = MultiLogRegParams::default().with_verbose(false);
        let betas = multi_log_reg(&ctx, &x, &y, &params).unwrap().compute().unwrap();
        assert!(betas.data().iter().all(|b| b.is_finite()));
    }
}
