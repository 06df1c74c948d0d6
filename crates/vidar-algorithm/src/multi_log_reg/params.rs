use crate::{error::AlgorithmError, param_err};

/// Training settings for [`multi_log_reg`](super::multi_log_reg).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiLogRegParams {
    /// 0 = no intercept, 1 = add an intercept column, 2 = add an intercept
    /// and standardize the feature columns.
    pub icpt: u8,
    /// L2 regularization weight.
    pub reg: f64,
    /// Stop once the gradient norm falls below `tol` times its initial value.
    pub tol: f64,
    /// Maximum number of outer (Newton) iterations.
    pub maxi: usize,
    /// Maximum number of inner (conjugate gradient) iterations, 0 = no limit.
    pub maxii: usize,
    pub verbose: bool,
}

impl Default for MultiLogRegParams {
    fn default() -> Self {
        Self {
            icpt: 2,
            reg: 1e-5,
            tol: 1e-6,
            maxi: 100,
            maxii: 20,
            verbose: true,
        }
    }
}

impl MultiLogRegParams {
    pub fn with_icpt(mut self, icpt: u8) -> Self {
        self.icpt = icpt;
        self
    }

    pub fn with_reg(mut self, reg: f64) -> Self {
        self.reg = reg;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_maxi(mut self, maxi: usize) -> Self {
        self.maxi = maxi;
        self
    }

    pub fn with_maxii(mut self, maxii: usize) -> Self {
        self.maxii = maxii;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validate(&self) -> Result<(), AlgorithmError> {
        if self.icpt > 2 {
            return param_err!("`icpt` must be 0, 1 or 2, got {}", self.icpt);
        }
        if !(self.reg >= 0.0) {
            return param_err!("`reg` must be non-negative, got {}", self.reg);
        }
        if !(self.tol >= 0.0) {
            return param_err!("`tol` must be non-negative, got {}", self.tol);
        }
        Ok(())
    }
}
