use std::ops::{Add, Div, Mul, Neg, Sub};

use vidar_ir::ir::{VidarBinOp, VidarOp, VidarUnOp};

use super::Matrix;
use crate::error::VidarError;

// Matrix-matrix operators check shapes and return a `Result`. Operators with
// an `f64` side cannot fail and return the handle directly.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<&Matrix> for &Matrix {
            type Output = Result<Matrix, VidarError>;

            fn $method(self, rhs: &Matrix) -> Self::Output {
                self.derive(VidarOp::Binary($op), &[rhs])
            }
        }

        impl $trait<Matrix> for &Matrix {
            type Output = Result<Matrix, VidarError>;

            fn $method(self, rhs: Matrix) -> Self::Output {
                self.derive(VidarOp::Binary($op), &[&rhs])
            }
        }

        impl $trait<&Matrix> for Matrix {
            type Output = Result<Matrix, VidarError>;

            fn $method(self, rhs: &Matrix) -> Self::Output {
                self.derive(VidarOp::Binary($op), &[rhs])
            }
        }

        impl $trait<Matrix> for Matrix {
            type Output = Result<Matrix, VidarError>;

            fn $method(self, rhs: Matrix) -> Self::Output {
                self.derive(VidarOp::Binary($op), &[&rhs])
            }
        }

        impl $trait<f64> for &Matrix {
            type Output = Matrix;

            fn $method(self, rhs: f64) -> Self::Output {
                self.with_scalar($op, rhs, false)
            }
        }

        impl $trait<f64> for Matrix {
            type Output = Matrix;

            fn $method(self, rhs: f64) -> Self::Output {
                self.with_scalar($op, rhs, false)
            }
        }

        impl $trait<&Matrix> for f64 {
            type Output = Matrix;

            fn $method(self, rhs: &Matrix) -> Self::Output {
                rhs.with_scalar($op, self, true)
            }
        }

        impl $trait<Matrix> for f64 {
            type Output = Matrix;

            fn $method(self, rhs: Matrix) -> Self::Output {
                rhs.with_scalar($op, self, true)
            }
        }
    };
}

impl_bin_op!(Add, add, VidarBinOp::Add);
impl_bin_op!(Sub, sub, VidarBinOp::Sub);
impl_bin_op!(Mul, mul, VidarBinOp::Mul);
impl_bin_op!(Div, div, VidarBinOp::Div);

impl Neg for &Matrix {
    type Output = Matrix;

    fn neg(self) -> Self::Output {
        self.map(VidarUnOp::Neg)
    }
}

impl Neg for Matrix {
    type Output = Matrix;

    fn neg(self) -> Self::Output {
        self.map(VidarUnOp::Neg)
    }
}

#[cfg(test)]
mod tests {
    use crate::{config::VidarConfig, context::VidarContext};

    #[test]
    fn scalar_operands_on_either_side() {
        let ctx = VidarContext::with_config(VidarConfig::default().with_threads(1)).unwrap();
        let x = ctx.from_slice(&[1.0, 2.0, 4.0], 1, 3).unwrap();

        assert_eq!((1.0 / &x).compute().unwrap().data(), &[1.0, 0.5, 0.25]);
        assert_eq!((10.0 - &x).compute().unwrap().data(), &[9.0, 8.0, 6.0]);
        assert_eq!((-&x * 3.0).compute().unwrap().data(), &[-3.0, -6.0, -12.0]);
        assert_eq!(
            (&x * &x).unwrap().compute().unwrap().data(),
            &[1.0, 4.0, 16.0]
        );
    }
}
