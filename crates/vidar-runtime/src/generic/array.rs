use crate::{generic::device::VidarDevice, platforms::VidarPlatform};
use std::{any::Any, sync::Arc};
use thiserror::Error;
use vidar_ir::ir::VidarShape;

pub type VidarBuffer = Arc<dyn VidarArray + Send + Sync>;

/// A dense row-major matrix of `f64` living on a device.
pub trait VidarArray {
    fn shape(&self) -> VidarShape;

    fn rows(&self) -> usize {
        self.shape().rows
    }

    fn cols(&self) -> usize {
        self.shape().cols
    }

    fn len(&self) -> usize {
        self.shape().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn size_bytes(&self) -> usize {
        std::mem::size_of::<f64>() * self.len()
    }

    // backends downcast this to reach their own storage
    #[doc(hidden)]
    fn get_inner_as_any(&self) -> &dyn Any;

    // device -> host
    fn to_vec(&self) -> Vec<f64>;

    fn get_device(&self) -> Arc<dyn VidarDevice + Send + Sync>;

    fn platform(&self) -> VidarPlatform {
        self.get_device().platform()
    }
}

pub trait VidarArrayFactory {
    // host -> device
    fn create_from_iter_device<I>(
        &self,
        device: &(dyn VidarDevice + Send + Sync),
        shape: VidarShape,
        iter: I,
    ) -> Result<VidarBuffer, VidarArrayError>
    where
        I: IntoIterator<Item = f64>;

    fn platform(&self) -> VidarPlatform;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VidarArrayError {
    #[error("Vidar array error: {0}")]
    Generic(String),

    #[error("A Vidar array cannot be an empty buffer at initialization")]
    UnsizedError,

    #[error("Expected {0} values for a `{1}` matrix, instead received {2}")]
    LengthMismatch(usize, VidarShape, usize),

    #[error("`{0:?}` is an invalid platform for initializing this Vidar array")]
    InvalidPlatformError(VidarPlatform),
}
