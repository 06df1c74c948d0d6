use std::sync::{Arc, LazyLock};

use vidar_ir::ir::VidarShape;
use vidar_runtime::{
    generic::{
        array::{VidarArray, VidarArrayError, VidarArrayFactory, VidarBuffer},
        device::VidarDevice,
    },
    platforms::VidarPlatform,
};

use crate::{cpu_platform_device::VidarCpuDevice, runtime::error::CpuError};

pub struct VidarCpuArray {
    shape: VidarShape,
    data: Arc<Vec<f64>>,
    device: Arc<VidarCpuDevice>,
}

impl VidarCpuArray {
    pub(crate) fn from_data(
        device: Arc<VidarCpuDevice>,
        shape: VidarShape,
        data: Arc<Vec<f64>>,
    ) -> Self {
        debug_assert_eq!(shape.len(), data.len());
        Self {
            shape,
            data,
            device,
        }
    }

    fn from_host<I>(
        device: &(dyn VidarDevice + Send + Sync),
        shape: VidarShape,
        iter: I,
    ) -> Result<Self, VidarArrayError>
    where
        I: IntoIterator<Item = f64>,
    {
        let cpu_device = if VidarPlatform::Cpu == device.platform() {
            let binding = device.as_platform_device();
            match binding.downcast_ref::<VidarCpuDevice>() {
                Some(d) => Arc::new(d.clone()),
                None => return Err(VidarArrayError::Generic(CpuError::DeviceDowncast.to_string())),
            }
        } else {
            return Err(VidarArrayError::InvalidPlatformError(device.platform()));
        };

        let data = iter.into_iter().collect::<Vec<_>>();
        if data.is_empty() || shape.is_empty() {
            return Err(VidarArrayError::UnsizedError);
        }
        if data.len() != shape.len() {
            return Err(VidarArrayError::LengthMismatch(shape.len(), shape, data.len()));
        }

        Ok(Self::from_data(cpu_device, shape, Arc::new(data)))
    }

    /// Shared storage of a buffer produced by this backend.
    pub(crate) fn storage(buffer: &VidarBuffer) -> Result<Arc<Vec<f64>>, CpuError> {
        buffer
            .get_inner_as_any()
            .downcast_ref::<Arc<Vec<f64>>>()
            .cloned()
            .ok_or(CpuError::BufferDowncast)
    }
}

impl VidarArray for VidarCpuArray {
    fn shape(&self) -> VidarShape {
        self.shape
    }

    fn get_inner_as_any(&self) -> &dyn std::any::Any {
        &self.data
    }

    fn to_vec(&self) -> Vec<f64> {
        self.data.as_ref().clone()
    }

    fn get_device(&self) -> Arc<dyn VidarDevice + Send + Sync> {
        self.device.clone()
    }
}

pub static VIDAR_CPU_ARR_FACTORY: LazyLock<VidarCpuArrFactory> =
    LazyLock::new(VidarCpuArrFactory::default);

#[derive(Default)]
pub struct VidarCpuArrFactory;

impl VidarArrayFactory for VidarCpuArrFactory {
    fn create_from_iter_device<I>(
        &self,
        device: &(dyn VidarDevice + Send + Sync),
        shape: VidarShape,
        iter: I,
    ) -> Result<VidarBuffer, VidarArrayError>
    where
        I: IntoIterator<Item = f64>,
    {
        Ok(Arc::new(VidarCpuArray::from_host(device, shape, iter)?))
    }

    fn platform(&self) -> VidarPlatform {
        VidarPlatform::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_round_trip_and_validation() {
        let device = VidarCpuDevice::new(1).unwrap();
        let shape = VidarShape::new(2, 3);

        let arr = VIDAR_CPU_ARR_FACTORY
            .create_from_iter_device(&device, shape, (0..6).map(|v| v as f64))
            .unwrap();
        assert_eq!(arr.shape(), shape);
        assert_eq!(arr.to_vec(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(arr.size_bytes(), 48);

        assert_eq!(
            VIDAR_CPU_ARR_FACTORY
                .create_from_iter_device(&device, shape, vec![1.0; 5])
                .err(),
            Some(VidarArrayError::LengthMismatch(6, shape, 5))
        );
        assert_eq!(
            VIDAR_CPU_ARR_FACTORY
                .create_from_iter_device(&device, VidarShape::new(0, 3), vec![])
                .err(),
            Some(VidarArrayError::UnsizedError)
        );
    }
}
