pub mod array;
pub mod cpu_platform_device;
pub(crate) mod kernels;
pub mod runtime;

//    backend specific types
/* ------------------------------------------ */
pub type CpuArray = array::VidarCpuArray;

pub type CpuDevice = cpu_platform_device::VidarCpuDevice;
/* ------------------------------------------ */

pub use runtime::{VIDAR_CPU_RUNTIME, VidarCpuRuntime, error::CpuError};
pub use vidar_runtime::generic::array::{VidarArray, VidarArrayFactory, VidarBuffer};
pub use vidar_runtime::generic::device::{VidarDevice, VidarDeviceManager};
pub use vidar_runtime::generic::runtime::VidarRuntime;
