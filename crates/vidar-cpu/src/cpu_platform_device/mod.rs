use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use vidar_runtime::{
    generic::device::{DeviceNameID, VidarDevice},
    platforms::VidarPlatform,
};

use crate::runtime::error::CpuError;

#[derive(Clone)]
pub struct VidarCpuPlatformDevices {
    pub(crate) devices: Vec<VidarCpuDevice>,
}

#[derive(Clone)]
pub struct VidarCpuDevice {
    pub(crate) name: String,
    pub(crate) threads: usize,
    pub(crate) pool: Arc<ThreadPool>,
}

impl VidarCpuDevice {
    pub fn new(threads: usize) -> Result<Self, CpuError> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("vidar-cpu-{idx}"))
            .build()?;

        Ok(Self {
            name: format!("cpu ({threads} threads)"),
            threads,
            pool: Arc::new(pool),
        })
    }

    // runs `f` inside this device's worker pool
    pub(crate) fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }
}

#[cfg(unix)]
fn physical_memory() -> usize {
    let (pages, page_size) =
        unsafe { (libc::sysconf(libc::_SC_PHYS_PAGES), libc::sysconf(libc::_SC_PAGESIZE)) };

    if pages <= 0 || page_size <= 0 {
        0
    } else {
        pages as usize * page_size as usize
    }
}

#[cfg(not(unix))]
fn physical_memory() -> usize {
    0
}

impl VidarDevice for VidarCpuDevice {
    fn device_name(&self) -> String {
        self.name.clone()
    }

    fn memory_size(&self) -> usize {
        physical_memory()
    }

    fn threads(&self) -> usize {
        self.threads
    }

    fn as_platform_device(&self) -> Box<dyn std::any::Any> {
        Box::new(self.clone())
    }

    fn platform(&self) -> VidarPlatform {
        VidarPlatform::Cpu
    }

    fn get_id(&self) -> DeviceNameID {
        DeviceNameID::new(&self.name)
    }
}
