pub mod error;
pub mod plan;

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};
use vidar_runtime::generic::{compiler::VidarPlatformPlan, runtime::PlanCacheKey};

use crate::{
    cpu_platform_device::{VidarCpuDevice, VidarCpuPlatformDevices},
    runtime::error::CpuError,
};

pub static VIDAR_CPU_RUNTIME: LazyLock<Option<Arc<VidarCpuRuntime>>> =
    LazyLock::new(|| VidarCpuRuntime::init(None).map(Arc::new));

pub struct VidarCpuRuntime {
    pub(crate) platform_devices: VidarCpuPlatformDevices,

    // Cache
    pub(crate) plans: Mutex<HashMap<PlanCacheKey, Arc<dyn VidarPlatformPlan>>>,
    pub(crate) compiled_plans: Arc<AtomicUsize>,
}

impl VidarCpuRuntime {
    pub fn init(threads: Option<usize>) -> Option<Self> {
        match Self::init_err(threads) {
            Ok(runtime) => Some(runtime),
            Err(err) => {
                log::debug!(
                    "Failed to establish the CPU backend.\nERR: {:?}",
                    err.to_string()
                );

                None
            }
        }
    }

    /// Builds a runtime with one device, using all available cores unless a
    /// thread count is given.
    pub fn init_err(threads: Option<usize>) -> Result<Self, CpuError> {
        let threads = threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let device = VidarCpuDevice::new(threads)?;
        log::debug!("Initialized CPU device `{}`", device.name);

        Ok(Self {
            platform_devices: VidarCpuPlatformDevices {
                devices: vec![device],
            },
            plans: Mutex::new(HashMap::new()),
            compiled_plans: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn device(&self, idx: usize) -> Option<&VidarCpuDevice> {
        self.platform_devices.devices.get(idx)
    }

    /// Number of plans compiled by this runtime so far, cached or not.
    pub fn compiled_plans(&self) -> usize {
        self.compiled_plans.load(Ordering::Relaxed)
    }

    pub fn cached_plans(&self) -> usize {
        self.plans.lock().len()
    }
}
