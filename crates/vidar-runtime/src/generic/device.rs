use std::hash::{DefaultHasher, Hash, Hasher};

use thiserror::Error;

use crate::platforms::VidarPlatform;

pub trait VidarDevice {
    fn device_name(&self) -> String;

    // in bytes
    fn memory_size(&self) -> usize;

    // worker threads used by kernels on this device
    fn threads(&self) -> usize;

    fn as_platform_device(&self) -> Box<dyn std::any::Any>;

    fn platform(&self) -> VidarPlatform;

    fn get_id(&self) -> DeviceNameID;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceNameID(u64);

fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

impl DeviceNameID {
    pub fn new(device_name: &str) -> Self {
        Self(calculate_hash(&device_name))
    }

    pub fn get_id(&self) -> u64 {
        self.0
    }
}

pub trait VidarDeviceManager {
    fn get_device(&self, idx: usize) -> Option<&(dyn VidarDevice + Send + Sync)>;

    fn num_devices(&self) -> usize;

    fn get_device_name(&self, idx: usize) -> Option<String> {
        self.get_device(idx).map(|device| device.device_name())
    }

    fn get_device_memory_size(&self, idx: usize) -> usize {
        if let Some(device) = self.get_device(idx) {
            device.memory_size()
        } else {
            0
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error(
        "Device at index `{0}` is out of range, only `{1}` Vidar supported devices are available"
    )]
    OutOfRange(usize, usize),

    #[error("No Vidar supported device could be initialized")]
    NoDevice,
}
