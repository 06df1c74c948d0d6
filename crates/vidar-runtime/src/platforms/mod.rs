use serde::{Deserialize, Serialize};

// supported platforms
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum VidarPlatform {
    Cpu,
    // GPU backends are planned to slot in here
}
