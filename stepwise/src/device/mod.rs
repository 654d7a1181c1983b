//! Device execution streams and their per-session lifetime management.
mod collection;
mod notification;
mod pool;
mod stream;

use serde::{Deserialize, Serialize};

pub use collection::DeviceStreamCollection;
pub use notification::Notification;
pub use pool::DeviceStreamPool;
pub use stream::{CpuStream, CpuStreamFactory, DeviceStream, StreamFactory, StreamHandle};

/// Hardware queue family a logic stream is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Cuda,
    Rocm,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
            Device::Rocm => "rocm",
        }
    }
}
