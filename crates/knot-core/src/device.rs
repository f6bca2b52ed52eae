use std::fmt;

/// Where a value is (or will be) materialized.
///
/// Values in this crate only ever live in host memory; the GPU variant
/// exists so initialization requests can carry their target device through
/// to storage engines that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceDescriptor {
    #[default]
    Cpu,
    Gpu(u32),
}

impl DeviceDescriptor {
    pub fn cpu() -> Self {
        DeviceDescriptor::Cpu
    }

    pub fn gpu(id: u32) -> Self {
        DeviceDescriptor::Gpu(id)
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self, DeviceDescriptor::Cpu)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceDescriptor::Cpu => f.write_str("cpu"),
            DeviceDescriptor::Gpu(id) => write!(f, "gpu:{}", id),
        }
    }
}
