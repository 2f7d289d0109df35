//! Compute device selection.

/// Compute device used for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ComputeDevice {
    Cpu = 0,
    Cuda = 1,
    Metal = 2,
}

impl ComputeDevice {
    /// Whether this device is usable in the current build.
    pub fn is_available(&self) -> bool {
        match self {
            Self::Cpu => true,
            Self::Cuda => cfg!(feature = "cuda"),
            Self::Metal => cfg!(all(feature = "metal", target_os = "macos")),
        }
    }

    /// The best available device, preferring accelerators over CPU.
    pub fn best_available() -> ComputeDevice {
        if Self::Cuda.is_available() {
            Self::Cuda
        } else if Self::Metal.is_available() {
            Self::Metal
        } else {
            Self::Cpu
        }
    }

    pub fn from_code(code: i32) -> Option<ComputeDevice> {
        match code {
            0 => Some(Self::Cpu),
            1 => Some(Self::Cuda),
            2 => Some(Self::Metal),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Metal => "metal",
        }
    }
}
