//! Compute device queries.

use vigur::ComputeDevice;

/// Device the engine will run on: 0 CPU, 1 CUDA, 2 Metal.
#[unsafe(no_mangle)]
pub extern "C" fn get_active_device() -> i32 {
    ComputeDevice::best_available() as i32
}

/// Whether a device code is usable in this build: 1 available, 0 not.
/// Unknown codes are unavailable.
#[unsafe(no_mangle)]
pub extern "C" fn is_device_available(device: i32) -> i32 {
    let available = ComputeDevice::from_code(device)
        .map(|d| d.is_available())
        .unwrap_or(false);
    i32::from(available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_device_is_available() {
        assert_eq!(is_device_available(get_active_device()), 1);
    }

    #[test]
    fn cpu_is_always_available() {
        assert_eq!(is_device_available(0), 1);
    }

    #[test]
    fn unknown_code_is_unavailable() {
        assert_eq!(is_device_available(99), 0);
        assert_eq!(is_device_available(-1), 0);
    }
}
