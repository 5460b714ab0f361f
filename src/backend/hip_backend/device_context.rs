//! Thread-local HIP device tracking
//!
//! HIP device context is per-thread: `hipSetDevice()` only affects the
//! calling thread. Streams and events must be created while their device is
//! current, so the runtime consults this cache before every creation call.
//! [`DeviceGuard`] switches for the duration of one call and switches back.

use std::cell::Cell;
use std::ffi::CStr;
use std::thread_local;

use crate::backend::hip_backend::error::{HipError, HipResult};
use crate::backend::hip_backend::ffi;

thread_local! {
    static THREAD_DEVICE_ID: Cell<i32> = Cell::new(-1);
}

/// Human-readable message for a HIP status code
pub fn get_error_string(error: i32) -> String {
    // SAFETY: hipGetErrorString returns a pointer to a static C string or null.
    unsafe {
        let error_ptr = ffi::hipGetErrorString(error);
        if error_ptr.is_null() {
            format!("unknown HIP error {}", error)
        } else {
            CStr::from_ptr(error_ptr).to_string_lossy().into_owned()
        }
    }
}

/// Get the current HIP device for this thread, caching the answer
pub fn get_thread_device() -> HipResult<i32> {
    THREAD_DEVICE_ID.with(|cell| {
        let cached = cell.get();
        if cached >= 0 {
            return Ok(cached);
        }

        let mut device: i32 = -1;
        let result = unsafe { ffi::hipGetDevice(&mut device) };
        if result != ffi::HIP_SUCCESS {
            return Err(HipError::DeviceError(format!(
                "hipGetDevice failed: {}",
                get_error_string(result)
            )));
        }

        cell.set(device);
        Ok(device)
    })
}

/// Make `expected_device` current on this thread if it is not already
pub fn ensure_device(expected_device: i32) -> HipResult<()> {
    let current = get_thread_device()?;
    if current != expected_device {
        tracing::debug!(
            "Device mismatch: current={}, expected={}, calling hipSetDevice({})",
            current,
            expected_device,
            expected_device
        );

        let result = unsafe { ffi::hipSetDevice(expected_device) };
        if result != ffi::HIP_SUCCESS {
            return Err(HipError::DeviceError(format!(
                "hipSetDevice({}) failed: {}",
                expected_device,
                get_error_string(result)
            )));
        }

        THREAD_DEVICE_ID.with(|cell| cell.set(expected_device));
    }
    Ok(())
}

/// Scoped device switch: makes a device current and restores the previous
/// one on drop.
#[derive(Debug)]
#[must_use = "the previous device is restored when the guard is dropped"]
pub struct DeviceGuard {
    previous: i32,
}

impl DeviceGuard {
    /// Make `device` current, remembering the device that was current before.
    ///
    /// On error nothing was switched and no guard is returned.
    pub fn switch_to(device: i32) -> HipResult<Self> {
        let previous = get_thread_device()?;
        ensure_device(device)?;
        Ok(DeviceGuard { previous })
    }

    /// Device that becomes current again on drop
    pub fn previous(&self) -> i32 {
        self.previous
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        if let Err(e) = ensure_device(self.previous) {
            tracing::warn!("DeviceGuard: failed to restore device {}: {}", self.previous, e);
        }
    }
}
