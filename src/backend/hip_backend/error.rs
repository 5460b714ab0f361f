//! HIP error types

use thiserror::Error;

use crate::backend::hip_backend::ffi;

/// Driver-level failures reported by a [`DeviceRuntime`](crate::backend::DeviceRuntime)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HipError {
    #[error("HIP initialization failed: {0}")]
    InitializationFailed(String),
    #[error("Memory allocation failed: {0}")]
    MemoryAllocationFailed(String),
    #[error("Memory release failed: {0}")]
    MemoryReleaseFailed(String),
    #[error("Device not found")]
    DeviceNotFound,
    #[error("Device error: {0}")]
    DeviceError(String),
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
    #[error("Internal lock poisoned - this indicates a bug: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for HipError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        HipError::LockPoisoned(format!("Lock poisoned: {}", err))
    }
}

/// HIP result type
pub type HipResult<T> = Result<T, HipError>;

impl HipError {
    /// Check if this error is recoverable (temporary condition)
    ///
    /// Allocation failures may succeed after cached memory is released;
    /// device errors may clear once outstanding work drains. Missing
    /// devices, bad handles and poisoned locks never recover.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HipError::DeviceError(_)
                | HipError::MemoryAllocationFailed(_)
                | HipError::MemoryReleaseFailed(_)
        )
    }

    /// Check if this error is permanent (should never retry)
    pub fn is_permanent(&self) -> bool {
        !self.is_recoverable()
    }

    /// Map a failed `hipHostMalloc` status for a `size`-byte request.
    ///
    /// Only `hipErrorOutOfMemory` is an allocation failure; every other
    /// status is a driver error carrying `detail`.
    pub fn from_host_malloc_status(status: i32, size: usize, detail: &str) -> Self {
        if status == ffi::HIP_ERROR_OUT_OF_MEMORY {
            HipError::MemoryAllocationFailed(format!(
                "pinned host memory exhausted for {} bytes",
                size
            ))
        } else {
            HipError::DeviceError(format!(
                "hipHostMalloc failed for {} bytes (status {}): {}",
                size, status, detail
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(HipError::MemoryAllocationFailed("oom".into()).is_recoverable());
        assert!(HipError::DeviceError("busy".into()).is_recoverable());
        assert!(HipError::DeviceNotFound.is_permanent());
        assert!(HipError::InvalidHandle("0x0".into()).is_permanent());
    }

    #[test]
    fn test_host_malloc_out_of_memory_is_allocation_failure() {
        let err =
            HipError::from_host_malloc_status(ffi::HIP_ERROR_OUT_OF_MEMORY, 4096, "out of memory");
        assert!(matches!(err, HipError::MemoryAllocationFailed(_)));
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_host_malloc_other_status_is_device_error() {
        // hipErrorInvalidValue
        let err = HipError::from_host_malloc_status(1, 4096, "invalid argument");
        match &err {
            HipError::DeviceError(msg) => {
                assert!(msg.contains("status 1"), "got {}", msg);
                assert!(msg.contains("invalid argument"), "got {}", msg);
            }
            other => panic!("expected DeviceError, got {:?}", other),
        }

        // hipErrorNotInitialized
        let err = HipError::from_host_malloc_status(3, 64, "not initialized");
        assert!(!matches!(err, HipError::MemoryAllocationFailed(_)));
    }

    #[test]
    fn test_poison_error_maps_to_lock_poisoned() {
        let lock = std::sync::Arc::new(std::sync::Mutex::new(0u32));
        let clone = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: HipError = lock.lock().unwrap_err().into();
        assert!(matches!(err, HipError::LockPoisoned(_)));
    }
}
