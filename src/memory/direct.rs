//! Non-caching pinned host allocator
//!
//! Every allocate/free goes straight to the driver. Used when caching is
//! unwanted and as the baseline the caching allocator is measured against.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::{DeviceRuntime, HipStream};
use crate::error::{HostAllocError, HostAllocResult};
use crate::memory::block::PinnedPtr;
use crate::memory::HostAllocator;

#[derive(Debug)]
pub struct DirectHostAllocator {
    runtime: Arc<dyn DeviceRuntime>,
    flags: u32,
    live: Mutex<HashMap<usize, usize>>,
}

impl DirectHostAllocator {
    pub fn new(runtime: Arc<dyn DeviceRuntime>, flags: u32) -> Self {
        DirectHostAllocator {
            runtime,
            flags,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Bytes currently handed out
    pub fn live_bytes(&self) -> HostAllocResult<usize> {
        Ok(self.live.lock()?.values().sum())
    }
}

impl HostAllocator for DirectHostAllocator {
    fn allocate(&self, size: usize) -> HostAllocResult<PinnedPtr> {
        if size == 0 {
            return Err(HostAllocError::ZeroSize);
        }
        let raw = self
            .runtime
            .host_alloc(size, self.flags)
            .map_err(|e| HostAllocError::from_host_alloc(size, e))?;
        let ptr = PinnedPtr::new(raw);
        self.live.lock()?.insert(ptr.addr(), size);
        Ok(ptr)
    }

    /// Releases immediately; the driver synchronizes as needed.
    fn free(&self, ptr: PinnedPtr) -> HostAllocResult<()> {
        if self.live.lock()?.remove(&ptr.addr()).is_none() {
            return Err(HostAllocError::InvalidPointer(ptr.addr()));
        }
        // SAFETY: the address was handed out by this allocator and removed
        // from the live set above, so it is released exactly once.
        unsafe { self.runtime.host_free(ptr.as_non_null()) }?;
        Ok(())
    }

    /// Nothing to track: the memory is not reused behind the caller's back.
    fn record_event(&self, ptr: PinnedPtr, _stream: &HipStream) -> HostAllocResult<()> {
        if self.live.lock()?.contains_key(&ptr.addr()) {
            Ok(())
        } else {
            Err(HostAllocError::InvalidPointer(ptr.addr()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::hip_backend::ffi::HIP_HOST_MALLOC_DEFAULT;
    use crate::backend::SimulatedRuntime;

    #[test]
    fn test_free_goes_to_driver() {
        let rt = Arc::new(SimulatedRuntime::new());
        let alloc = DirectHostAllocator::new(rt.clone(), HIP_HOST_MALLOC_DEFAULT);

        let ptr = alloc.allocate(100).unwrap();
        assert_eq!(alloc.live_bytes().unwrap(), 100);
        alloc.free(ptr).unwrap();

        assert_eq!(rt.counters().host_allocs, 1);
        assert_eq!(rt.counters().host_frees, 1);
        assert_eq!(alloc.live_bytes().unwrap(), 0);
    }

    #[test]
    fn test_rejects_unknown_pointers() {
        let rt = Arc::new(SimulatedRuntime::new());
        let alloc = DirectHostAllocator::new(rt.clone(), HIP_HOST_MALLOC_DEFAULT);
        let stream = HipStream::with_default_flags(rt).unwrap();

        let ptr = alloc.allocate(8).unwrap();
        alloc.record_event(ptr, &stream).unwrap();
        alloc.free(ptr).unwrap();

        assert!(matches!(alloc.free(ptr), Err(HostAllocError::InvalidPointer(_))));
        assert!(matches!(
            alloc.record_event(ptr, &stream),
            Err(HostAllocError::InvalidPointer(_))
        ));
        assert!(matches!(alloc.allocate(0), Err(HostAllocError::ZeroSize)));
    }
}
