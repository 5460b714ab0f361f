//! [`DeviceRuntime`] over the ROCm HIP runtime

use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::Once;

use crate::backend::hip_backend::device_context::{get_error_string, get_thread_device, DeviceGuard};
use crate::backend::hip_backend::error::{HipError, HipResult};
use crate::backend::hip_backend::ffi;
use crate::backend::runtime::{DeviceRuntime, EventStatus, RawEvent, RawStream};

/// Real HIP driver bindings
#[derive(Debug, Default, Clone, Copy)]
pub struct HipRuntime;

impl HipRuntime {
    /// Initialize HIP and verify at least one device exists
    pub fn new() -> HipResult<Self> {
        let result = unsafe { ffi::hipInit(0) };
        if result != ffi::HIP_SUCCESS {
            return Err(HipError::InitializationFailed(format!(
                "hipInit failed: {}",
                get_error_string(result)
            )));
        }

        let mut count: i32 = 0;
        let result = unsafe { ffi::hipGetDeviceCount(&mut count) };
        if result != ffi::HIP_SUCCESS {
            return Err(HipError::InitializationFailed(format!(
                "hipGetDeviceCount failed: {}",
                get_error_string(result)
            )));
        }
        if count == 0 {
            return Err(HipError::DeviceNotFound);
        }

        tracing::debug!("HipRuntime::new: {} HIP device(s) available", count);
        Ok(HipRuntime)
    }

    /// Probe once whether a HIP device can be used from this process
    pub fn gpu_available() -> bool {
        use std::sync::atomic::{AtomicBool, Ordering};

        static AVAILABLE: AtomicBool = AtomicBool::new(false);
        static INIT: Once = Once::new();

        INIT.call_once(|| {
            let available = std::panic::catch_unwind(|| HipRuntime::new().is_ok()).unwrap_or(false);
            if !available {
                tracing::debug!("HIP not available on this host");
            }
            AVAILABLE.store(available, Ordering::SeqCst);
        });

        AVAILABLE.load(Ordering::SeqCst)
    }
}

fn check(result: i32, what: &str) -> HipResult<()> {
    if result == ffi::HIP_SUCCESS {
        Ok(())
    } else {
        Err(HipError::DeviceError(format!(
            "{} failed: {}",
            what,
            get_error_string(result)
        )))
    }
}

impl DeviceRuntime for HipRuntime {
    fn name(&self) -> &'static str {
        "hip"
    }

    fn current_device(&self) -> HipResult<i32> {
        get_thread_device()
    }

    fn host_alloc(&self, size: usize, flags: u32) -> HipResult<NonNull<c_void>> {
        let mut ptr: *mut c_void = ptr::null_mut();
        tracing::trace!("HipRuntime::host_alloc: hipHostMalloc({} bytes, flags={:#x})", size, flags);
        let result = unsafe { ffi::hipHostMalloc(&mut ptr, size, flags) };

        if result != ffi::HIP_SUCCESS {
            tracing::error!(
                "HipRuntime::host_alloc: hipHostMalloc failed with code {} for {} bytes",
                result,
                size
            );
            return Err(HipError::from_host_malloc_status(
                result,
                size,
                &get_error_string(result),
            ));
        }

        NonNull::new(ptr).ok_or_else(|| {
            HipError::MemoryAllocationFailed(format!(
                "hipHostMalloc returned null pointer for {} bytes",
                size
            ))
        })
    }

    unsafe fn host_free(&self, ptr: NonNull<c_void>) -> HipResult<()> {
        let result = ffi::hipHostFree(ptr.as_ptr());
        if result != ffi::HIP_SUCCESS {
            return Err(HipError::MemoryReleaseFailed(format!(
                "hipHostFree({:?}) failed: {}",
                ptr,
                get_error_string(result)
            )));
        }
        Ok(())
    }

    fn stream_create(&self, flags: u32) -> HipResult<RawStream> {
        let mut stream: *mut c_void = ptr::null_mut();
        let result = unsafe { ffi::hipStreamCreateWithFlags(&mut stream, flags) };
        tracing::debug!(
            "HipRuntime::stream_create: hipStreamCreateWithFlags returned result={}, stream={:?}",
            result,
            stream
        );
        check(result, "hipStreamCreateWithFlags")?;

        if stream.is_null() {
            return Err(HipError::DeviceError(
                "hipStreamCreateWithFlags returned null pointer".to_string(),
            ));
        }
        Ok(RawStream::from_ptr(stream))
    }

    fn stream_destroy(&self, stream: RawStream) -> HipResult<()> {
        check(unsafe { ffi::hipStreamDestroy(stream.as_ptr()) }, "hipStreamDestroy")
    }

    fn stream_synchronize(&self, stream: RawStream) -> HipResult<()> {
        check(
            unsafe { ffi::hipStreamSynchronize(stream.as_ptr()) },
            "hipStreamSynchronize",
        )
    }

    fn event_create(&self, device: i32, flags: u32) -> HipResult<RawEvent> {
        // Events belong to the device current at creation time
        let _device = DeviceGuard::switch_to(device)?;

        let mut event: *mut c_void = ptr::null_mut();
        let result = unsafe { ffi::hipEventCreateWithFlags(&mut event, flags) };
        check(result, "hipEventCreateWithFlags")?;

        if event.is_null() {
            return Err(HipError::DeviceError(
                "hipEventCreateWithFlags returned null pointer".to_string(),
            ));
        }
        Ok(RawEvent::from_ptr(event))
    }

    fn event_destroy(&self, event: RawEvent) -> HipResult<()> {
        check(unsafe { ffi::hipEventDestroy(event.as_ptr()) }, "hipEventDestroy")
    }

    fn event_record(&self, event: RawEvent, stream: RawStream) -> HipResult<()> {
        check(
            unsafe { ffi::hipEventRecord(event.as_ptr(), stream.as_ptr()) },
            "hipEventRecord",
        )
    }

    fn event_query(&self, event: RawEvent) -> HipResult<EventStatus> {
        match unsafe { ffi::hipEventQuery(event.as_ptr()) } {
            ffi::HIP_SUCCESS => Ok(EventStatus::Complete),
            ffi::HIP_ERROR_NOT_READY => Ok(EventStatus::Pending),
            code => Err(HipError::DeviceError(format!(
                "hipEventQuery failed: {}",
                get_error_string(code)
            ))),
        }
    }

    fn event_synchronize(&self, event: RawEvent) -> HipResult<()> {
        check(
            unsafe { ffi::hipEventSynchronize(event.as_ptr()) },
            "hipEventSynchronize",
        )
    }
}
