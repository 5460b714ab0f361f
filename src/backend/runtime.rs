//! Driver interface consumed by streams, events and the host allocators.
//!
//! Everything above this trait is driver-agnostic. [`HipRuntime`] binds it to
//! ROCm (feature `rocm`); [`SimulatedRuntime`] is the host-only stand-in used
//! by tests and by machines without a GPU.
//!
//! [`HipRuntime`]: crate::backend::HipRuntime
//! [`SimulatedRuntime`]: crate::backend::SimulatedRuntime

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::backend::hip_backend::HipResult;

/// Opaque native stream handle value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawStream(pub(crate) usize);

impl RawStream {
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        RawStream(ptr as usize)
    }

    /// Raw pointer form for FFI calls
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

/// Opaque native event handle value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawEvent(pub(crate) usize);

impl RawEvent {
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        RawEvent(ptr as usize)
    }

    /// Raw pointer form for FFI calls
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

/// Result of a non-blocking event query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// The device has not reached the recorded point yet
    Pending,
    /// All work enqueued before the record has finished
    Complete,
}

/// Device driver primitives.
///
/// Implementations must be callable from any host thread. Only
/// [`stream_synchronize`](Self::stream_synchronize) and
/// [`event_synchronize`](Self::event_synchronize) may block on the device.
pub trait DeviceRuntime: Send + Sync + fmt::Debug {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Device bound to the calling thread
    fn current_device(&self) -> HipResult<i32>;

    /// Allocate `size` bytes of page-locked host memory
    fn host_alloc(&self, size: usize, flags: u32) -> HipResult<NonNull<c_void>>;

    /// Release memory returned by [`host_alloc`](Self::host_alloc)
    ///
    /// # Safety
    ///
    /// `ptr` must come from `host_alloc` on this runtime, must not have been
    /// released already, and no device work may still reference it.
    unsafe fn host_free(&self, ptr: NonNull<c_void>) -> HipResult<()>;

    fn stream_create(&self, flags: u32) -> HipResult<RawStream>;

    fn stream_destroy(&self, stream: RawStream) -> HipResult<()>;

    /// Block until all work on `stream` has finished
    fn stream_synchronize(&self, stream: RawStream) -> HipResult<()>;

    /// Create an event on `device`
    fn event_create(&self, device: i32, flags: u32) -> HipResult<RawEvent>;

    fn event_destroy(&self, event: RawEvent) -> HipResult<()>;

    /// Enqueue `event` on `stream`. Never waits.
    fn event_record(&self, event: RawEvent, stream: RawStream) -> HipResult<()>;

    /// Non-blocking completion check
    fn event_query(&self, event: RawEvent) -> HipResult<EventStatus>;

    /// Block until `event` has completed
    fn event_synchronize(&self, event: RawEvent) -> HipResult<()>;
}
