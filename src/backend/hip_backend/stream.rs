//! Reference-counted HIP stream handle

use std::fmt;
use std::sync::Arc;

use crate::backend::hip_backend::error::HipResult;
use crate::backend::hip_backend::ffi;
use crate::backend::runtime::{DeviceRuntime, RawStream};

/// Stream creation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamFlags(pub u32);

impl StreamFlags {
    pub const DEFAULT: StreamFlags = StreamFlags(ffi::HIP_STREAM_DEFAULT);
    /// Does not implicitly synchronize with the null stream
    pub const NON_BLOCKING: StreamFlags = StreamFlags(ffi::HIP_STREAM_NON_BLOCKING);

    pub fn bits(self) -> u32 {
        self.0
    }
}

struct StreamInner {
    raw: RawStream,
    device: i32,
    flags: StreamFlags,
    runtime: Arc<dyn DeviceRuntime>,
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        tracing::debug!(
            "HipStream: destroying stream {:#x} on device {}",
            self.raw.0,
            self.device
        );
        if let Err(e) = self.runtime.stream_destroy(self.raw) {
            tracing::warn!("HipStream: failed to destroy stream {:#x}: {}", self.raw.0, e);
        }
    }
}

/// Shared handle to one device stream.
///
/// Cloning (or [`retain`](Self::retain)) adds an owner; dropping (or
/// [`free`](Self::free)) removes one. The native stream is destroyed exactly
/// once, when the last owner goes away, so no owner can ever observe a
/// destroyed stream.
#[derive(Clone)]
pub struct HipStream {
    inner: Arc<StreamInner>,
}

impl HipStream {
    /// Create a stream on the calling thread's current device
    pub fn new(runtime: Arc<dyn DeviceRuntime>, flags: StreamFlags) -> HipResult<Self> {
        let device = runtime.current_device()?;
        tracing::debug!(
            "HipStream::new: creating {} stream on device {} (flags={:#x})",
            runtime.name(),
            device,
            flags.bits()
        );
        let raw = runtime.stream_create(flags.bits())?;

        Ok(HipStream {
            inner: Arc::new(StreamInner {
                raw,
                device,
                flags,
                runtime,
            }),
        })
    }

    pub fn with_default_flags(runtime: Arc<dyn DeviceRuntime>) -> HipResult<Self> {
        Self::new(runtime, StreamFlags::DEFAULT)
    }

    /// Add an owner; pair with exactly one [`free`](Self::free) or drop
    pub fn retain(&self) -> HipStream {
        self.clone()
    }

    /// Give up this owner's reference. The stream is destroyed when the
    /// last reference is freed.
    pub fn free(self) {
        drop(self)
    }

    /// Number of owners currently holding this stream
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Device the stream was created on
    pub fn device(&self) -> i32 {
        self.inner.device
    }

    pub fn flags(&self) -> StreamFlags {
        self.inner.flags
    }

    /// Native handle (for FFI calls such as hipMemcpyAsync)
    pub fn as_raw(&self) -> RawStream {
        self.inner.raw
    }

    pub fn runtime(&self) -> &Arc<dyn DeviceRuntime> {
        &self.inner.runtime
    }

    /// Whether both handles refer to the same native stream
    pub fn same_stream(&self, other: &HipStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Block the host until all work on this stream has finished.
    ///
    /// This is a blocking call; allocator paths never use it.
    pub fn synchronize(&self) -> HipResult<()> {
        self.inner.runtime.stream_synchronize(self.inner.raw)
    }
}

impl fmt::Debug for HipStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HipStream")
            .field("raw", &format_args!("{:#x}", self.inner.raw.0))
            .field("device", &self.inner.device)
            .field("flags", &self.inner.flags)
            .field("refcount", &self.refcount())
            .finish()
    }
}
