//! pinforge - caching allocator for pinned host memory on AMD GPUs
//!
//! Page-locked host buffers are recycled across asynchronous host/device
//! copies. A freed buffer is only handed out again once every HIP stream
//! that used it has passed the event recorded for that use.
//!
//! ```ignore
//! use pinforge::{caching_host_allocator, HipStream};
//!
//! let alloc = caching_host_allocator();
//! let stream = HipStream::with_default_flags(alloc.runtime().clone())?;
//! let buf = alloc.allocate(1 << 20)?;
//! // ... enqueue an async copy from `buf` on `stream` ...
//! alloc.record_event(buf, &stream)?;
//! alloc.free(buf)?;
//! ```

pub mod backend;
pub mod error;
pub mod logging;
pub mod memory;

pub use backend::{default_runtime, DeviceRuntime, HipError, HipEvent, HipStream, SimulatedRuntime, StreamFlags};
pub use error::{ErrorCategory, HostAllocError, HostAllocResult};
pub use logging::init_logging_default;
pub use memory::{
    caching_host_allocator, install_caching_host_allocator, shutdown_caching_host_allocator,
    BlockInfo, BlockState, CachingHostAllocator, CachingHostConfig, DirectHostAllocator,
    EmptyCacheReport, HostAllocator, HostCacheStats, PinnedPtr, ShutdownReport,
};
