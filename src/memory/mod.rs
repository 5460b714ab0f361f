//! Pinned host memory allocation
//!
//! Page-locked host buffers are needed for asynchronous host/device copies,
//! but allocating and releasing them is expensive: release implicitly
//! synchronizes the device. [`CachingHostAllocator`] keeps freed blocks and
//! hands them out again once every stream that used them has moved past the
//! recorded events.
//!
//! # Pattern
//!
//! 1. `allocate(size)` returns the smallest cached block that fits, or a fresh
//!    driver allocation
//! 2. after enqueuing a copy, `record_event(ptr, &stream)`
//! 3. `free(ptr)` parks the block until its events complete
//! 4. `empty_cache()` returns idle blocks to the driver

pub mod block;
pub mod caching_host;
pub mod config;
pub mod direct;
pub mod global;
pub mod registry;
pub mod stats;

pub use block::{BlockInfo, BlockState, PinnedPtr};
pub use caching_host::CachingHostAllocator;
pub use config::CachingHostConfig;
pub use direct::DirectHostAllocator;
pub use global::{
    caching_host_allocator, install_caching_host_allocator, shutdown_caching_host_allocator,
};
pub use registry::RegistryCounts;
pub use stats::{EmptyCacheReport, HostCacheStats, ReleaseFailure, ShutdownReport};

use crate::backend::HipStream;
use crate::error::HostAllocResult;

/// Allocate/free pinned host memory with stream-use tracking
pub trait HostAllocator: Send + Sync {
    fn allocate(&self, size: usize) -> HostAllocResult<PinnedPtr>;

    fn free(&self, ptr: PinnedPtr) -> HostAllocResult<()>;

    /// Note that `ptr` is in use by work already enqueued on `stream`
    fn record_event(&self, ptr: PinnedPtr, stream: &HipStream) -> HostAllocResult<()>;
}
