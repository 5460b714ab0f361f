//! The process-wide caching host allocator
//!
//! Built lazily on first use from [`default_runtime`] and
//! [`CachingHostConfig::from_env`]. Embedders that need a specific runtime or
//! config install their own instance before anything touches the default.

use once_cell::sync::OnceCell;

use crate::backend::default_runtime;
use crate::error::{HostAllocError, HostAllocResult};
use crate::memory::caching_host::CachingHostAllocator;
use crate::memory::config::CachingHostConfig;
use crate::memory::stats::ShutdownReport;

static CACHING_HOST_ALLOCATOR: OnceCell<CachingHostAllocator> = OnceCell::new();

/// The shared allocator, created on first call
pub fn caching_host_allocator() -> &'static CachingHostAllocator {
    CACHING_HOST_ALLOCATOR.get_or_init(|| {
        tracing::debug!("Initializing process-wide caching host allocator");
        CachingHostAllocator::new(default_runtime(), CachingHostConfig::from_env())
    })
}

/// Install `alloc` as the shared allocator.
///
/// Fails with [`HostAllocError::AlreadyInitialized`] once the shared
/// allocator exists; the rejected instance is dropped (and shut down).
pub fn install_caching_host_allocator(
    alloc: CachingHostAllocator,
) -> HostAllocResult<&'static CachingHostAllocator> {
    CACHING_HOST_ALLOCATOR
        .try_insert(alloc)
        .map_err(|_| HostAllocError::AlreadyInitialized)
}

/// Run the shutdown sweep on the shared allocator, if it was ever created.
///
/// Statics are never dropped, so this is the only point where cached blocks
/// go back to the driver and leaks get reported. The allocator stays usable
/// afterwards.
pub fn shutdown_caching_host_allocator() -> HostAllocResult<Option<ShutdownReport>> {
    match CACHING_HOST_ALLOCATOR.get() {
        Some(alloc) => alloc.shutdown().map(Some),
        None => Ok(None),
    }
}
