//! Process-wide allocator after it has been initialized

use std::sync::Arc;

use pinforge::backend::SimulatedRuntime;
use pinforge::{caching_host_allocator, install_caching_host_allocator, CachingHostAllocator, HostAllocError};
use serial_test::serial;

#[test]
#[serial]
fn test_second_install_is_rejected() {
    caching_host_allocator();
    let other = CachingHostAllocator::with_runtime(Arc::new(SimulatedRuntime::new()));
    let err = install_caching_host_allocator(other).unwrap_err();
    assert!(matches!(err, HostAllocError::AlreadyInitialized));
    assert!(err.is_user_error());
}
