//! HIP smoke tests for pinned host allocation on a real GPU
//!
//! Compiled only with `--features rocm`; each test skips when no device is
//! usable.

#![cfg(feature = "rocm")]

mod common;

use std::sync::Arc;

use common::{serial, GPU_RUNTIME};
use pinforge::backend::hip_backend::ffi::HIP_HOST_MALLOC_DEFAULT;
use pinforge::{
    BlockState, CachingHostAllocator, DeviceRuntime, DirectHostAllocator, HipStream, HostAllocator,
    StreamFlags,
};

fn runtime() -> Option<Arc<dyn DeviceRuntime>> {
    match GPU_RUNTIME.as_ref() {
        Some(rt) => Some(rt.clone() as Arc<dyn DeviceRuntime>),
        None => {
            eprintln!("GPU not available - test skipped");
            None
        }
    }
}

#[test]
#[serial]
fn test_stream_lifecycle() {
    let Some(rt) = runtime() else { return };

    let stream = HipStream::new(rt, StreamFlags::NON_BLOCKING).unwrap();
    let other = stream.retain();
    assert_eq!(stream.refcount(), 2);
    other.free();
    stream.synchronize().unwrap();
}

#[test]
#[serial]
fn test_caching_allocator_round_trip() {
    let Some(rt) = runtime() else { return };

    let alloc = CachingHostAllocator::with_runtime(rt.clone());
    let stream = HipStream::with_default_flags(rt).unwrap();

    let ptr = alloc.allocate(1 << 20).unwrap();
    // SAFETY: the block is live and 1 MiB long
    unsafe { std::ptr::write_bytes(ptr.as_ptr().cast::<u8>(), 0x5A, 1 << 20) };
    alloc.record_event(ptr, &stream).unwrap();
    alloc.free(ptr).unwrap();

    stream.synchronize().unwrap();
    alloc.process_events().unwrap();
    assert_eq!(alloc.block_info(ptr).unwrap().unwrap().state, BlockState::Quiet);
    assert_eq!(alloc.allocate(1 << 19).unwrap(), ptr);
    alloc.free(ptr).unwrap();

    let report = alloc.shutdown().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.released.released_blocks, 1);
}

#[test]
#[serial]
fn test_direct_allocator_round_trip() {
    let Some(rt) = runtime() else { return };

    let alloc = DirectHostAllocator::new(rt, HIP_HOST_MALLOC_DEFAULT);
    let ptr = alloc.allocate(4096).unwrap();
    alloc.free(ptr).unwrap();
    assert_eq!(alloc.live_bytes().unwrap(), 0);
}

#[test]
#[serial]
fn test_record_event_keeps_calling_device_current() {
    let Some(rt) = runtime() else { return };

    let before = rt.current_device().unwrap();
    let alloc = CachingHostAllocator::with_runtime(rt.clone());
    let stream = HipStream::with_default_flags(rt.clone()).unwrap();

    let ptr = alloc.allocate(4096).unwrap();
    alloc.record_event(ptr, &stream).unwrap();
    assert_eq!(rt.current_device().unwrap(), before);
    assert_eq!(alloc.block_info(ptr).unwrap().unwrap().device, before);

    alloc.free(ptr).unwrap();
    stream.synchronize().unwrap();
    assert!(alloc.shutdown().unwrap().is_clean());
}
