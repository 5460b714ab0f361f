//! Reference-counted stream handles and their interaction with the allocator

mod common;

use std::sync::Arc;

use common::SimFixture;
use pinforge::backend::{EventStatus, SimulatedRuntime};
use pinforge::{DeviceRuntime, HipEvent, HipStream, StreamFlags};

#[test]
fn test_refcount_follows_retain_and_free() {
    let rt = Arc::new(SimulatedRuntime::manual());
    let stream = HipStream::new(rt.clone(), StreamFlags::NON_BLOCKING).unwrap();
    assert_eq!(stream.refcount(), 1);
    assert_eq!(stream.flags(), StreamFlags::NON_BLOCKING);

    let second = stream.retain();
    let third = stream.retain();
    assert_eq!(stream.refcount(), 3);
    assert!(second.same_stream(&third));

    second.free();
    third.free();
    assert_eq!(rt.counters().streams_destroyed, 0);
    assert_eq!(stream.refcount(), 1);

    stream.free();
    assert_eq!(rt.counters().streams_destroyed, 1);
    assert_eq!(rt.live_streams(), 0);
}

#[test]
fn test_handles_can_be_freed_on_other_threads() {
    let rt = Arc::new(SimulatedRuntime::manual());
    let stream = HipStream::with_default_flags(rt.clone()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let h = stream.retain();
            std::thread::spawn(move || h.free())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(stream.refcount(), 1);
    drop(stream);
    assert_eq!(rt.counters().streams_destroyed, 1);
}

#[test]
fn test_creation_failure_is_a_device_error() {
    let rt = Arc::new(SimulatedRuntime::manual());
    rt.fail_next_stream_create();
    assert!(HipStream::with_default_flags(rt.clone()).is_err());
    assert_eq!(rt.live_streams(), 0);
    assert!(HipStream::with_default_flags(rt).is_ok());
}

#[test]
fn test_event_reports_stream_progress() {
    let rt = Arc::new(SimulatedRuntime::manual());
    let stream = HipStream::with_default_flags(rt.clone()).unwrap();
    let event = HipEvent::new(rt.clone(), stream.device(), 0).unwrap();

    event.record(&stream).unwrap();
    assert!(!event.query().unwrap());
    assert_eq!(rt.event_query(event.as_raw()).unwrap(), EventStatus::Pending);

    stream.synchronize().unwrap();
    assert!(event.query().unwrap());
}

#[test]
fn test_allocator_keeps_stream_alive_until_obligation_settles() {
    let fx = SimFixture::manual();
    let stream = fx.stream();
    let raw = stream.as_raw();

    let ptr = fx.alloc.allocate(64).unwrap();
    fx.alloc.record_event(ptr, &stream).unwrap();
    fx.alloc.free(ptr).unwrap();

    // Caller drops its handle; the pending obligation still owns one
    drop(stream);
    assert_eq!(fx.runtime.live_streams(), 1);
    assert_eq!(fx.alloc.process_events().unwrap(), 0);

    fx.runtime.complete_stream(raw);
    assert_eq!(fx.alloc.process_events().unwrap(), 1);
    assert_eq!(fx.runtime.live_streams(), 0);
    assert_eq!(fx.runtime.counters().streams_destroyed, 1);
}
