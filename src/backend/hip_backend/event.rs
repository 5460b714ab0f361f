//! HIP event wrapper for tracking asynchronous completion

use std::fmt;
use std::sync::Arc;

use crate::backend::hip_backend::error::HipResult;
use crate::backend::hip_backend::stream::HipStream;
use crate::backend::runtime::{DeviceRuntime, EventStatus, RawEvent};

/// Owned device event, destroyed on drop
pub struct HipEvent {
    raw: RawEvent,
    device: i32,
    runtime: Arc<dyn DeviceRuntime>,
}

impl HipEvent {
    /// Create an event on `device`
    ///
    /// Use `HIP_EVENT_DISABLE_TIMING` for events used only for
    /// synchronization.
    pub fn new(runtime: Arc<dyn DeviceRuntime>, device: i32, flags: u32) -> HipResult<Self> {
        let raw = runtime.event_create(device, flags)?;
        tracing::trace!(
            "HipEvent::new: created event {:#x} on device {} (flags={:#x})",
            raw.0,
            device,
            flags
        );
        Ok(HipEvent { raw, device, runtime })
    }

    /// Enqueue this event on `stream`. Does not wait.
    pub fn record(&self, stream: &HipStream) -> HipResult<()> {
        tracing::trace!(
            "HipEvent::record: event {:#x} on stream {:#x}",
            self.raw.0,
            stream.as_raw().0
        );
        self.runtime.event_record(self.raw, stream.as_raw())
    }

    /// Non-blocking check whether the device has reached this event
    pub fn query(&self) -> HipResult<bool> {
        Ok(self.runtime.event_query(self.raw)? == EventStatus::Complete)
    }

    /// Block the host until this event completes.
    ///
    /// This is a blocking call; allocator paths never use it.
    pub fn synchronize(&self) -> HipResult<()> {
        self.runtime.event_synchronize(self.raw)
    }

    pub fn device(&self) -> i32 {
        self.device
    }

    pub fn as_raw(&self) -> RawEvent {
        self.raw
    }
}

impl fmt::Debug for HipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HipEvent")
            .field("raw", &format_args!("{:#x}", self.raw.0))
            .field("device", &self.device)
            .finish()
    }
}

impl Drop for HipEvent {
    fn drop(&mut self) {
        tracing::trace!("HipEvent::drop: destroying event {:#x}", self.raw.0);
        if let Err(e) = self.runtime.event_destroy(self.raw) {
            tracing::warn!("HipEvent::drop: failed to destroy event {:#x}: {}", self.raw.0, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::hip_backend::ffi::HIP_EVENT_DISABLE_TIMING;
    use crate::backend::sim::SimulatedRuntime;

    #[test]
    fn test_record_query_synchronize() {
        let rt = Arc::new(SimulatedRuntime::manual());
        let stream = HipStream::with_default_flags(rt.clone()).unwrap();
        let event = HipEvent::new(rt.clone(), stream.device(), HIP_EVENT_DISABLE_TIMING).unwrap();

        event.record(&stream).unwrap();
        assert!(!event.query().unwrap());

        event.synchronize().unwrap();
        assert!(event.query().unwrap());
    }

    #[test]
    fn test_drop_destroys_event() {
        let rt = Arc::new(SimulatedRuntime::new());
        let event = HipEvent::new(rt.clone(), 0, HIP_EVENT_DISABLE_TIMING).unwrap();
        assert_eq!(rt.live_events(), 1);
        drop(event);
        assert_eq!(rt.live_events(), 0);
        assert_eq!(rt.counters().events_destroyed, 1);
    }
}
