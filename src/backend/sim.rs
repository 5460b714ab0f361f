//! Host-only simulated device runtime (dummy backend pattern)
//!
//! Host memory comes from the Rust global allocator, so returned addresses are
//! real, unique and writable. Streams are modelled as two counters: `recorded`
//! grows by one per recorded event and `completed` says how far the
//! "device" has progressed. An event recorded at ticket `t` is complete once
//! `completed >= t`.
//!
//! In [`CompletionMode::Immediate`] every record completes at once, which is
//! what a synchronous copy path looks like. In [`CompletionMode::Manual`] the
//! test drives progress with [`SimulatedRuntime::complete_stream`],
//! [`SimulatedRuntime::complete_through`] and
//! [`SimulatedRuntime::complete_all`].

use std::alloc::{self, Layout};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::backend::hip_backend::{HipError, HipResult};
use crate::backend::runtime::{DeviceRuntime, EventStatus, RawEvent, RawStream};

/// Alignment of simulated pinned allocations (one page, like hipHostMalloc)
pub const SIM_HOST_ALIGNMENT: usize = 4096;

const FIRST_HANDLE: usize = 0x1000;
const HANDLE_STRIDE: usize = 0x10;

/// How recorded events reach completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Every recorded event is complete as soon as it is recorded
    #[default]
    Immediate,
    /// Events stay pending until the test advances the stream
    Manual,
}

/// Snapshot of driver calls observed by the simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub host_allocs: usize,
    pub host_frees: usize,
    pub host_bytes_outstanding: usize,
    pub streams_created: usize,
    pub streams_destroyed: usize,
    pub events_created: usize,
    pub events_recorded: usize,
    pub events_destroyed: usize,
}

#[derive(Debug)]
struct SimStream {
    recorded: u64,
    completed: u64,
}

#[derive(Debug)]
struct SimEvent {
    // (stream handle, ticket) of the most recent record
    recorded_on: Option<(usize, u64)>,
}

#[derive(Debug)]
struct SimState {
    device: i32,
    mode: CompletionMode,
    next_handle: usize,
    host_allocs: HashMap<usize, Layout>,
    streams: HashMap<usize, SimStream>,
    events: HashMap<usize, SimEvent>,
    host_alloc_limit: Option<usize>,
    fail_next_stream_create: bool,
    fail_next_event_create: bool,
    failing_frees: HashSet<usize>,
    counters: SimCounters,
}

impl SimState {
    fn next_handle(&mut self) -> usize {
        let handle = self.next_handle;
        self.next_handle += HANDLE_STRIDE;
        handle
    }
}

/// Simulated [`DeviceRuntime`] for tests and GPU-less hosts
#[derive(Debug)]
pub struct SimulatedRuntime {
    state: Mutex<SimState>,
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRuntime {
    /// Runtime whose events complete as soon as they are recorded
    pub fn new() -> Self {
        Self::with_mode(CompletionMode::Immediate)
    }

    /// Runtime whose events complete only when the caller says so
    pub fn manual() -> Self {
        Self::with_mode(CompletionMode::Manual)
    }

    pub fn with_mode(mode: CompletionMode) -> Self {
        SimulatedRuntime {
            state: Mutex::new(SimState {
                device: 0,
                mode,
                next_handle: FIRST_HANDLE,
                host_allocs: HashMap::new(),
                streams: HashMap::new(),
                events: HashMap::new(),
                host_alloc_limit: None,
                fail_next_stream_create: false,
                fail_next_event_create: false,
                failing_frees: HashSet::new(),
                counters: SimCounters::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Device reported by `current_device` from now on
    pub fn set_device(&self, device: i32) {
        self.state().device = device;
    }

    pub fn completion_mode(&self) -> CompletionMode {
        self.state().mode
    }

    /// Let the device catch up with everything recorded on `stream`
    pub fn complete_stream(&self, stream: RawStream) {
        if let Some(s) = self.state().streams.get_mut(&stream.0) {
            s.completed = s.recorded;
        }
    }

    /// Advance the stream `event` was recorded on up to that event
    pub fn complete_through(&self, event: RawEvent) {
        let mut state = self.state();
        let Some((stream, ticket)) = state.events.get(&event.0).and_then(|e| e.recorded_on) else {
            return;
        };
        if let Some(s) = state.streams.get_mut(&stream) {
            s.completed = s.completed.max(ticket);
        }
    }

    /// Let the device catch up on every stream
    pub fn complete_all(&self) {
        for s in self.state().streams.values_mut() {
            s.completed = s.recorded;
        }
    }

    /// Cap the simulated pinned pool; `None` removes the cap
    pub fn set_host_alloc_limit(&self, limit: Option<usize>) {
        self.state().host_alloc_limit = limit;
    }

    /// Make the next `stream_create` fail with a device error
    pub fn fail_next_stream_create(&self) {
        self.state().fail_next_stream_create = true;
    }

    /// Make the next `event_create` fail with a device error
    pub fn fail_next_event_create(&self) {
        self.state().fail_next_event_create = true;
    }

    /// Make the next `host_free` of `addr` fail; the memory stays owned by
    /// the runtime and is reclaimed when the runtime is dropped
    pub fn fail_host_free(&self, addr: usize) {
        self.state().failing_frees.insert(addr);
    }

    pub fn counters(&self) -> SimCounters {
        self.state().counters.clone()
    }

    pub fn live_streams(&self) -> usize {
        self.state().streams.len()
    }

    pub fn live_events(&self) -> usize {
        self.state().events.len()
    }

    /// Whether `addr` is currently a simulated pinned allocation
    pub fn owns_host_allocation(&self, addr: usize) -> bool {
        self.state().host_allocs.contains_key(&addr)
    }
}

impl DeviceRuntime for SimulatedRuntime {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn current_device(&self) -> HipResult<i32> {
        Ok(self.state().device)
    }

    fn host_alloc(&self, size: usize, _flags: u32) -> HipResult<NonNull<c_void>> {
        let mut state = self.state();

        if let Some(limit) = state.host_alloc_limit {
            if state.counters.host_bytes_outstanding + size > limit {
                return Err(HipError::MemoryAllocationFailed(format!(
                    "pinned host memory exhausted: {} bytes requested, {} of {} in use",
                    size, state.counters.host_bytes_outstanding, limit
                )));
            }
        }

        let layout = Layout::from_size_align(size.max(1), SIM_HOST_ALIGNMENT).map_err(|e| {
            HipError::MemoryAllocationFailed(format!("invalid layout for {} bytes: {}", size, e))
        })?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<c_void>()).ok_or_else(|| {
            HipError::MemoryAllocationFailed(format!("host allocator returned null for {} bytes", size))
        })?;

        state.host_allocs.insert(ptr.as_ptr() as usize, layout);
        state.counters.host_allocs += 1;
        state.counters.host_bytes_outstanding += layout.size();
        Ok(ptr)
    }

    unsafe fn host_free(&self, ptr: NonNull<c_void>) -> HipResult<()> {
        let addr = ptr.as_ptr() as usize;
        let mut state = self.state();

        if state.failing_frees.remove(&addr) {
            return Err(HipError::MemoryReleaseFailed(format!(
                "simulated release failure at {:#x}",
                addr
            )));
        }

        let layout = state
            .host_allocs
            .remove(&addr)
            .ok_or_else(|| HipError::InvalidHandle(format!("unknown host allocation {:#x}", addr)))?;

        alloc::dealloc(ptr.as_ptr().cast::<u8>(), layout);
        state.counters.host_frees += 1;
        state.counters.host_bytes_outstanding -= layout.size();
        Ok(())
    }

    fn stream_create(&self, _flags: u32) -> HipResult<RawStream> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_stream_create) {
            return Err(HipError::DeviceError("simulated stream creation failure".to_string()));
        }

        let handle = state.next_handle();
        state.streams.insert(handle, SimStream { recorded: 0, completed: 0 });
        state.counters.streams_created += 1;
        Ok(RawStream(handle))
    }

    fn stream_destroy(&self, stream: RawStream) -> HipResult<()> {
        let mut state = self.state();
        state
            .streams
            .remove(&stream.0)
            .ok_or_else(|| HipError::InvalidHandle(format!("unknown stream {:#x}", stream.0)))?;
        state.counters.streams_destroyed += 1;
        Ok(())
    }

    fn stream_synchronize(&self, stream: RawStream) -> HipResult<()> {
        let mut state = self.state();
        let s = state
            .streams
            .get_mut(&stream.0)
            .ok_or_else(|| HipError::InvalidHandle(format!("unknown stream {:#x}", stream.0)))?;
        s.completed = s.recorded;
        Ok(())
    }

    fn event_create(&self, _device: i32, _flags: u32) -> HipResult<RawEvent> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_event_create) {
            return Err(HipError::DeviceError("simulated event creation failure".to_string()));
        }

        let handle = state.next_handle();
        state.events.insert(handle, SimEvent { recorded_on: None });
        state.counters.events_created += 1;
        Ok(RawEvent(handle))
    }

    fn event_destroy(&self, event: RawEvent) -> HipResult<()> {
        let mut state = self.state();
        state
            .events
            .remove(&event.0)
            .ok_or_else(|| HipError::InvalidHandle(format!("unknown event {:#x}", event.0)))?;
        state.counters.events_destroyed += 1;
        Ok(())
    }

    fn event_record(&self, event: RawEvent, stream: RawStream) -> HipResult<()> {
        let mut state = self.state();
        let immediate = state.mode == CompletionMode::Immediate;

        if !state.events.contains_key(&event.0) {
            return Err(HipError::InvalidHandle(format!("unknown event {:#x}", event.0)));
        }
        let s = state
            .streams
            .get_mut(&stream.0)
            .ok_or_else(|| HipError::InvalidHandle(format!("unknown stream {:#x}", stream.0)))?;

        s.recorded += 1;
        let ticket = s.recorded;
        if immediate {
            s.completed = s.recorded;
        }

        if let Some(e) = state.events.get_mut(&event.0) {
            e.recorded_on = Some((stream.0, ticket));
        }
        state.counters.events_recorded += 1;
        Ok(())
    }

    fn event_query(&self, event: RawEvent) -> HipResult<EventStatus> {
        let state = self.state();
        let e = state
            .events
            .get(&event.0)
            .ok_or_else(|| HipError::InvalidHandle(format!("unknown event {:#x}", event.0)))?;

        let status = match e.recorded_on {
            // Never recorded: HIP reports such events as complete.
            None => EventStatus::Complete,
            Some((stream, ticket)) => match state.streams.get(&stream) {
                Some(s) if s.completed < ticket => EventStatus::Pending,
                // A destroyed stream has drained all its work.
                _ => EventStatus::Complete,
            },
        };
        Ok(status)
    }

    fn event_synchronize(&self, event: RawEvent) -> HipResult<()> {
        let mut state = self.state();
        let recorded_on = state
            .events
            .get(&event.0)
            .ok_or_else(|| HipError::InvalidHandle(format!("unknown event {:#x}", event.0)))?
            .recorded_on;

        if let Some((stream, ticket)) = recorded_on {
            if let Some(s) = state.streams.get_mut(&stream) {
                s.completed = s.completed.max(ticket);
            }
        }
        Ok(())
    }
}

impl Drop for SimulatedRuntime {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (addr, layout) in state.host_allocs.drain() {
            // SAFETY: every entry was produced by alloc_zeroed with this layout.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
    }
}
