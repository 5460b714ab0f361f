//! Pinned blocks and their outstanding stream obligations

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::backend::{HipEvent, HipStream};

// SAFETY: PinnedPtr is an address token. The allocator never dereferences it;
// callers synchronize access to the pointed-to memory themselves.
unsafe impl Send for PinnedPtr {}
unsafe impl Sync for PinnedPtr {}

/// Address of a pinned host allocation
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinnedPtr(NonNull<c_void>);

impl PinnedPtr {
    pub(crate) fn new(ptr: NonNull<c_void>) -> Self {
        PinnedPtr(ptr)
    }

    /// Wrap a raw pointer, e.g. one handed back by C code. `None` for null.
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(PinnedPtr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    pub fn as_non_null(self) -> NonNull<c_void> {
        self.0
    }

    /// Numeric address, the registry key
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for PinnedPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinnedPtr({:#x})", self.addr())
    }
}

/// Where a block sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Handed out to a caller
    Live,
    /// Freed, but recorded events have not all completed
    Draining,
    /// Freed with no outstanding events; eligible for reuse
    Quiet,
}

/// An event recorded on `stream` that must complete before the block's
/// memory may be handed out again
#[derive(Debug)]
pub struct PendingEvent {
    // Holding the stream keeps it alive until the obligation is settled.
    pub(crate) stream: HipStream,
    pub(crate) event: Arc<HipEvent>,
}

/// One pinned allocation owned by the allocator
#[derive(Debug)]
pub struct Block {
    pub(crate) ptr: PinnedPtr,
    pub(crate) size: usize,
    pub(crate) device: i32,
    pub(crate) allocated: bool,
    pub(crate) pending: Vec<PendingEvent>,
}

impl Block {
    /// Fresh block straight from the driver, already handed out
    pub(crate) fn fresh(ptr: PinnedPtr, size: usize, device: i32) -> Self {
        Block {
            ptr,
            size,
            device,
            allocated: true,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> BlockState {
        if self.allocated {
            BlockState::Live
        } else if self.pending.is_empty() {
            BlockState::Quiet
        } else {
            BlockState::Draining
        }
    }

    pub fn info(&self) -> BlockInfo {
        BlockInfo {
            ptr: self.ptr,
            size: self.size,
            device: self.device,
            state: self.state(),
            pending_events: self.pending.len(),
        }
    }
}

/// Read-only view of a block for introspection and leak reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub ptr: PinnedPtr,
    pub size: usize,
    pub device: i32,
    pub state: BlockState,
    pub pending_events: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::hip_backend::ffi::HIP_EVENT_DISABLE_TIMING;
    use crate::backend::SimulatedRuntime;

    fn fake_ptr(addr: usize) -> PinnedPtr {
        PinnedPtr::from_raw(addr as *mut c_void).unwrap()
    }

    #[test]
    fn test_from_raw_rejects_null() {
        assert!(PinnedPtr::from_raw(std::ptr::null_mut()).is_none());
        assert_eq!(fake_ptr(0x4000).addr(), 0x4000);
    }

    #[test]
    fn test_block_state_transitions() {
        let rt = Arc::new(SimulatedRuntime::manual());
        let mut block = Block::fresh(fake_ptr(0x1000), 256, 0);
        assert_eq!(block.state(), BlockState::Live);

        let stream = HipStream::with_default_flags(rt.clone()).unwrap();
        let event = HipEvent::new(rt, 0, HIP_EVENT_DISABLE_TIMING).unwrap();
        block.pending.push(PendingEvent {
            stream,
            event: Arc::new(event),
        });
        assert_eq!(block.state(), BlockState::Live);

        block.allocated = false;
        assert_eq!(block.state(), BlockState::Draining);
        assert_eq!(block.info().pending_events, 1);

        block.pending.clear();
        assert_eq!(block.state(), BlockState::Quiet);
    }
}
