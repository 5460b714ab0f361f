//! Caching allocator for pinned host memory
//!
//! Drop-in replacement for [`DirectHostAllocator`](super::DirectHostAllocator)
//! that recycles freed pinned blocks instead of handing them back to the
//! driver, avoiding the device synchronization that `hipHostFree` implies.
//!
//! # Contract
//!
//! [`record_event`](CachingHostAllocator::record_event) must be called every
//! time a pointer from this allocator is used in an asynchronous host/device
//! copy, with the stream the copy was issued on. A freed block is not handed
//! out again until every event recorded against it has completed. The
//! allocator cannot detect a missing call.
//!
//! # Block lifecycle
//!
//! ```text
//! fresh -> live -> (free) -> draining -> (events complete) -> quiet -> live
//!                        \-> quiet (no events)                    \-> released
//! ```
//!
//! Blocks are never split: a cache hit returns the smallest quiet block that
//! fits, whole. Nothing here waits on the device except
//! [`synchronize_pending`](CachingHostAllocator::synchronize_pending).

use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{DeviceRuntime, HipEvent, HipStream};
use crate::error::{HostAllocError, HostAllocResult};
use crate::memory::block::{Block, BlockInfo, BlockState, PendingEvent, PinnedPtr};
use crate::memory::config::CachingHostConfig;
use crate::memory::registry::{BlockRegistry, Freed};
use crate::memory::stats::{Counters, EmptyCacheReport, HostCacheStats, ReleaseFailure, ShutdownReport};
use crate::memory::HostAllocator;

#[derive(Debug, Default)]
struct AllocatorState {
    registry: BlockRegistry,
    counters: Counters,
}

impl AllocatorState {
    fn take_cached(&mut self, size: usize) -> Option<PinnedPtr> {
        let (ptr, block_size) = self.registry.reuse_best_fit(size)?;
        self.counters.cache_hits += 1;
        tracing::trace!(
            "CachingHostAllocator: cache hit for {} bytes -> {:?} ({} byte block)",
            size,
            ptr,
            block_size
        );
        Some(ptr)
    }
}

/// Caching pinned host allocator; see the module docs for the contract
#[derive(Debug)]
pub struct CachingHostAllocator {
    runtime: Arc<dyn DeviceRuntime>,
    config: CachingHostConfig,
    state: Mutex<AllocatorState>,
}

impl CachingHostAllocator {
    pub fn new(runtime: Arc<dyn DeviceRuntime>, config: CachingHostConfig) -> Self {
        tracing::debug!(
            "CachingHostAllocator::new: runtime={}, caching_enabled={}",
            runtime.name(),
            config.caching_enabled
        );
        CachingHostAllocator {
            runtime,
            config,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    pub fn with_runtime(runtime: Arc<dyn DeviceRuntime>) -> Self {
        Self::new(runtime, CachingHostConfig::default())
    }

    pub fn runtime(&self) -> &Arc<dyn DeviceRuntime> {
        &self.runtime
    }

    pub fn config(&self) -> &CachingHostConfig {
        &self.config
    }

    /// Allocate at least `size` bytes of pinned memory.
    ///
    /// Serves the smallest quiet cached block that fits. On a miss, settles
    /// completed events and looks again before asking the driver for exactly
    /// `size` bytes. Driver exhaustion is reported as
    /// [`HostAllocError::HostOom`]; retrying is up to the caller.
    pub fn allocate(&self, size: usize) -> HostAllocResult<PinnedPtr> {
        if size == 0 {
            return Err(HostAllocError::ZeroSize);
        }

        let (hit, to_release) = {
            let mut guard = self.state.lock()?;
            let state = &mut *guard;
            match state.take_cached(size) {
                Some(ptr) => (Some(ptr), Vec::new()),
                None => {
                    let (_, to_release) = self.reconcile_locked(state);
                    (state.take_cached(size), to_release)
                }
            }
        };
        self.release_detached(to_release);

        match hit {
            Some(ptr) => Ok(ptr),
            None => self.allocate_fresh(size),
        }
    }

    fn allocate_fresh(&self, size: usize) -> HostAllocResult<PinnedPtr> {
        let device = self.runtime.current_device()?;

        // The driver call may synchronize; keep it outside the registry lock.
        let raw = self
            .runtime
            .host_alloc(size, self.config.host_alloc_flags)
            .map_err(|e| HostAllocError::from_host_alloc(size, e))?;
        let ptr = PinnedPtr::new(raw);

        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Never hand out memory the registry cannot account for.
                // SAFETY: `raw` came from host_alloc on this runtime just above
                // and was never registered or handed out.
                if let Err(e) = unsafe { self.runtime.host_free(raw) } {
                    tracing::error!("CachingHostAllocator: failed to return {:?}: {}", ptr, e);
                }
                return Err(poisoned.into());
            }
        };
        let state = &mut *guard;
        state.registry.insert_live(Block::fresh(ptr, size, device));
        state.counters.on_driver_alloc(size);

        tracing::trace!(
            "CachingHostAllocator: cache miss, allocated {} pinned bytes at {:?} on device {}",
            size,
            ptr,
            device
        );
        Ok(ptr)
    }

    /// Return a block to the allocator.
    ///
    /// The memory is not released to the driver. Without recorded events the
    /// block is reusable at once; otherwise it drains until they complete.
    pub fn free(&self, ptr: PinnedPtr) -> HostAllocResult<()> {
        let to_release = {
            let mut guard = self.state.lock()?;
            let state = &mut *guard;
            match state.registry.free_live(ptr.addr()) {
                None => {
                    tracing::error!("CachingHostAllocator::free: {:?} is not a live block", ptr);
                    return Err(HostAllocError::InvalidPointer(ptr.addr()));
                }
                Some(Freed::Draining) => {
                    tracing::trace!("CachingHostAllocator::free: {:?} draining", ptr);
                    None
                }
                Some(Freed::Quiet(block)) if self.config.caching_enabled => {
                    tracing::trace!("CachingHostAllocator::free: {:?} cached", ptr);
                    state.registry.insert_quiet(block);
                    None
                }
                Some(Freed::Quiet(block)) => Some(block),
            }
        };

        if let Some(block) = to_release {
            let report = self.release_detached(vec![block]);
            if let Some(failure) = report.failures.into_iter().next() {
                return Err(HostAllocError::Device(failure.error));
            }
        }
        Ok(())
    }

    /// Record that `ptr` is used by work enqueued on `stream`.
    ///
    /// Enqueues an event on `stream`; the block will not be reused until the
    /// device passes it. Valid for live and draining blocks.
    pub fn record_event(&self, ptr: PinnedPtr, stream: &HipStream) -> HostAllocResult<()> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;

        let block = state
            .registry
            .tracked_mut(ptr.addr())
            .ok_or(HostAllocError::InvalidPointer(ptr.addr()))?;

        let event = HipEvent::new(stream.runtime().clone(), stream.device(), self.config.event_flags)?;
        event.record(stream)?;

        block.pending.push(PendingEvent {
            stream: stream.retain(),
            event: Arc::new(event),
        });
        state.counters.events_recorded += 1;

        tracing::trace!(
            "CachingHostAllocator::record_event: {:?} on stream {:?} ({} pending)",
            ptr,
            stream.as_raw(),
            block.pending.len()
        );
        Ok(())
    }

    /// Settle completed events without waiting. Returns how many blocks
    /// became reusable (or were released when caching is disabled).
    pub fn process_events(&self) -> HostAllocResult<usize> {
        let (quiesced, to_release) = {
            let mut guard = self.state.lock()?;
            self.reconcile_locked(&mut guard)
        };
        self.release_detached(to_release);
        Ok(quiesced)
    }

    /// Release every quiet cached block to the driver.
    ///
    /// Completed events are settled first. Live and draining blocks are left
    /// alone; this never waits for in-flight transfers. A failed release is
    /// reported and does not stop the sweep.
    pub fn empty_cache(&self) -> HostAllocResult<EmptyCacheReport> {
        let blocks = {
            let mut guard = self.state.lock()?;
            let (_, mut blocks) = self.reconcile_locked(&mut guard);
            blocks.extend(guard.registry.take_all_quiet());
            blocks
        };

        let report = self.release_detached(blocks);
        tracing::debug!(
            "CachingHostAllocator::empty_cache: released {} blocks ({} bytes), {} failures",
            report.released_blocks,
            report.released_bytes,
            report.failures.len()
        );
        Ok(report)
    }

    /// Block the host until every draining block's events have completed,
    /// then settle them.
    ///
    /// This is a blocking call for callers that prefer reclaiming memory over
    /// host progress. No other allocator operation calls it.
    pub fn synchronize_pending(&self) -> HostAllocResult<usize> {
        let events = self.state.lock()?.registry.draining_events();
        tracing::debug!(
            "CachingHostAllocator::synchronize_pending: waiting on {} events",
            events.len()
        );
        for event in &events {
            event.synchronize()?;
        }
        drop(events);
        self.process_events()
    }

    /// State of the block at `ptr`, if the allocator owns one there
    pub fn block_info(&self, ptr: PinnedPtr) -> HostAllocResult<Option<BlockInfo>> {
        Ok(self.state.lock()?.registry.info(ptr.addr()))
    }

    pub fn stats(&self) -> HostAllocResult<HostCacheStats> {
        let state = self.state.lock()?;
        Ok(HostCacheStats::from_parts(state.registry.counts(), &state.counters))
    }

    /// Settle events, empty the cache, and report blocks still outstanding.
    ///
    /// Outstanding blocks are logged and left allocated: their memory may
    /// still be in use by the caller or the device.
    pub fn shutdown(&self) -> HostAllocResult<ShutdownReport> {
        let released = self.empty_cache()?;
        let (leaked_live, leaked_draining): (Vec<BlockInfo>, Vec<BlockInfo>) = self
            .state
            .lock()?
            .registry
            .tracked_infos()
            .into_iter()
            .partition(|info| info.state == BlockState::Live);

        if !leaked_live.is_empty() || !leaked_draining.is_empty() {
            tracing::warn!(
                "CachingHostAllocator shutdown: {} live block(s) ({} bytes) and {} draining block(s) ({} bytes) outstanding",
                leaked_live.len(),
                leaked_live.iter().map(|b| b.size).sum::<usize>(),
                leaked_draining.len(),
                leaked_draining.iter().map(|b| b.size).sum::<usize>()
            );
            for info in leaked_live.iter().chain(&leaked_draining) {
                tracing::debug!("  outstanding: {:?}", info);
            }
        }

        Ok(ShutdownReport {
            released,
            leaked_live,
            leaked_draining,
        })
    }

    /// Returns (blocks that became quiet, blocks to release outside the lock)
    fn reconcile_locked(&self, state: &mut AllocatorState) -> (usize, Vec<Block>) {
        let swept = state.registry.reconcile();
        state.counters.events_completed += swept.events_completed;
        let quiesced = swept.quiesced.len();

        if self.config.caching_enabled {
            for block in swept.quiesced {
                state.registry.insert_quiet(block);
            }
            (quiesced, Vec::new())
        } else {
            (quiesced, swept.quiesced)
        }
    }

    /// Hand detached quiet blocks back to the driver
    fn release_detached(&self, blocks: Vec<Block>) -> EmptyCacheReport {
        let mut report = EmptyCacheReport::default();
        if blocks.is_empty() {
            return report;
        }

        let mut dropped = Vec::with_capacity(blocks.len());
        for block in blocks {
            debug_assert_eq!(block.state(), BlockState::Quiet);
            // SAFETY: the block came from host_alloc on this runtime, was
            // detached from the registry, and has no outstanding events.
            match unsafe { self.runtime.host_free(block.ptr.as_non_null()) } {
                Ok(()) => {
                    report.released_blocks += 1;
                    report.released_bytes += block.size;
                    dropped.push((block.size, true));
                }
                Err(error) => {
                    tracing::error!(
                        "CachingHostAllocator: releasing {:?} ({} bytes) failed: {}",
                        block.ptr,
                        block.size,
                        error
                    );
                    report.failures.push(ReleaseFailure {
                        ptr: block.ptr,
                        size: block.size,
                        error,
                    });
                    dropped.push((block.size, false));
                }
            }
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for (size, released) in dropped {
            state.counters.on_block_dropped(size, released);
        }
        report
    }
}

impl HostAllocator for CachingHostAllocator {
    fn allocate(&self, size: usize) -> HostAllocResult<PinnedPtr> {
        CachingHostAllocator::allocate(self, size)
    }

    fn free(&self, ptr: PinnedPtr) -> HostAllocResult<()> {
        CachingHostAllocator::free(self, ptr)
    }

    fn record_event(&self, ptr: PinnedPtr, stream: &HipStream) -> HostAllocResult<()> {
        CachingHostAllocator::record_event(self, ptr, stream)
    }
}

impl Drop for CachingHostAllocator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("CachingHostAllocator::drop: shutdown failed: {}", e);
        }
    }
}
