//! Block registry: every pinned block the allocator owns
//!
//! Two views over one set of blocks, each block in exactly one of them:
//! - `tracked`: live and draining blocks, keyed by address, for pointer
//!   validation on free/record_event
//! - `quiet`: freed blocks with no outstanding events, ordered by
//!   `(size, address)` so the smallest block that fits is one range lookup,
//!   with `quiet_sizes` mapping address to size for lookups by pointer

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::backend::HipEvent;
use crate::memory::block::{Block, BlockInfo, BlockState, PinnedPtr};

/// Result of freeing a live block
#[derive(Debug)]
pub(crate) enum Freed {
    /// No events outstanding: detached, caller decides whether to cache it
    Quiet(Block),
    /// Stays tracked until its events complete
    Draining,
}

/// Outcome of one reconciliation sweep
#[derive(Debug, Default)]
pub(crate) struct Reconciled {
    pub events_completed: usize,
    /// Blocks whose last event completed, detached from the registry
    pub quiesced: Vec<Block>,
}

/// Block counts and byte totals per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    pub live_blocks: usize,
    pub live_bytes: usize,
    pub draining_blocks: usize,
    pub draining_bytes: usize,
    pub quiet_blocks: usize,
    pub quiet_bytes: usize,
}

#[derive(Debug, Default)]
pub struct BlockRegistry {
    tracked: HashMap<usize, Block>,
    quiet: BTreeMap<(usize, usize), Block>,
    /// address -> size of every block in `quiet`
    quiet_sizes: HashMap<usize, usize>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a block that was just handed out
    pub(crate) fn insert_live(&mut self, block: Block) {
        debug_assert!(block.allocated);
        let previous = self.tracked.insert(block.ptr.addr(), block);
        debug_assert!(previous.is_none(), "driver returned an address that is still tracked");
    }

    /// Put a quiet block into the reuse index
    pub(crate) fn insert_quiet(&mut self, block: Block) {
        debug_assert_eq!(block.state(), BlockState::Quiet);
        self.quiet_sizes.insert(block.ptr.addr(), block.size);
        self.quiet.insert((block.size, block.ptr.addr()), block);
    }

    /// Hand out the smallest quiet block of at least `size` bytes
    pub(crate) fn reuse_best_fit(&mut self, size: usize) -> Option<(PinnedPtr, usize)> {
        let key = *self.quiet.range((size, 0)..).next()?.0;
        let mut block = self.quiet.remove(&key)?;
        self.quiet_sizes.remove(&key.1);
        block.allocated = true;
        let found = (block.ptr, block.size);
        self.insert_live(block);
        Some(found)
    }

    /// Mark a live block free. `None` if `addr` is not a live block.
    pub(crate) fn free_live(&mut self, addr: usize) -> Option<Freed> {
        let block = self.tracked.get_mut(&addr).filter(|b| b.allocated)?;
        block.allocated = false;

        if block.pending.is_empty() {
            self.tracked.remove(&addr).map(Freed::Quiet)
        } else {
            Some(Freed::Draining)
        }
    }

    /// Live or draining block at `addr`
    pub(crate) fn tracked_mut(&mut self, addr: usize) -> Option<&mut Block> {
        self.tracked.get_mut(&addr)
    }

    /// Drop completed events from draining blocks and detach the blocks left
    /// with none. Never waits; a failed query keeps its obligation.
    pub(crate) fn reconcile(&mut self) -> Reconciled {
        let mut out = Reconciled::default();

        let draining: Vec<usize> = self
            .tracked
            .iter()
            .filter(|(_, b)| !b.allocated)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in draining {
            let Some(block) = self.tracked.get_mut(&addr) else {
                continue;
            };

            let before = block.pending.len();
            block.pending.retain(|p| match p.event.query() {
                Ok(done) => !done,
                Err(e) => {
                    tracing::warn!(
                        "Event query failed for block {:#x} on stream {:?}: {}",
                        addr,
                        p.stream.as_raw(),
                        e
                    );
                    true
                }
            });
            out.events_completed += before - block.pending.len();

            if block.pending.is_empty() {
                if let Some(block) = self.tracked.remove(&addr) {
                    out.quiesced.push(block);
                }
            }
        }

        out
    }

    /// Detach every quiet block
    pub(crate) fn take_all_quiet(&mut self) -> Vec<Block> {
        self.quiet_sizes.clear();
        std::mem::take(&mut self.quiet).into_values().collect()
    }

    /// Events still outstanding on draining blocks
    pub(crate) fn draining_events(&self) -> Vec<Arc<HipEvent>> {
        self.tracked
            .values()
            .filter(|b| !b.allocated)
            .flat_map(|b| b.pending.iter().map(|p| p.event.clone()))
            .collect()
    }

    pub fn info(&self, addr: usize) -> Option<BlockInfo> {
        if let Some(block) = self.tracked.get(&addr) {
            return Some(block.info());
        }
        let size = *self.quiet_sizes.get(&addr)?;
        self.quiet.get(&(size, addr)).map(Block::info)
    }

    /// Live and draining blocks
    pub fn tracked_infos(&self) -> Vec<BlockInfo> {
        self.tracked.values().map(Block::info).collect()
    }

    pub fn counts(&self) -> RegistryCounts {
        let mut counts = RegistryCounts::default();
        for block in self.tracked.values() {
            if block.allocated {
                counts.live_blocks += 1;
                counts.live_bytes += block.size;
            } else {
                counts.draining_blocks += 1;
                counts.draining_bytes += block.size;
            }
        }
        counts.quiet_blocks = self.quiet.len();
        counts.quiet_bytes = self.quiet.values().map(|b| b.size).sum();
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty() && self.quiet.is_empty()
    }
}
