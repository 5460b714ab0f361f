//! Allocator statistics and sweep reports

use crate::backend::HipError;
use crate::memory::block::{BlockInfo, PinnedPtr};
use crate::memory::registry::RegistryCounts;

/// Running totals kept under the allocator lock
#[derive(Debug, Clone, Default)]
pub(crate) struct Counters {
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub driver_allocations: usize,
    pub driver_frees: usize,
    pub events_recorded: usize,
    pub events_completed: usize,
    pub reserved_bytes: usize,
    pub peak_reserved_bytes: usize,
}

impl Counters {
    pub fn on_driver_alloc(&mut self, size: usize) {
        self.cache_misses += 1;
        self.driver_allocations += 1;
        self.reserved_bytes += size;
        self.peak_reserved_bytes = self.peak_reserved_bytes.max(self.reserved_bytes);
    }

    /// Block removed from the registry, whether or not the driver release
    /// succeeded
    pub fn on_block_dropped(&mut self, size: usize, released: bool) {
        self.reserved_bytes = self.reserved_bytes.saturating_sub(size);
        if released {
            self.driver_frees += 1;
        }
    }
}

/// Snapshot of allocator state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostCacheStats {
    pub live_blocks: usize,
    pub live_bytes: usize,
    pub draining_blocks: usize,
    pub draining_bytes: usize,
    pub quiet_blocks: usize,
    pub quiet_bytes: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub driver_allocations: usize,
    pub driver_frees: usize,
    pub events_recorded: usize,
    pub events_completed: usize,
    /// Pinned bytes currently held from the driver
    pub reserved_bytes: usize,
    pub peak_reserved_bytes: usize,
}

impl HostCacheStats {
    pub(crate) fn from_parts(counts: RegistryCounts, counters: &Counters) -> Self {
        HostCacheStats {
            live_blocks: counts.live_blocks,
            live_bytes: counts.live_bytes,
            draining_blocks: counts.draining_blocks,
            draining_bytes: counts.draining_bytes,
            quiet_blocks: counts.quiet_blocks,
            quiet_bytes: counts.quiet_bytes,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            driver_allocations: counters.driver_allocations,
            driver_frees: counters.driver_frees,
            events_recorded: counters.events_recorded,
            events_completed: counters.events_completed,
            reserved_bytes: counters.reserved_bytes,
            peak_reserved_bytes: counters.peak_reserved_bytes,
        }
    }

    /// Fraction of allocations served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// A block whose driver release failed
#[derive(Debug, Clone)]
pub struct ReleaseFailure {
    pub ptr: PinnedPtr,
    pub size: usize,
    pub error: HipError,
}

/// Outcome of `empty_cache`
#[derive(Debug, Clone, Default)]
pub struct EmptyCacheReport {
    pub released_blocks: usize,
    pub released_bytes: usize,
    /// Blocks dropped from the registry whose release failed
    pub failures: Vec<ReleaseFailure>,
}

impl EmptyCacheReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of shutting the allocator down
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub released: EmptyCacheReport,
    /// Blocks still handed out to callers
    pub leaked_live: Vec<BlockInfo>,
    /// Blocks freed but still waiting on device work
    pub leaked_draining: Vec<BlockInfo>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.released.is_clean() && self.leaked_live.is_empty() && self.leaked_draining.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracks_high_water_mark() {
        let mut counters = Counters::default();
        counters.on_driver_alloc(100);
        counters.on_driver_alloc(50);
        counters.on_block_dropped(100, true);
        counters.on_driver_alloc(20);

        assert_eq!(counters.reserved_bytes, 70);
        assert_eq!(counters.peak_reserved_bytes, 150);
        assert_eq!(counters.driver_frees, 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = HostCacheStats {
            cache_hits: 3,
            cache_misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(HostCacheStats::default().hit_rate(), 0.0);
    }
}
