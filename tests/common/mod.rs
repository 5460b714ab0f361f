//! Shared fixtures for allocator integration tests
//!
//! Most tests run against a fresh manual-completion [`SimulatedRuntime`] so
//! they can decide exactly when the "device" finishes work. GPU tests share
//! one HIP runtime and skip when no device is present.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::SimFixture;
//!
//! #[test]
//! fn my_test() {
//!     let fx = SimFixture::manual();
//!     let stream = fx.stream();
//!     let ptr = fx.alloc.allocate(64).unwrap();
//!     fx.alloc.record_event(ptr, &stream).unwrap();
//!     fx.alloc.free(ptr).unwrap();
//!     fx.finish(&stream);
//!     fx.assert_no_leak();
//! }
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use pinforge::backend::{CompletionMode, SimulatedRuntime};
use pinforge::{CachingHostAllocator, CachingHostConfig, HipStream};
pub use serial_test::serial;

/// Pinned allocations in the simulation are page aligned; sizes used by
/// OOM tests are whole pages so the limit arithmetic is exact
pub const PAGE: usize = 4096;

pub struct SimFixture {
    pub runtime: Arc<SimulatedRuntime>,
    pub alloc: CachingHostAllocator,
}

impl SimFixture {
    /// Events stay pending until [`finish`](Self::finish) or friends
    pub fn manual() -> Self {
        Self::with_config(CompletionMode::Manual, CachingHostConfig::default())
    }

    /// Events complete as soon as they are recorded
    pub fn immediate() -> Self {
        Self::with_config(CompletionMode::Immediate, CachingHostConfig::default())
    }

    pub fn with_config(mode: CompletionMode, config: CachingHostConfig) -> Self {
        let runtime = Arc::new(SimulatedRuntime::with_mode(mode));
        let alloc = CachingHostAllocator::new(runtime.clone(), config);
        SimFixture { runtime, alloc }
    }

    pub fn stream(&self) -> HipStream {
        HipStream::with_default_flags(self.runtime.clone()).expect("simulated stream creation")
    }

    /// Let the device finish everything enqueued on `stream`
    pub fn finish(&self, stream: &HipStream) {
        self.runtime.complete_stream(stream.as_raw());
    }

    /// After a clean shutdown every pinned byte is back with the driver
    pub fn assert_no_leak(&self) {
        let report = self.alloc.shutdown().expect("shutdown");
        assert!(report.is_clean(), "allocator not clean at shutdown: {:?}", report);
        assert_eq!(
            self.runtime.counters().host_bytes_outstanding,
            0,
            "pinned memory still outstanding"
        );
    }
}

#[cfg(feature = "rocm")]
pub use gpu::GPU_RUNTIME;

#[cfg(feature = "rocm")]
mod gpu {
    use once_cell::sync::Lazy;
    use pinforge::backend::HipRuntime;
    use std::sync::Arc;

    /// Shared HIP runtime, `None` when no device is usable
    pub static GPU_RUNTIME: Lazy<Option<Arc<HipRuntime>>> = Lazy::new(|| {
        if !HipRuntime::gpu_available() {
            eprintln!("WARNING: GPU not available - skipping GPU tests");
            eprintln!("To enable GPU tests, ensure:");
            eprintln!("  1. AMD GPU is present");
            eprintln!("  2. ROCm is installed (check with rocm-smi)");
            eprintln!("  3. amdhip64 library is in LD_LIBRARY_PATH");
            return None;
        }
        match HipRuntime::new() {
            Ok(rt) => Some(Arc::new(rt)),
            Err(e) => {
                eprintln!("ERROR: Failed to initialize HIP runtime: {}", e);
                None
            }
        }
    });
}
