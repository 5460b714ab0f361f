//! Device runtime backends

pub mod hip_backend;
pub mod runtime;
pub mod sim;

use std::sync::Arc;

pub use hip_backend::{HipError, HipEvent, HipResult, HipStream, StreamFlags};
#[cfg(feature = "rocm")]
pub use hip_backend::HipRuntime;
pub use runtime::{DeviceRuntime, EventStatus, RawEvent, RawStream};
pub use sim::{CompletionMode, SimCounters, SimulatedRuntime};

/// Runtime used by the process-wide allocator.
///
/// The HIP runtime when built with `rocm` and a device is present; otherwise
/// a simulated runtime whose events complete immediately.
pub fn default_runtime() -> Arc<dyn DeviceRuntime> {
    #[cfg(feature = "rocm")]
    {
        if HipRuntime::gpu_available() {
            return Arc::new(HipRuntime);
        }
        tracing::warn!("No HIP device available, falling back to simulated runtime");
    }

    #[cfg(not(feature = "rocm"))]
    tracing::warn!("Built without `rocm`, using simulated runtime for pinned host memory");

    Arc::new(SimulatedRuntime::new())
}
