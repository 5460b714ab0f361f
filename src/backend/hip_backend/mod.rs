//! ROCm/HIP device handles
//!
//! Streams and events are driver-agnostic wrappers over a
//! [`DeviceRuntime`](crate::backend::DeviceRuntime). The FFI-backed runtime
//! and per-thread device tracking are only compiled with the `rocm` feature.

mod error;
mod event;
pub mod ffi;
mod stream;

#[cfg(feature = "rocm")]
pub mod device_context;
#[cfg(feature = "rocm")]
mod runtime;

pub use error::{HipError, HipResult};
pub use event::HipEvent;
#[cfg(feature = "rocm")]
pub use runtime::HipRuntime;
pub use stream::{HipStream, StreamFlags};
