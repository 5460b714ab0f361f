//! HIP FFI bindings
//!
//! Only the host-memory, stream and event entry points of the ROCm HIP API
//! are bound here. The extern block is compiled with the `rocm` feature;
//! the flag and status constants are always available so host-only builds
//! can speak the same flag vocabulary.

#[cfg(feature = "rocm")]
use std::ffi::c_void;

#[cfg(feature = "rocm")]
#[link(name = "amdhip64")]
#[allow(dead_code)]
extern "C" {
    pub fn hipInit(flags: u32) -> i32;
    pub fn hipGetDeviceCount(count: *mut i32) -> i32;
    pub fn hipGetDevice(deviceId: *mut i32) -> i32;
    pub fn hipSetDevice(deviceId: i32) -> i32;
    pub fn hipHostMalloc(ptr: *mut *mut c_void, size: usize, flags: u32) -> i32;
    pub fn hipHostFree(ptr: *mut c_void) -> i32;
    pub fn hipStreamCreateWithFlags(stream: *mut *mut c_void, flags: u32) -> i32;
    pub fn hipStreamDestroy(stream: *mut c_void) -> i32;
    pub fn hipStreamSynchronize(stream: *mut c_void) -> i32;
    pub fn hipEventCreateWithFlags(event: *mut *mut c_void, flags: u32) -> i32;
    pub fn hipEventDestroy(event: *mut c_void) -> i32;
    pub fn hipEventRecord(event: *mut c_void, stream: *mut c_void) -> i32;
    pub fn hipEventQuery(event: *mut c_void) -> i32;
    pub fn hipEventSynchronize(event: *mut c_void) -> i32;
    pub fn hipGetErrorString(error: i32) -> *const i8;
}

/// HIP success code
pub const HIP_SUCCESS: i32 = 0;

/// `hipErrorOutOfMemory`
pub const HIP_ERROR_OUT_OF_MEMORY: i32 = 2;

/// `hipErrorNotReady`, returned by `hipEventQuery` while work is outstanding
pub const HIP_ERROR_NOT_READY: i32 = 600;

// Pinned host allocation flags
pub const HIP_HOST_MALLOC_DEFAULT: u32 = 0x0;
pub const HIP_HOST_MALLOC_PORTABLE: u32 = 0x1;
pub const HIP_HOST_MALLOC_MAPPED: u32 = 0x2;
pub const HIP_HOST_MALLOC_WRITE_COMBINED: u32 = 0x4;

// Stream creation flags
pub const HIP_STREAM_DEFAULT: u32 = 0x0;
/// Stream does not synchronize with the null stream
pub const HIP_STREAM_NON_BLOCKING: u32 = 0x1;

// Event creation flags
pub const HIP_EVENT_DEFAULT: u32 = 0x0;
pub const HIP_EVENT_BLOCKING_SYNC: u32 = 0x1;
/// Event flag to disable timing data collection
pub const HIP_EVENT_DISABLE_TIMING: u32 = 0x2;
