//! Error handling for the pinned host allocators
//!
//! Allocator calls fail for one of three reasons:
//! - the caller passed a pointer the allocator does not track (a bug, fail fast)
//! - the driver ran out of pinned memory (recoverable: empty the cache, retry
//!   or fall back to pageable memory)
//! - a stream/event/driver call failed (surfaced verbatim, never retried)

use crate::backend::HipError;

/// Allocator error type
#[derive(Debug, thiserror::Error)]
pub enum HostAllocError {
    /// Pointer is not a live (or, for record_event, draining) block
    #[error("Invalid pointer: {0:#x} is not tracked by this allocator")]
    InvalidPointer(usize),

    /// Driver could not provide pinned memory
    #[error("Pinned host memory exhausted: {requested} bytes requested ({reason})")]
    HostOom { requested: usize, reason: String },

    /// Stream, event or release failure at the driver level
    #[error("Device error: {0}")]
    Device(#[from] HipError),

    /// Zero-byte allocations are rejected
    #[error("Allocation size must be greater than zero")]
    ZeroSize,

    /// Process-wide allocator was already initialized
    #[error("Caching host allocator already initialized")]
    AlreadyInitialized,

    /// Lock poisoned (indicates a panic while the registry was held)
    #[error("Internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for HostAllocError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        HostAllocError::LockPoisoned(format!("Lock poisoned: {}", err))
    }
}

pub type HostAllocResult<T> = Result<T, HostAllocError>;

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller misuse: fix the call site
    User,
    /// Temporary condition, the caller may retry
    Recoverable,
    /// Bug or corrupted internal state
    Internal,
    /// Driver/GPU failure
    Backend,
}

impl HostAllocError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            HostAllocError::InvalidPointer(_)
            | HostAllocError::ZeroSize
            | HostAllocError::AlreadyInitialized => ErrorCategory::User,
            HostAllocError::HostOom { .. } => ErrorCategory::Recoverable,
            HostAllocError::LockPoisoned(_) => ErrorCategory::Internal,
            HostAllocError::Device(HipError::LockPoisoned(_)) => ErrorCategory::Internal,
            HostAllocError::Device(_) => ErrorCategory::Backend,
        }
    }

    /// Whether `empty_cache()` followed by a retry may succeed
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Recoverable
    }

    pub fn is_user_error(&self) -> bool {
        self.category() == ErrorCategory::User
    }

    /// Map a failed driver allocation of `requested` bytes
    pub(crate) fn from_host_alloc(requested: usize, err: HipError) -> Self {
        match err {
            HipError::MemoryAllocationFailed(reason) => HostAllocError::HostOom { requested, reason },
            other => HostAllocError::Device(other),
        }
    }
}
