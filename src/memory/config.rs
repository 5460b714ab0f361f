//! Configuration for the caching host allocator

use crate::backend::hip_backend::ffi;

/// Set to `0`, `off`, `false` or `disabled` to release blocks as soon as
/// they become quiet instead of caching them
pub const HOST_CACHE_ENV: &str = "PINFORGE_HOST_CACHE";

/// Integer flags passed to `hipHostMalloc` (decimal or `0x` hex)
pub const HOST_ALLOC_FLAGS_ENV: &str = "PINFORGE_HOST_ALLOC_FLAGS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachingHostConfig {
    /// Keep quiet blocks for reuse (otherwise release them to the driver)
    pub caching_enabled: bool,
    /// Flags for pinned allocations
    pub host_alloc_flags: u32,
    /// Flags for the events recorded against blocks
    pub event_flags: u32,
}

impl Default for CachingHostConfig {
    fn default() -> Self {
        CachingHostConfig {
            caching_enabled: true,
            host_alloc_flags: ffi::HIP_HOST_MALLOC_DEFAULT,
            event_flags: ffi::HIP_EVENT_DISABLE_TIMING,
        }
    }
}

impl CachingHostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caching_enabled(mut self, caching_enabled: bool) -> Self {
        self.caching_enabled = caching_enabled;
        self
    }

    pub fn with_host_alloc_flags(mut self, host_alloc_flags: u32) -> Self {
        self.host_alloc_flags = host_alloc_flags;
        self
    }

    pub fn with_event_flags(mut self, event_flags: u32) -> Self {
        self.event_flags = event_flags;
        self
    }

    /// Defaults overridden by `PINFORGE_HOST_CACHE` and
    /// `PINFORGE_HOST_ALLOC_FLAGS`. Unparseable values are ignored with a
    /// warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup(HOST_CACHE_ENV) {
            match parse_switch(&value) {
                Some(enabled) => config.caching_enabled = enabled,
                None => tracing::warn!("Ignoring {}={:?}: expected on/off", HOST_CACHE_ENV, value),
            }
        }

        if let Some(value) = lookup(HOST_ALLOC_FLAGS_ENV) {
            match parse_flags(&value) {
                Some(flags) => config.host_alloc_flags = flags,
                None => tracing::warn!(
                    "Ignoring {}={:?}: expected an integer",
                    HOST_ALLOC_FLAGS_ENV,
                    value
                ),
            }
        }

        config
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "on" | "true" | "enabled" => Some(true),
        "0" | "off" | "false" | "disabled" => Some(false),
        _ => None,
    }
}

fn parse_flags(value: &str) -> Option<u32> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
