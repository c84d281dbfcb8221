//! Configuration for the transform pipeline.
//!
//! This module provides the configuration types of one registration: safety switches,
//! cache sizing for structural views and family verdicts, the binary identity policy,
//! and the background queue used by the retransforming variant of the hook.

use std::time::Duration;

use crate::{transform::SelfFamily, unit::BinaryIdentity};

/// Default capacity of the cache for views of resolved units.
pub const DEFAULT_RESOLVED_CACHE_CAPACITY: usize = 2048;

/// Default capacity of the cache for views parsed from binaries.
pub const DEFAULT_PARSED_CACHE_CAPACITY: usize = 128;

/// Default capacity of the family classification cache.
pub const DEFAULT_FAMILY_CACHE_CAPACITY: usize = 1024;

/// Default expire-after-write period of all caches.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Default capacity of the retransform queue.
pub const DEFAULT_RETRANSFORM_QUEUE_CAPACITY: usize = 1024;

/// Sizing of one bounded, expiring cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries kept; `0` disables caching.
    pub capacity: usize,
    /// Entries older than this are dropped on access.
    pub ttl: Duration,
}

impl CacheConfig {
    /// Creates a cache configuration.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl }
    }

    /// A configuration that caches nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            capacity: 0,
            ttl: Duration::ZERO,
        }
    }
}

/// Configuration of one registration's transform pipeline.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Allow rewriting units defined by the bootstrap loading context (default: false).
    pub enable_unsafe: bool,

    /// Cache of views built reflectively from resolved type handles.
    pub resolved_cache: CacheConfig,

    /// Cache of views parsed from binaries of units being loaded for the first time.
    pub parsed_cache: CacheConfig,

    /// Cache of "belongs to the rewriting system's own family" verdicts.
    pub family_cache: CacheConfig,

    /// How binaries are compared when used as cache keys (default: storage identity).
    pub binary_identity: BinaryIdentity,

    /// Capacity of the background retransform queue (default: 1024).
    ///
    /// When the queue is full, further units stay unrewritten.
    pub retransform_queue_capacity: usize,

    /// Name of the dedicated retransform worker thread.
    pub worker_name: String,

    /// Prefix used to rename native behaviors when the weaver wraps them.
    ///
    /// When set, the runtime must support native method prefixes; registration setup fails
    /// with [`crate::Error::UnsupportedCapability`] otherwise.
    pub native_method_prefix: Option<String>,

    /// What counts as the rewriting system's own family.
    pub self_family: SelfFamily,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            enable_unsafe: false,
            resolved_cache: CacheConfig::new(DEFAULT_RESOLVED_CACHE_CAPACITY, DEFAULT_CACHE_TTL),
            parsed_cache: CacheConfig::new(DEFAULT_PARSED_CACHE_CAPACITY, DEFAULT_CACHE_TTL),
            family_cache: CacheConfig::new(DEFAULT_FAMILY_CACHE_CAPACITY, DEFAULT_CACHE_TTL),
            binary_identity: BinaryIdentity::Storage,
            retransform_queue_capacity: DEFAULT_RETRANSFORM_QUEUE_CAPACITY,
            worker_name: "weavehook-retransform".to_string(),
            native_method_prefix: None,
            self_family: SelfFamily::default(),
        }
    }
}

impl TransformConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows or forbids rewriting bootstrap units.
    #[must_use]
    pub fn with_unsafe(mut self, enable: bool) -> Self {
        self.enable_unsafe = enable;
        self
    }

    /// Replaces the sizing of the resolved view cache.
    #[must_use]
    pub fn with_resolved_cache(mut self, cache: CacheConfig) -> Self {
        self.resolved_cache = cache;
        self
    }

    /// Replaces the sizing of the parsed view cache.
    #[must_use]
    pub fn with_parsed_cache(mut self, cache: CacheConfig) -> Self {
        self.parsed_cache = cache;
        self
    }

    /// Replaces the sizing of the family verdict cache.
    #[must_use]
    pub fn with_family_cache(mut self, cache: CacheConfig) -> Self {
        self.family_cache = cache;
        self
    }

    /// Replaces the binary identity policy.
    #[must_use]
    pub fn with_binary_identity(mut self, identity: BinaryIdentity) -> Self {
        self.binary_identity = identity;
        self
    }

    /// Replaces the retransform queue capacity.
    #[must_use]
    pub fn with_retransform_queue_capacity(mut self, capacity: usize) -> Self {
        self.retransform_queue_capacity = capacity;
        self
    }

    /// Enables renaming of native behaviors with `prefix`.
    #[must_use]
    pub fn with_native_method_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.native_method_prefix = Some(prefix.into());
        self
    }

    /// Replaces the self family definition.
    #[must_use]
    pub fn with_self_family(mut self, family: SelfFamily) -> Self {
        self.self_family = family;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransformConfig::default();
        assert!(!config.enable_unsafe);
        assert_eq!(config.resolved_cache.capacity, 2048);
        assert_eq!(config.parsed_cache.capacity, 128);
        assert_eq!(config.resolved_cache.ttl, Duration::from_secs(900));
        assert_eq!(config.binary_identity, BinaryIdentity::Storage);
        assert!(config.native_method_prefix.is_none());
    }

    #[test]
    fn builder_methods() {
        let config = TransformConfig::new()
            .with_unsafe(true)
            .with_parsed_cache(CacheConfig::disabled())
            .with_binary_identity(BinaryIdentity::Content)
            .with_native_method_prefix("$$weave$$");
        assert!(config.enable_unsafe);
        assert_eq!(config.parsed_cache.capacity, 0);
        assert_eq!(config.binary_identity, BinaryIdentity::Content);
        assert_eq!(config.native_method_prefix.as_deref(), Some("$$weave$$"));
    }
}
