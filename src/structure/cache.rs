//! Memoization of structural views in two independent cache spaces.

use std::sync::Arc;

use tracing::debug;

use crate::{
    config::TransformConfig,
    structure::StructureBuilderRc,
    unit::{Binary, BinaryIdentity, BinaryKey, LoadingContext, StructuralViewRc, TypeHandle},
    utils::{CacheStats, TtlCache},
    Result,
};

/// Caches structural views keyed by unit identity.
///
/// - Views of resolved units (retransformation, no binary needed) are keyed by
///   [`TypeHandle`].
/// - Views of units loaded for the first time are keyed by the identity of their binary
///   together with the loading context, as decided by the configured [`BinaryIdentity`].
///
/// Both spaces are bounded and expire entries after a fixed time. A miss rebuilds the
/// view; concurrent misses on the same key may build twice and the last one is kept.
pub struct StructureCache {
    builder: StructureBuilderRc,
    identity: BinaryIdentity,
    resolved: TtlCache<TypeHandle, StructuralViewRc>,
    parsed: TtlCache<(BinaryKey, LoadingContext), StructuralViewRc>,
}

impl StructureCache {
    /// Creates a cache sized by `config` that builds views with `builder`.
    #[must_use]
    pub fn new(builder: StructureBuilderRc, config: &TransformConfig) -> Self {
        StructureCache {
            builder,
            identity: config.binary_identity,
            resolved: TtlCache::from_config(&config.resolved_cache),
            parsed: TtlCache::from_config(&config.parsed_cache),
        }
    }

    /// Returns the view of a unit, choosing the cache space the way the hook needs it.
    ///
    /// With a resolved `handle` the unit is viewed reflectively; otherwise `binary` is
    /// parsed for `loader`.
    ///
    /// # Errors
    ///
    /// Returns the builder's error on a miss that cannot be built.
    pub fn get(
        &self,
        loader: &LoadingContext,
        handle: Option<&TypeHandle>,
        binary: &Binary,
    ) -> Result<StructuralViewRc> {
        match handle {
            Some(handle) => self.get_resolved(handle),
            None => self.get_parsed(binary, loader),
        }
    }

    /// Returns the reflective view of a resolved unit.
    ///
    /// # Errors
    ///
    /// Returns the builder's error on a miss that cannot be built.
    pub fn get_resolved(&self, handle: &TypeHandle) -> Result<StructuralViewRc> {
        self.resolved.get_or_try_insert_with(handle.clone(), || {
            debug!(unit = handle.name(), "building reflective view");
            self.builder.from_resolved(handle).map(Arc::new)
        })
    }

    /// Returns the view parsed from `binary` for `loader`.
    ///
    /// # Errors
    ///
    /// Returns the builder's parse error on a miss that cannot be built.
    pub fn get_parsed(&self, binary: &Binary, loader: &LoadingContext) -> Result<StructuralViewRc> {
        let key = (BinaryKey::new(binary, self.identity), loader.clone());
        self.parsed.get_or_try_insert_with(key, || {
            debug!(loader = %loader, size = binary.len(), "parsing view from binary");
            self.builder.from_binary(binary, loader).map(Arc::new)
        })
    }

    /// The binary identity policy used for parsed views.
    #[must_use]
    pub fn binary_identity(&self) -> BinaryIdentity {
        self.identity
    }

    /// Number of stored views as (resolved, parsed).
    #[must_use]
    pub fn len(&self) -> (usize, usize) {
        (self.resolved.len(), self.parsed.len())
    }

    /// Returns `true` if neither space holds a view.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.parsed.is_empty()
    }

    /// Usage counters as (resolved, parsed).
    #[must_use]
    pub fn stats(&self) -> (CacheStats, CacheStats) {
        (self.resolved.stats(), self.parsed.stats())
    }

    /// Drops every cached view.
    pub fn clear(&self) {
        self.resolved.clear();
        self.parsed.clear();
    }
}
