//! Re-entrancy protection against rewriting the rewriter.
//!
//! While a unit is being transformed, the runtime may load the rewriting system's own
//! support units on the same thread and deliver them to the hook again. Rewriting those
//! leads to infinite recursion or circular loading failures, so every hook invocation first
//! asks the [`ReentrancyGuard`] whether the unit may be processed at all.

use std::{
    cell::RefCell,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashSet;
use tracing::debug;

use crate::{
    config::CacheConfig,
    unit::{normalize_name, LoadingContext},
    utils::TtlCache,
};

static NEXT_GUARD_ID: AtomicU64 = AtomicU64::new(1);

/// The last verdict computed on this thread.
struct Marker {
    guard: u64,
    epoch: u64,
    loader: LoadingContext,
    name: String,
    verdict: bool,
}

thread_local! {
    static LAST_MARKER: RefCell<Option<Marker>> = const { RefCell::new(None) };
}

/// Describes which units belong to the rewriting system's own family.
///
/// A unit is part of the family when its dotted name starts with one of the unit prefixes,
/// or when the name of its loading context starts with one of the loader prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfFamily {
    unit_prefixes: Vec<String>,
    loader_prefixes: Vec<String>,
}

impl Default for SelfFamily {
    fn default() -> Self {
        SelfFamily {
            unit_prefixes: vec!["weavehook.".to_string()],
            loader_prefixes: vec!["weavehook.".to_string()],
        }
    }
}

impl SelfFamily {
    /// A family without any member.
    #[must_use]
    pub fn empty() -> Self {
        SelfFamily {
            unit_prefixes: Vec::new(),
            loader_prefixes: Vec::new(),
        }
    }

    /// Adds units whose name starts with `prefix`.
    #[must_use]
    pub fn with_unit_prefix(mut self, prefix: &str) -> Self {
        self.unit_prefixes.push(normalize_name(prefix).into_owned());
        self
    }

    /// Adds every unit defined by a loading context whose name starts with `prefix`.
    #[must_use]
    pub fn with_loader_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.loader_prefixes.push(prefix.into());
        self
    }

    /// Returns `true` if the unit `name` defined by `loader` is part of the family.
    #[must_use]
    pub fn contains(&self, loader: &LoadingContext, name: &str) -> bool {
        let name = normalize_name(name);
        self.unit_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
            || self
                .loader_prefixes
                .iter()
                .any(|prefix| loader.name().starts_with(prefix.as_str()))
    }
}

/// Decides whether a hook invocation may process a unit.
///
/// Verdicts are memoized twice: the last `(loader, name, verdict)` per thread answers the
/// handful of consecutive re-entries the runtime performs for one load attempt, and a
/// bounded process-wide cache answers the classification for everything else. The guard
/// owns its cache, so dropping the guard at teardown discards every verdict.
pub struct ReentrancyGuard {
    id: u64,
    epoch: AtomicU64,
    family: SelfFamily,
    family_loaders: DashSet<u64>,
    verdicts: TtlCache<(u64, u64, String), bool>,
}

impl ReentrancyGuard {
    /// Creates a guard for `family`, caching verdicts as configured by `cache`.
    #[must_use]
    pub fn new(family: SelfFamily, cache: &CacheConfig) -> Self {
        ReentrancyGuard {
            id: NEXT_GUARD_ID.fetch_add(1, Ordering::Relaxed),
            epoch: AtomicU64::new(0),
            family,
            family_loaders: DashSet::new(),
            verdicts: TtlCache::from_config(cache),
        }
    }

    /// The family this guard protects.
    #[must_use]
    pub fn family(&self) -> &SelfFamily {
        &self.family
    }

    /// Declares `loader` as a dedicated loading context of the rewriting system.
    ///
    /// Every unit it defines is part of the family from now on.
    pub fn register_family_loader(&self, loader: &LoadingContext) {
        if self.family_loaders.insert(loader.id()) {
            // Markers of older epochs are ignored on every thread
            self.epoch.fetch_add(1, Ordering::AcqRel);
            self.verdicts.clear();
        }
    }

    /// Returns `true` if the unit `name` defined by `loader` may be processed.
    ///
    /// `false` means the unit belongs to the rewriting system's own family; the caller must
    /// pass its binary through unmodified.
    #[must_use]
    pub fn should_process(&self, loader: &LoadingContext, name: &str) -> bool {
        let name = normalize_name(name);
        let epoch = self.epoch.load(Ordering::Acquire);

        let remembered = LAST_MARKER.with(|marker| {
            marker.borrow().as_ref().and_then(|last| {
                (last.guard == self.id
                    && last.epoch == epoch
                    && last.loader == *loader
                    && last.name == name)
                    .then_some(last.verdict)
            })
        });
        if let Some(verdict) = remembered {
            return verdict;
        }

        let key = (epoch, loader.id(), name.to_string());
        let verdict = match self.verdicts.get(&key) {
            Some(verdict) => verdict,
            None => {
                let verdict = !self.is_family(loader, &name);
                self.verdicts.insert(key, verdict);
                verdict
            }
        };

        if !verdict {
            debug!(unit = %name, loader = %loader, "skipping unit of the rewriting system");
        }

        LAST_MARKER.with(|marker| {
            if let Ok(mut marker) = marker.try_borrow_mut() {
                *marker = Some(Marker {
                    guard: self.id,
                    epoch,
                    loader: loader.clone(),
                    name: name.into_owned(),
                    verdict,
                });
            }
        });
        verdict
    }

    /// Classifies a unit without consulting any memo.
    #[must_use]
    pub fn is_family(&self, loader: &LoadingContext, name: &str) -> bool {
        self.family_loaders.contains(&loader.id()) || self.family.contains(loader, name)
    }
}
