//! The synchronous transform hook.

use std::{
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    structure::{StructureBuilderRc, StructureCache},
    transform::{
        ProtectScope, Registration, ReentrancyGuard, TransformDecision, TransformDecisionEngine,
        UnitTransformer, WeaverRc,
    },
    unit::{
        normalize_name, Binary, BinaryKey, LoadingContext, ProtectionDomain, StructuralViewRc,
        TypeHandle,
    },
    Result,
};

static NEXT_TRANSFORMER_ID: AtomicU64 = AtomicU64::new(1);

/// What a structural view was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ViewSource {
    Resolved(TypeHandle),
    Parsed(BinaryKey),
}

/// The view used by the previous hook invocation on this thread.
struct LastView {
    transformer: u64,
    loader: LoadingContext,
    source: ViewSource,
    view: StructuralViewRc,
}

thread_local! {
    static LAST_VIEW: RefCell<Option<LastView>> = const { RefCell::new(None) };
}

/// The default pipeline: guard, view, decision, all on the hook's calling thread.
///
/// ```text
/// Received ──► GuardChecked ──► ViewResolved ──► Decided ──► Returned
///    │              │                 │                          ▲
///    └─ bootstrap ──┴─ own family ────┴─ parse error ────────────┘
/// ```
///
/// Every path ends in `Returned`: failures and panics of collaborators are logged and the
/// unit is left unchanged.
pub struct SyncTransformer {
    id: u64,
    guard: ReentrancyGuard,
    cache: StructureCache,
    engine: TransformDecisionEngine,
}

impl SyncTransformer {
    /// Creates the pipeline for `registration`.
    ///
    /// # Arguments
    ///
    /// * `registration` - What to instrument, and the caches' configuration.
    /// * `builder` - Builds structural views on cache misses.
    /// * `weaver` - Rewrites matched units.
    #[must_use]
    pub fn new(
        registration: Arc<Registration>,
        builder: StructureBuilderRc,
        weaver: WeaverRc,
    ) -> Self {
        let config = registration.config();
        SyncTransformer {
            id: NEXT_TRANSFORMER_ID.fetch_add(1, Ordering::Relaxed),
            guard: ReentrancyGuard::new(config.self_family.clone(), &config.family_cache),
            cache: StructureCache::new(builder, config),
            engine: TransformDecisionEngine::new(registration, weaver),
        }
    }

    /// The registration this pipeline serves.
    #[must_use]
    pub fn registration(&self) -> &Arc<Registration> {
        self.engine.registration()
    }

    /// The structural view cache.
    #[must_use]
    pub fn cache(&self) -> &StructureCache {
        &self.cache
    }

    /// The re-entrancy guard.
    #[must_use]
    pub fn guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    /// Runs the pipeline and returns the full decision, or `None` when the unit was
    /// rejected before a decision could be made.
    ///
    /// Unlike [`UnitTransformer::transform`] this does not open a protect scope and does
    /// not catch panics.
    pub fn decide(
        &self,
        loader: &LoadingContext,
        name: &str,
        redefined: Option<&TypeHandle>,
        binary: &Binary,
    ) -> Option<TransformDecision> {
        if self.rejects_bootstrap(loader) {
            debug!(unit = name, "bootstrap unit skipped, unsafe rewriting disabled");
            return None;
        }

        let name = normalize_name(name);
        if !self.guard.should_process(loader, &name) {
            return None;
        }

        let view = match self.view(loader, redefined, binary) {
            Ok(view) => view,
            Err(error) if error.is_parse_error() => {
                warn!(
                    unit = %name,
                    loader = %loader,
                    %error,
                    "unparseable binary, unit left unchanged"
                );
                return None;
            }
            Err(error) => {
                warn!(
                    unit = %name,
                    loader = %loader,
                    watch_id = self.registration().watch_id(),
                    %error,
                    "unable to build structural view, unit left unchanged"
                );
                return None;
            }
        };

        let decision = self.engine.decide(loader, &name, &view, binary);
        debug!(unit = %name, outcome = ?decision.outcome(), "decision made");
        Some(decision)
    }

    /// Returns the already loaded units among `handles` that this registration would
    /// rewrite, so they can be retransformed.
    ///
    /// Units are examined in parallel through the resolved view cache. A unit whose view
    /// cannot be built or matched is skipped.
    pub fn find_matching(&self, handles: &[TypeHandle]) -> Vec<TypeHandle> {
        handles
            .par_iter()
            .filter(|handle| {
                !self.rejects_bootstrap(handle.loader())
                    && self.guard.should_process(handle.loader(), handle.name())
            })
            .filter(|handle| {
                match self
                    .cache
                    .get_resolved(handle)
                    .and_then(|view| self.engine.matching(&view))
                {
                    Ok(matched) => matched.is_matched(),
                    Err(error) if error.is_parse_error() => {
                        debug!(unit = handle.name(), %error, "loaded unit skipped");
                        false
                    }
                    Err(error) => {
                        warn!(
                            unit = handle.name(),
                            watch_id = self.registration().watch_id(),
                            %error,
                            "loaded unit skipped"
                        );
                        false
                    }
                }
            })
            .cloned()
            .collect()
    }

    fn rejects_bootstrap(&self, loader: &LoadingContext) -> bool {
        !self.registration().is_unsafe_enabled() && loader.is_bootstrap()
    }

    fn view(
        &self,
        loader: &LoadingContext,
        redefined: Option<&TypeHandle>,
        binary: &Binary,
    ) -> Result<StructuralViewRc> {
        let source = match redefined {
            Some(handle) => ViewSource::Resolved(handle.clone()),
            None => ViewSource::Parsed(BinaryKey::new(binary, self.cache.binary_identity())),
        };

        let remembered = LAST_VIEW.with(|last| {
            last.borrow().as_ref().and_then(|last| {
                (last.transformer == self.id && last.loader == *loader && last.source == source)
                    .then(|| last.view.clone())
            })
        });
        if let Some(view) = remembered {
            return Ok(view);
        }

        let view = self.cache.get(loader, redefined, binary)?;
        LAST_VIEW.with(|last| {
            if let Ok(mut last) = last.try_borrow_mut() {
                *last = Some(LastView {
                    transformer: self.id,
                    loader: loader.clone(),
                    source,
                    view: view.clone(),
                });
            }
        });
        Ok(view)
    }
}

impl UnitTransformer for SyncTransformer {
    fn transform(
        &self,
        loader: &LoadingContext,
        name: &str,
        redefined: Option<&TypeHandle>,
        _protection: Option<&ProtectionDomain>,
        binary: &Binary,
    ) -> Option<Binary> {
        let _scope = ProtectScope::enter();

        match panic::catch_unwind(AssertUnwindSafe(|| {
            self.decide(loader, name, redefined, binary)
        })) {
            Ok(decision) => decision.and_then(TransformDecision::into_hook_result),
            Err(_) => {
                warn!(unit = name, loader = %loader, "transform panicked, unit left unchanged");
                None
            }
        }
    }
}
