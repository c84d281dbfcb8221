//! Runtime-safety pre-filter applied in front of every registration's matcher.

use crate::{
    matcher::{Matcher, MatchingResult},
    transform::SelfFamily,
    unit::{AccessFlags, StructuralView},
    Result,
};

/// Name fragments of units the runtime generates on the fly.
const GENERATED_UNIT_MARKERS: [&str; 3] = ["$$Lambda", "$Proxy", "$$EnhancerBy"];

/// Selects every behavior that can safely be rewritten, and nothing in units that cannot.
///
/// Units are rejected when:
/// - they are defined by the bootstrap context and unsafe rewriting is disabled
/// - they belong to the rewriting system's own family
/// - they were generated by the runtime (lambda forms, proxies)
///
/// Within accepted units, abstract behaviors, class initializers, and native behaviors
/// (unless native renaming is available) are left out.
#[derive(Debug, Clone)]
pub struct UnsupportedMatcher {
    enable_unsafe: bool,
    native_supported: bool,
    family: SelfFamily,
}

impl UnsupportedMatcher {
    /// Creates the pre-filter.
    ///
    /// # Arguments
    ///
    /// * `enable_unsafe` - Accept units of the bootstrap loading context.
    /// * `native_supported` - Native behaviors can be wrapped through a method prefix.
    /// * `family` - What counts as the rewriting system's own family.
    #[must_use]
    pub fn new(enable_unsafe: bool, native_supported: bool, family: SelfFamily) -> Self {
        UnsupportedMatcher {
            enable_unsafe,
            native_supported,
            family,
        }
    }

    /// Returns `true` if no behavior of the unit described by `view` may be rewritten.
    #[must_use]
    pub fn is_unsupported_unit(&self, view: &StructuralView) -> bool {
        (!self.enable_unsafe && view.loader().is_bootstrap())
            || self.family.contains(view.loader(), view.name())
            || GENERATED_UNIT_MARKERS
                .iter()
                .any(|marker| view.name().contains(marker))
    }
}

impl Matcher for UnsupportedMatcher {
    fn matching(&self, view: &StructuralView) -> Result<MatchingResult> {
        if self.is_unsupported_unit(view) {
            return Ok(MatchingResult::none());
        }

        Ok(view
            .behaviors()
            .iter()
            .filter(|behavior| !behavior.access().contains(AccessFlags::ABSTRACT))
            .filter(|behavior| !behavior.is_class_initializer())
            .filter(|behavior| {
                self.native_supported || !behavior.access().contains(AccessFlags::NATIVE)
            })
            .map(|behavior| behavior.sign_code())
            .collect())
    }
}
