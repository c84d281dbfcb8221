//! The rewrite decision for one unit.
//!
//! Given a structural view, the engine asks the registration's matcher (behind the
//! runtime-safety pre-filter) which behaviors to instrument, hands them to the weaver, and
//! records what was rewritten. Every failure on the way is logged and becomes a no-op: a
//! unit that cannot be rewritten runs unmodified, and nothing partial is ever installed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    matcher::{AndMatcher, Matcher, MatchingResult, UnsupportedMatcher},
    transform::{Registration, WeaveRequest, WeaverRc},
    unit::{Binary, LoadingContext, StructuralView},
    Result,
};

/// How a decision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// The weaver produced a new binary
    Rewritten,
    /// No behavior of the unit matched; the weaver was not called
    NoMatch,
    /// The weaver found nothing to change
    Unchanged,
    /// Matching or weaving failed; the failure was logged
    Failed,
}

/// The result of deciding about one unit.
///
/// Only a [`DecisionOutcome::Rewritten`] decision carries a rewritten binary.
#[derive(Debug, Clone)]
pub struct TransformDecision {
    original: Binary,
    rewritten: Option<Binary>,
    matched: MatchingResult,
    outcome: DecisionOutcome,
}

impl TransformDecision {
    fn no_op(original: &Binary, matched: MatchingResult, outcome: DecisionOutcome) -> Self {
        TransformDecision {
            original: original.clone(),
            rewritten: None,
            matched,
            outcome,
        }
    }

    /// The binary the decision was made for.
    #[must_use]
    pub fn original(&self) -> &Binary {
        &self.original
    }

    /// The binary to install instead, if any.
    #[must_use]
    pub fn rewritten(&self) -> Option<&Binary> {
        self.rewritten.as_ref()
    }

    /// The behaviors selected for instrumentation.
    #[must_use]
    pub fn matched(&self) -> &MatchingResult {
        &self.matched
    }

    /// How the decision ended.
    #[must_use]
    pub fn outcome(&self) -> DecisionOutcome {
        self.outcome
    }

    /// Returns `true` if a new binary must be installed.
    #[must_use]
    pub fn is_rewritten(&self) -> bool {
        self.rewritten.is_some()
    }

    /// Converts the decision into what the runtime hook returns: the new binary, or
    /// `None` for "no rewrite".
    #[must_use]
    pub fn into_hook_result(self) -> Option<Binary> {
        self.rewritten
    }
}

/// Decides per unit whether and how to rewrite it for one registration.
pub struct TransformDecisionEngine {
    registration: Arc<Registration>,
    weaver: WeaverRc,
    matcher: AndMatcher,
}

impl TransformDecisionEngine {
    /// Creates the engine for `registration`, rewriting with `weaver`.
    #[must_use]
    pub fn new(registration: Arc<Registration>, weaver: WeaverRc) -> Self {
        let config = registration.config();
        let unsupported = UnsupportedMatcher::new(
            config.enable_unsafe,
            config.native_method_prefix.is_some(),
            config.self_family.clone(),
        );
        let matcher =
            AndMatcher::new(vec![Arc::new(unsupported)]).and(registration.matcher().clone());

        TransformDecisionEngine {
            registration,
            weaver,
            matcher,
        }
    }

    /// The registration decisions are made for.
    #[must_use]
    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    /// Evaluates the pre-filtered matcher against `view`.
    ///
    /// # Errors
    ///
    /// Returns the matcher's error.
    pub fn matching(&self, view: &StructuralView) -> Result<MatchingResult> {
        self.matcher.matching(view)
    }

    /// Decides about the unit `unit` defined by `loader`, whose current form is `binary`
    /// and whose shape is `view`.
    ///
    /// Never fails: errors are logged and produce a [`DecisionOutcome::Failed`] no-op.
    pub fn decide(
        &self,
        loader: &LoadingContext,
        unit: &str,
        view: &StructuralView,
        binary: &Binary,
    ) -> TransformDecision {
        let matched = match self.matching(view) {
            Ok(matched) => matched,
            Err(error) => {
                warn!(
                    unit,
                    loader = %loader,
                    watch_id = self.registration.watch_id(),
                    %error,
                    "matching failed, unit left unchanged"
                );
                return TransformDecision::no_op(
                    binary,
                    MatchingResult::none(),
                    DecisionOutcome::Failed,
                );
            }
        };

        if !matched.is_matched() {
            return TransformDecision::no_op(binary, matched, DecisionOutcome::NoMatch);
        }

        let request = WeaveRequest {
            loader,
            unit,
            binary,
            sign_codes: matched.sign_codes(),
            namespace: self.registration.namespace(),
            listener_id: self.registration.listener_id(),
            event_types: self.registration.event_types(),
            native_prefix: self.registration.native_method_prefix(),
        };

        let rewritten = match self.weaver.weave(&request) {
            Ok(rewritten) => rewritten,
            Err(error) => {
                warn!(
                    unit,
                    loader = %loader,
                    watch_id = self.registration.watch_id(),
                    %error,
                    "weaving failed, unit left unchanged"
                );
                return TransformDecision::no_op(binary, matched, DecisionOutcome::Failed);
            }
        };

        if rewritten.same_storage(binary) {
            debug!(unit, loader = %loader, "weaver found nothing to change");
            return TransformDecision::no_op(binary, matched, DecisionOutcome::Unchanged);
        }

        self.registration
            .statistic()
            .statistic_affect(unit, matched.sign_codes());
        info!(
            unit,
            loader = %loader,
            watch_id = self.registration.watch_id(),
            behaviors = matched.sign_codes().len(),
            "unit rewritten"
        );

        TransformDecision {
            original: binary.clone(),
            rewritten: Some(rewritten),
            matched,
            outcome: DecisionOutcome::Rewritten,
        }
    }
}
