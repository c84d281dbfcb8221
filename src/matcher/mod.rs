//! Matchers decide which behaviors of a unit get rewritten.
//!
//! A [`Matcher`] evaluates a [`StructuralView`] against the inclusion rules of one
//! registration and reports the signature codes of the behaviors it selects. The decision
//! engine always evaluates the registration's matcher together with the runtime-safety
//! pre-filter [`UnsupportedMatcher`], composed through [`AndMatcher`].
//!
//! # Key Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Matcher`] | Predicate over structural views |
//! | [`MatchingResult`] | Selected behavior signature codes |
//! | [`UnsupportedMatcher`] | Rejects units and behaviors that must never be rewritten |
//! | [`AndMatcher`] | Intersection of several matchers |
//! | [`PatternMatcher`] | Wildcard rules over unit and behavior names |

mod pattern;
mod unsupported;

use std::{collections::BTreeSet, sync::Arc};

use crate::{unit::StructuralView, Result};

pub use pattern::{wildcard_match, PatternMatcher};
pub use unsupported::UnsupportedMatcher;

/// A shared, type-erased matcher.
pub type MatcherRc = Arc<dyn Matcher>;

/// Predicate engine selecting which behaviors within a unit should be rewritten.
///
/// Implementations must be pure functions of the view and their configured rules, and
/// safe to call from many loading threads at once.
pub trait Matcher: Send + Sync {
    /// Evaluates `view` and returns the selected behaviors.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Match`] if the rules cannot be evaluated against this view.
    fn matching(&self, view: &StructuralView) -> Result<MatchingResult>;
}

/// The behaviors of one unit that satisfy a matcher.
///
/// An empty result means nothing matched, and no rewrite is ever produced for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchingResult {
    sign_codes: BTreeSet<String>,
}

impl MatchingResult {
    /// A result without any selected behavior.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds the behavior identified by `sign_code`.
    pub fn add(&mut self, sign_code: impl Into<String>) {
        self.sign_codes.insert(sign_code.into());
    }

    /// Returns `true` if at least one behavior matched.
    #[must_use]
    pub fn is_matched(&self) -> bool {
        !self.sign_codes.is_empty()
    }

    /// Signature codes of the selected behaviors.
    #[must_use]
    pub fn sign_codes(&self) -> &BTreeSet<String> {
        &self.sign_codes
    }

    /// Consumes the result, returning the signature codes.
    #[must_use]
    pub fn into_sign_codes(self) -> BTreeSet<String> {
        self.sign_codes
    }

    /// Keeps only the behaviors also selected by `other`.
    #[must_use]
    pub fn intersect(self, other: &MatchingResult) -> MatchingResult {
        MatchingResult {
            sign_codes: self
                .sign_codes
                .into_iter()
                .filter(|code| other.sign_codes.contains(code))
                .collect(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for MatchingResult {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        MatchingResult {
            sign_codes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Matches a behavior only if every member matcher matches it.
///
/// Members are evaluated in order and evaluation stops at the first empty result, so the
/// cheapest and most selective matcher should come first.
pub struct AndMatcher {
    members: Vec<MatcherRc>,
}

impl AndMatcher {
    /// Creates the intersection of `members`.
    #[must_use]
    pub fn new(members: Vec<MatcherRc>) -> Self {
        AndMatcher { members }
    }

    /// Appends `matcher` to the intersection.
    #[must_use]
    pub fn and(mut self, matcher: MatcherRc) -> Self {
        self.members.push(matcher);
        self
    }
}

impl Matcher for AndMatcher {
    fn matching(&self, view: &StructuralView) -> Result<MatchingResult> {
        let mut members = self.members.iter();
        let Some(first) = members.next() else {
            return Ok(MatchingResult::none());
        };

        let mut result = first.matching(view)?;
        for member in members {
            if !result.is_matched() {
                break;
            }
            result = result.intersect(&member.matching(view)?);
        }
        Ok(result)
    }
}

impl<M: Matcher + ?Sized> Matcher for Arc<M> {
    fn matching(&self, view: &StructuralView) -> Result<MatchingResult> {
        (**self).matching(view)
    }
}
