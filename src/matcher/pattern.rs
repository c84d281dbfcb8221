//! Wildcard matching over unit and behavior names.

use crate::{
    matcher::{Matcher, MatchingResult},
    unit::{normalize_name, StructuralView},
    Result,
};

/// Matches `text` against `pattern`, where `*` matches any run of characters and `?`
/// matches exactly one.
///
/// # Examples
///
/// ```rust
/// use weavehook::matcher::wildcard_match;
///
/// assert!(wildcard_match("com.example.*", "com.example.Foo"));
/// assert!(wildcard_match("get?", "getX"));
/// assert!(!wildcard_match("com.example.*", "org.example.Foo"));
/// ```
#[must_use]
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` in the pattern and the text position it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// A matcher selecting behaviors by wildcard patterns on the unit and behavior names.
///
/// Unit patterns are compared against the dotted unit name. When subtypes are included,
/// a unit also matches if its direct superclass or one of its direct interfaces matches.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    unit_pattern: String,
    behavior_pattern: String,
    include_subtypes: bool,
    include_constructors: bool,
}

impl PatternMatcher {
    /// Selects behaviors named like `behavior_pattern` in units named like `unit_pattern`.
    pub fn new(unit_pattern: &str, behavior_pattern: impl Into<String>) -> Self {
        PatternMatcher {
            unit_pattern: normalize_name(unit_pattern).into_owned(),
            behavior_pattern: behavior_pattern.into(),
            include_subtypes: false,
            include_constructors: false,
        }
    }

    /// Also matches units whose direct supertypes match the unit pattern.
    #[must_use]
    pub fn including_subtypes(mut self) -> Self {
        self.include_subtypes = true;
        self
    }

    /// Lets constructors match the behavior pattern; they are skipped by default.
    #[must_use]
    pub fn including_constructors(mut self) -> Self {
        self.include_constructors = true;
        self
    }

    fn unit_matches(&self, view: &StructuralView) -> bool {
        if wildcard_match(&self.unit_pattern, view.name()) {
            return true;
        }

        self.include_subtypes
            && view
                .superclass()
                .into_iter()
                .chain(view.interfaces().iter().map(String::as_str))
                .any(|supertype| wildcard_match(&self.unit_pattern, supertype))
    }
}

impl Matcher for PatternMatcher {
    fn matching(&self, view: &StructuralView) -> Result<MatchingResult> {
        if !self.unit_matches(view) {
            return Ok(MatchingResult::none());
        }

        Ok(view
            .behaviors()
            .iter()
            .filter(|behavior| self.include_constructors || !behavior.is_constructor())
            .filter(|behavior| wildcard_match(&self.behavior_pattern, behavior.name()))
            .map(|behavior| behavior.sign_code())
            .collect())
    }
}
