//! Observability of what a registration actually rewrote.

use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicUsize, Ordering},
};

use dashmap::DashSet;

/// Append-only record of the units and behaviors one registration has rewritten.
///
/// Safe under concurrent writers. Entries are never removed while the registration is
/// active; [`AffectStatistic::reset`] is only called at teardown.
#[derive(Debug, Default)]
pub struct AffectStatistic {
    units: DashSet<String>,
    sign_codes: DashSet<String>,
    rewrites: AtomicUsize,
}

/// A point-in-time copy of an [`AffectStatistic`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffectSnapshot {
    /// Names of every rewritten unit
    pub units: BTreeSet<String>,
    /// Signature codes of every rewritten behavior
    pub sign_codes: BTreeSet<String>,
    /// Number of rewrites recorded, counting repeated rewrites of a unit
    pub rewrites: usize,
}

impl AffectStatistic {
    /// Creates an empty statistic.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `unit` was rewritten at the behaviors in `sign_codes`.
    pub fn statistic_affect<'a>(
        &self,
        unit: &str,
        sign_codes: impl IntoIterator<Item = &'a String>,
    ) {
        self.units.insert(unit.to_string());
        for code in sign_codes {
            self.sign_codes.insert(code.clone());
        }
        self.rewrites.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of distinct units rewritten.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Number of distinct behaviors rewritten.
    #[must_use]
    pub fn behavior_count(&self) -> usize {
        self.sign_codes.len()
    }

    /// Returns a copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> AffectSnapshot {
        AffectSnapshot {
            units: self.units.iter().map(|unit| unit.clone()).collect(),
            sign_codes: self.sign_codes.iter().map(|code| code.clone()).collect(),
            rewrites: self.rewrites.load(Ordering::Relaxed),
        }
    }

    /// Drops everything recorded so far.
    pub(crate) fn reset(&self) {
        self.units.clear();
        self.sign_codes.clear();
        self.rewrites.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn accumulates() {
        let statistic = AffectStatistic::new();
        let codes: BTreeSet<String> = ["bar()".to_string(), "baz(int)".to_string()].into();
        statistic.statistic_affect("com.example.Foo", &codes);
        statistic.statistic_affect("com.example.Foo", &codes);

        let snapshot = statistic.snapshot();
        assert_eq!(snapshot.units.len(), 1);
        assert_eq!(snapshot.sign_codes, codes);
        assert_eq!(snapshot.rewrites, 2);

        statistic.reset();
        assert_eq!(statistic.snapshot(), AffectSnapshot::default());
    }

    #[test]
    fn concurrent_writers() {
        let statistic = AffectStatistic::new();
        (0..256).into_par_iter().for_each(|i| {
            let code = vec![format!("m{}()", i % 16)];
            statistic.statistic_affect(&format!("com.example.U{i}"), &code);
        });

        assert_eq!(statistic.unit_count(), 256);
        assert_eq!(statistic.behavior_count(), 16);
        assert_eq!(statistic.snapshot().rewrites, 256);
    }
}
