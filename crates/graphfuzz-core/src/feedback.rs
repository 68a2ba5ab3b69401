//! Feedback evaluator (§4.3): decides whether a mutated graph is
//! "interesting" enough to rejoin the corpus, and owns the single shared
//! coverage set every worker reads and writes through one mutex.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::FuzzError;
use crate::graph::Graph;
use crate::tester::TestOutcome;

/// A single coverage observation: either a (file, line) pair or a
/// (file, branch-id) pair, depending on which feedback mode is active.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoverageKey {
    Line(String, u32),
    Branch(String, u32),
}

/// The set of (file, line) or (file, branch-id) pairs observed to have
/// been executed across the whole run. Shared across workers under one
/// mutex — `record_new` is the *only* place that reads, diffs, and writes
/// it, matching the "evaluator is the sole writer" contract in §4.3.
#[derive(Default)]
pub struct CoverageSet {
    inner: Mutex<HashSet<CoverageKey>>,
}

impl CoverageSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashSet<CoverageKey>>, FuzzError> {
        self.inner.lock().map_err(|_| FuzzError::CoverageMutexPoisoned)
    }

    /// Insert any keys in `observed` that are not already present. Returns
    /// whether at least one key was new (i.e. whether this observation is
    /// "interesting" under the coverage/branch feedback modes).
    fn record_new(&self, observed: &[CoverageKey]) -> Result<bool, FuzzError> {
        let mut set = self.lock()?;
        let mut any_new = false;
        for key in observed {
            if set.insert(key.clone()) {
                any_new = true;
            }
        }
        Ok(any_new)
    }

    pub fn len(&self) -> Result<usize, FuzzError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, FuzzError> {
        Ok(self.len()? == 0)
    }
}

/// Which of the five modes in §4.3 is active for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMode {
    Regular,
    Coverage,
    Combination,
    Branch,
    None,
}

impl FeedbackMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "regular" => Some(Self::Regular),
            "coverage" => Some(Self::Coverage),
            "combination" => Some(Self::Combination),
            "branch" => Some(Self::Branch),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// A pure function of (graph, shared coverage set, test outcome) — §4.3
/// requires all four modes to be deterministic given those inputs.
pub struct FeedbackEvaluator {
    mode: FeedbackMode,
    coverage: Arc<CoverageSet>,
}

impl FeedbackEvaluator {
    pub fn new(mode: FeedbackMode, coverage: Arc<CoverageSet>) -> Self {
        Self { mode, coverage }
    }

    pub fn mode(&self) -> FeedbackMode {
        self.mode
    }

    /// Decide whether `outcome` (observed on `_graph`) should be appended
    /// to the corpus.
    pub fn is_interesting(&self, _graph: &Graph, outcome: &TestOutcome) -> Result<bool, FuzzError> {
        let has_discrepancy = !outcome.discrepancies.is_empty();
        match self.mode {
            FeedbackMode::None => Ok(true),
            FeedbackMode::Regular => Ok(has_discrepancy),
            FeedbackMode::Coverage => {
                let lines: Vec<CoverageKey> = outcome
                    .coverage_hits
                    .iter()
                    .filter(|k| matches!(k, CoverageKey::Line(_, _)))
                    .cloned()
                    .collect();
                self.coverage.record_new(&lines)
            }
            FeedbackMode::Branch => {
                let branches: Vec<CoverageKey> = outcome
                    .coverage_hits
                    .iter()
                    .filter(|k| matches!(k, CoverageKey::Branch(_, _)))
                    .cloned()
                    .collect();
                self.coverage.record_new(&branches)
            }
            FeedbackMode::Combination => {
                let new_coverage = self.coverage.record_new(&outcome.coverage_hits)?;
                Ok(has_discrepancy || new_coverage)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphAttrs;
    use crate::tester::DiscrepancyHit;

    fn graph() -> Graph {
        Graph::trivial(GraphAttrs::simple_directed())
    }

    fn outcome(discrepancies: Vec<DiscrepancyHit>, coverage_hits: Vec<CoverageKey>) -> TestOutcome {
        TestOutcome { discrepancies, coverage_hits }
    }

    #[test]
    fn none_mode_always_interesting() {
        let eval = FeedbackEvaluator::new(FeedbackMode::None, CoverageSet::new());
        assert!(eval.is_interesting(&graph(), &outcome(vec![], vec![])).unwrap());
    }

    #[test]
    fn regular_mode_requires_discrepancy() {
        let eval = FeedbackEvaluator::new(FeedbackMode::Regular, CoverageSet::new());
        assert!(!eval.is_interesting(&graph(), &outcome(vec![], vec![])).unwrap());
        let hit = DiscrepancyHit { tag: "a-vs-b".into(), graph: graph() };
        assert!(eval.is_interesting(&graph(), &outcome(vec![hit], vec![])).unwrap());
    }

    #[test]
    fn coverage_mode_only_interesting_on_new_line() {
        let coverage = CoverageSet::new();
        let eval = FeedbackEvaluator::new(FeedbackMode::Coverage, coverage.clone());
        let key = CoverageKey::Line("scc.rs".into(), 42);
        assert!(eval.is_interesting(&graph(), &outcome(vec![], vec![key.clone()])).unwrap());
        // Same key again: no longer new.
        assert!(!eval.is_interesting(&graph(), &outcome(vec![], vec![key])).unwrap());
    }

    #[test]
    fn coverage_set_monotonically_grows() {
        let coverage = CoverageSet::new();
        let eval = FeedbackEvaluator::new(FeedbackMode::Coverage, coverage.clone());
        for i in 0..10 {
            let key = CoverageKey::Line("scc.rs".into(), i);
            eval.is_interesting(&graph(), &outcome(vec![], vec![key])).unwrap();
        }
        assert_eq!(coverage.len().unwrap(), 10);
    }
}
