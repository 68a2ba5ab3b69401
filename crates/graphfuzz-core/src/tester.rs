//! External capability contracts (§6): `SeedSource` and `Tester`. The core
//! engine only ever calls through these traits; concrete graph algorithms
//! and the initial-seed generator are out of scope per §1.

use serde::{Deserialize, Serialize};

use crate::feedback::CoverageKey;
use crate::graph::{Graph, GraphAttrs};

pub mod registry;

/// One pairwise disagreement the tester found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyHit {
    /// Short human string identifying which pair of implementations
    /// disagreed, e.g. `"tarjan-vs-reference"`.
    pub tag: String,
    pub graph: Graph,
}

/// Everything the fuzz loop learns from running a `Tester` once: the
/// (possibly empty) set of discrepancies, plus any coverage observations
/// attached under `coverage`/`branch` feedback mode. The latter is not
/// part of the discrepancy-reporting contract in §6 — it is a separate,
/// optional capability (`Tester::coverage_hits`), since the spec's
/// `Tester::test` signature is silent on how instrumentation data reaches
/// the evaluator (see the Open Question note in SPEC_FULL.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct TestOutcome {
    pub discrepancies: Vec<DiscrepancyHit>,
    pub coverage_hits: Vec<CoverageKey>,
}

impl TestOutcome {
    pub fn agreement() -> Self {
        Self::default()
    }
}

/// Absolute-tolerance comparison for floating point algorithm outputs.
/// Default 1e-6; relaxed to 1e-3 for link-prediction-style scores
/// (Adamic-Adar, Jaccard similarity), per §6.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance(pub f64);

impl Tolerance {
    pub const DEFAULT: Tolerance = Tolerance(1e-6);
    pub const LINK_PREDICTION: Tolerance = Tolerance(1e-3);

    pub fn agrees(self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.0
    }
}

/// Runs an algorithm family against a graph and reports disagreements.
pub trait Tester: Send + Sync {
    /// `test(G, timestamp) -> outcome`. An empty `discrepancies` list means
    /// every implementation agreed.
    fn test(&self, graph: &Graph, timestamp: f64) -> TestOutcome;

    /// Attribute combinations this tester's algorithm family accepts.
    /// Replaces the original's dry-run probing heuristic (§9 Open
    /// Question) with an explicit allow-list, which the spec permits.
    fn accepted_attrs(&self) -> Vec<GraphAttrs>;
}

/// Produces initial seed graphs admissible for a given algorithm family.
pub trait SeedSource: Send + Sync {
    /// One trivial graph (one node, no edges).
    fn initial_single(&self) -> Graph;

    /// A batch of graphs satisfying the requested attribute combinations.
    fn initial_multiple(&self, attrs: &[GraphAttrs]) -> Vec<Graph>;
}

/// Default `SeedSource`: trivial single-node graphs for whichever
/// attribute combination is requested. A full graph generator is an
/// external collaborator (§1) — this stands in for it in tests and the
/// demonstration CLI.
pub struct TrivialSeedSource {
    pub default_attrs: GraphAttrs,
}

impl SeedSource for TrivialSeedSource {
    fn initial_single(&self) -> Graph {
        Graph::trivial(self.default_attrs)
    }

    fn initial_multiple(&self, attrs: &[GraphAttrs]) -> Vec<Graph> {
        if attrs.is_empty() {
            vec![Graph::trivial(self.default_attrs)]
        } else {
            attrs.iter().map(|&a| Graph::trivial(a)).collect()
        }
    }
}

/// The nine algorithm families named in the CLI surface (§6). Kept free of
/// any CLI-parsing crate so `graphfuzz-core` has no dependency on `clap`;
/// the `graphfuzz` binary crate maps its own `clap::ValueEnum` onto this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuzzerName {
    AdamicAdar,
    Bcc,
    HarmonicCentrality,
    JaccardSimilarity,
    Maxfv,
    MaxMatching,
    Mst,
    Scc,
    Stpl,
}

impl FuzzerName {
    pub const ALL: [FuzzerName; 9] = [
        FuzzerName::AdamicAdar,
        FuzzerName::Bcc,
        FuzzerName::HarmonicCentrality,
        FuzzerName::JaccardSimilarity,
        FuzzerName::Maxfv,
        FuzzerName::MaxMatching,
        FuzzerName::Mst,
        FuzzerName::Scc,
        FuzzerName::Stpl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FuzzerName::AdamicAdar => "AdamicAdar",
            FuzzerName::Bcc => "BCC",
            FuzzerName::HarmonicCentrality => "HarmonicCentrality",
            FuzzerName::JaccardSimilarity => "JaccardSimilarity",
            FuzzerName::Maxfv => "MAXFV",
            FuzzerName::MaxMatching => "MaxMatching",
            FuzzerName::Mst => "MST",
            FuzzerName::Scc => "SCC",
            FuzzerName::Stpl => "STPL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for FuzzerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
