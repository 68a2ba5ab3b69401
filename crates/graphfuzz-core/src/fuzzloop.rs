//! The fuzz loop (§4.4): pick -> mutate -> test -> evaluate feedback ->
//! (optionally) append -> record discrepancy, for a fixed iteration
//! budget, with a per-iteration timeout wrapping the `Tester` call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use libafl_bolts::rands::StdRand;
use log::warn;

use crate::corpus::CorpusScheduler;
use crate::error::FuzzError;
use crate::feedback::FeedbackEvaluator;
use crate::graph::{Graph, GraphAttrs};
use crate::mutator;
use crate::reporter::Reporter;
use crate::tester::{SeedSource, TestOutcome, Tester};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct FuzzLoopConfig {
    pub iterations: usize,
    pub timeout: Duration,
    pub use_multiple_graphs: bool,
    pub trivial_attrs: GraphAttrs,
    pub seed_attrs: Vec<GraphAttrs>,
}

impl Default for FuzzLoopConfig {
    fn default() -> Self {
        Self {
            iterations: 60,
            timeout: DEFAULT_TIMEOUT,
            use_multiple_graphs: false,
            trivial_attrs: GraphAttrs::simple_directed(),
            seed_attrs: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FuzzLoopSummary {
    pub iterations_run: usize,
    pub kept: usize,
    pub discrepancies_observed: usize,
    pub timeouts: usize,
}

/// Run the `Tester` on `graph` under a cooperative timeout: the call
/// executes on a dedicated thread; if it doesn't answer within `timeout`,
/// the thread is abandoned (detached, never joined) and the iteration is
/// treated as "no discrepancy, not interesting" — the mechanism §9 calls
/// out as acceptable for a tester that may hang or spin.
fn test_with_timeout(
    tester: &Arc<dyn Tester>,
    graph: Graph,
    timestamp: f64,
    timeout: Duration,
) -> Option<TestOutcome> {
    let (tx, rx) = mpsc::channel();
    let tester = Arc::clone(tester);
    std::thread::Builder::new()
        .name("graphfuzz-tester".into())
        .spawn(move || {
            let outcome = tester.test(&graph, timestamp);
            let _ = tx.send(outcome);
        })
        .expect("spawn tester thread");
    rx.recv_timeout(timeout).ok()
}

/// Run `cfg.iterations` fuzz-loop iterations against `scheduler`, seeding
/// it first via `seed_source`. `stop` is checked between iterations so a
/// coordinator's cooperative interrupt (or a global deadline) can end the
/// loop early without losing partial state: the current iteration always
/// finishes before `stop` is honored.
#[allow(clippy::too_many_arguments)]
pub fn run_fuzz_loop<S: CorpusScheduler>(
    cfg: &FuzzLoopConfig,
    scheduler: &mut S,
    seed_source: &dyn SeedSource,
    tester: &Arc<dyn Tester>,
    feedback: &FeedbackEvaluator,
    reporter: &mut Reporter,
    rand: &mut StdRand,
    run_start: Instant,
    stop: &AtomicBool,
) -> Result<FuzzLoopSummary, FuzzError> {
    let mut summary = FuzzLoopSummary::default();

    if cfg.use_multiple_graphs {
        for g in seed_source.initial_multiple(&cfg.seed_attrs) {
            scheduler.add(g, 0.0)?;
        }
    } else {
        scheduler.add(seed_source.initial_single(), 0.0)?;
    }

    for _ in 0..cfg.iterations {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let base = match scheduler.sample(rand) {
            Ok(g) => g,
            Err(_) => {
                warn!("corpus empty, regenerating trivial seed");
                Graph::trivial(cfg.trivial_attrs)
            }
        };

        let mutated = mutator::mutate(&base, rand);
        let now = run_start.elapsed().as_secs_f64();

        let outcome = match test_with_timeout(tester, mutated.clone(), now, cfg.timeout) {
            Some(outcome) => outcome,
            None => {
                warn!("tester timed out after {:?}, treating as no discrepancy", cfg.timeout);
                summary.timeouts += 1;
                TestOutcome::agreement()
            }
        };

        if feedback.is_interesting(&mutated, &outcome)? {
            scheduler.add(mutated.clone(), now)?;
            summary.kept += 1;
        }

        for hit in &outcome.discrepancies {
            reporter.observe(&hit.tag, &hit.graph, now)?;
            summary.discrepancies_observed += 1;
        }

        summary.iterations_run += 1;
    }

    scheduler.flush()?;
    reporter.flush()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::InMemoryScheduler;
    use crate::feedback::{CoverageSet, FeedbackMode};
    use crate::tester::registry::SccTester;
    use crate::tester::TrivialSeedSource;
    use std::sync::atomic::AtomicBool;

    fn tempfile(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("graphfuzz-loop-test-{nanos}-{name}"));
        p
    }

    struct AlwaysHangs;
    impl Tester for AlwaysHangs {
        fn test(&self, _graph: &Graph, _timestamp: f64) -> TestOutcome {
            std::thread::sleep(Duration::from_secs(3600));
            unreachable!()
        }
        fn accepted_attrs(&self) -> Vec<GraphAttrs> {
            vec![GraphAttrs::simple_directed()]
        }
    }

    #[test]
    fn empty_corpus_and_noop_tester_still_make_progress() {
        let cfg = FuzzLoopConfig { iterations: 10, ..FuzzLoopConfig::default() };
        let mut scheduler = InMemoryScheduler::new();
        let seed_source = TrivialSeedSource { default_attrs: cfg.trivial_attrs };
        let tester: Arc<dyn Tester> = Arc::new(SccTester { inject_bug: false });
        let feedback = FeedbackEvaluator::new(FeedbackMode::Regular, CoverageSet::new());
        let mut reporter = Reporter::new(&tempfile("progress.pkl")).unwrap();
        let mut rand = StdRand::with_seed(1);
        let stop = AtomicBool::new(false);

        let summary = run_fuzz_loop(
            &cfg,
            &mut scheduler,
            &seed_source,
            &tester,
            &feedback,
            &mut reporter,
            &mut rand,
            Instant::now(),
            &stop,
        )
        .unwrap();
        assert_eq!(summary.iterations_run, 10);
    }

    #[test]
    fn timeout_resilience_completes_quickly() {
        let cfg = FuzzLoopConfig {
            iterations: 10,
            timeout: Duration::from_millis(200),
            ..FuzzLoopConfig::default()
        };
        let mut scheduler = InMemoryScheduler::new();
        let seed_source = TrivialSeedSource { default_attrs: cfg.trivial_attrs };
        let tester: Arc<dyn Tester> = Arc::new(AlwaysHangs);
        let feedback = FeedbackEvaluator::new(FeedbackMode::Regular, CoverageSet::new());
        let mut reporter = Reporter::new(&tempfile("timeout.pkl")).unwrap();
        let mut rand = StdRand::with_seed(2);
        let stop = AtomicBool::new(false);

        let started = Instant::now();
        let summary = run_fuzz_loop(
            &cfg,
            &mut scheduler,
            &seed_source,
            &tester,
            &feedback,
            &mut reporter,
            &mut rand,
            Instant::now(),
            &stop,
        )
        .unwrap();
        assert_eq!(summary.iterations_run, 10);
        assert_eq!(summary.timeouts, 10);
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[test]
    fn regular_mode_keeps_only_discrepant_graphs() {
        let cfg = FuzzLoopConfig { iterations: 30, ..FuzzLoopConfig::default() };
        let mut scheduler = InMemoryScheduler::new();
        let seed_source = TrivialSeedSource { default_attrs: cfg.trivial_attrs };
        let tester: Arc<dyn Tester> = Arc::new(SccTester { inject_bug: false });
        let feedback = FeedbackEvaluator::new(FeedbackMode::Regular, CoverageSet::new());
        let mut reporter = Reporter::new(&tempfile("regular.pkl")).unwrap();
        let mut rand = StdRand::with_seed(3);
        let stop = AtomicBool::new(false);

        let summary = run_fuzz_loop(
            &cfg,
            &mut scheduler,
            &seed_source,
            &tester,
            &feedback,
            &mut reporter,
            &mut rand,
            Instant::now(),
            &stop,
        )
        .unwrap();
        // SccTester without bug injection never disagrees, so nothing new
        // should have been appended beyond the initial seed.
        assert_eq!(summary.kept, 0);
    }

    #[test]
    fn none_mode_appends_every_iteration() {
        let cfg = FuzzLoopConfig { iterations: 15, ..FuzzLoopConfig::default() };
        let mut scheduler = InMemoryScheduler::new();
        let seed_source = TrivialSeedSource { default_attrs: cfg.trivial_attrs };
        let tester: Arc<dyn Tester> = Arc::new(SccTester { inject_bug: false });
        let feedback = FeedbackEvaluator::new(FeedbackMode::None, CoverageSet::new());
        let mut reporter = Reporter::new(&tempfile("none-mode.pkl")).unwrap();
        let mut rand = StdRand::with_seed(4);
        let stop = AtomicBool::new(false);

        let summary = run_fuzz_loop(
            &cfg,
            &mut scheduler,
            &seed_source,
            &tester,
            &feedback,
            &mut reporter,
            &mut rand,
            Instant::now(),
            &stop,
        )
        .unwrap();
        assert_eq!(summary.kept, 15);
    }

    #[test]
    fn stop_flag_ends_loop_before_budget_exhausted() {
        let cfg = FuzzLoopConfig { iterations: 1_000_000, ..FuzzLoopConfig::default() };
        let mut scheduler = InMemoryScheduler::new();
        let seed_source = TrivialSeedSource { default_attrs: cfg.trivial_attrs };
        let tester: Arc<dyn Tester> = Arc::new(SccTester { inject_bug: false });
        let feedback = FeedbackEvaluator::new(FeedbackMode::Regular, CoverageSet::new());
        let mut reporter = Reporter::new(&tempfile("stop-flag.pkl")).unwrap();
        let mut rand = StdRand::with_seed(5);
        let stop = AtomicBool::new(true);

        let summary = run_fuzz_loop(
            &cfg,
            &mut scheduler,
            &seed_source,
            &tester,
            &feedback,
            &mut reporter,
            &mut rand,
            Instant::now(),
            &stop,
        )
        .unwrap();
        assert_eq!(summary.iterations_run, 0);
    }
}
