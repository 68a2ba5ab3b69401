//! Single-instance CLI launcher: run one fuzzer against one corpus until
//! its iteration budget is exhausted or the user interrupts it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use graphfuzz_core::corpus::{CorpusScheduler, DiskScheduler, InMemoryScheduler};
use graphfuzz_core::feedback::{CoverageSet, FeedbackEvaluator, FeedbackMode};
use graphfuzz_core::fuzzloop::{run_fuzz_loop, FuzzLoopConfig};
use graphfuzz_core::reporter::{discrepancy_log_name, random_run_id, Reporter};
use graphfuzz_core::tester::registry;
use graphfuzz_core::tester::{FuzzerName, SeedSource, Tester, TrivialSeedSource};
use graphfuzz_core::{CliError, GraphAttrs};
use libafl_bolts::rands::StdRand;

/// Local mirror of `graphfuzz_core::tester::FuzzerName` so this binary
/// crate can derive `clap::ValueEnum` on it directly: the core crate stays
/// free of any CLI-parsing dependency (see its `FuzzerName` doc comment).
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FuzzerArg {
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

impl From<FuzzerArg> for FuzzerName {
    fn from(v: FuzzerArg) -> Self {
        match v {
            FuzzerArg::AdamicAdar => FuzzerName::AdamicAdar,
            FuzzerArg::Bcc => FuzzerName::Bcc,
            FuzzerArg::HarmonicCentrality => FuzzerName::HarmonicCentrality,
            FuzzerArg::JaccardSimilarity => FuzzerName::JaccardSimilarity,
            FuzzerArg::Maxfv => FuzzerName::Maxfv,
            FuzzerArg::MaxMatching => FuzzerName::MaxMatching,
            FuzzerArg::Mst => FuzzerName::Mst,
            FuzzerArg::Scc => FuzzerName::Scc,
            FuzzerArg::Stpl => FuzzerName::Stpl,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum FeedbackArg {
    #[default]
    Regular,
    Coverage,
    Combination,
    Branch,
    None,
}

impl From<FeedbackArg> for FeedbackMode {
    fn from(v: FeedbackArg) -> Self {
        match v {
            FeedbackArg::Regular => FeedbackMode::Regular,
            FeedbackArg::Coverage => FeedbackMode::Coverage,
            FeedbackArg::Combination => FeedbackMode::Combination,
            FeedbackArg::Branch => FeedbackMode::Branch,
            FeedbackArg::None => FeedbackMode::None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputArg {
    #[default]
    Console,
    File,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum SchedulerArg {
    #[default]
    Mem,
    Disk,
}

/// Fuzz a single graph algorithm family for a fixed iteration budget,
/// reporting any discrepancy between its implementations.
#[derive(Debug, Parser)]
#[command(name = "graphfuzz", version, about)]
struct Args {
    /// Which algorithm family to fuzz.
    fuzzer_name: FuzzerArg,

    #[arg(long, default_value_t = 60)]
    num_iterations: usize,

    #[arg(long)]
    use_multiple_graphs: bool,

    #[arg(long, value_enum, default_value_t = FeedbackArg::Regular)]
    feedback_check_type: FeedbackArg,

    #[arg(long, value_enum, default_value_t = OutputArg::Console)]
    output: OutputArg,

    #[arg(long, value_enum, default_value_t = SchedulerArg::Mem)]
    scheduler: SchedulerArg,

    /// Corpus directory; required when `--scheduler disk`.
    #[arg(long)]
    folder: Option<PathBuf>,

    #[arg(long, default_value_t = 20)]
    timeout: u64,
}

fn main() -> std::process::ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let fuzzer_name: FuzzerName = args.fuzzer_name.into();
    let tester: Arc<dyn Tester> = registry::for_fuzzer(fuzzer_name)
        .map(Arc::from)
        .ok_or(CliError::UnimplementedFuzzer(fuzzer_name))?;
    let seed_attrs = registry::attrs_for(fuzzer_name);
    let trivial_attrs = seed_attrs.first().copied().unwrap_or_else(GraphAttrs::simple_directed);
    let seed_source: Arc<dyn SeedSource> = Arc::new(TrivialSeedSource { default_attrs: trivial_attrs });

    let cfg = FuzzLoopConfig {
        iterations: args.num_iterations,
        timeout: Duration::from_secs(args.timeout),
        use_multiple_graphs: args.use_multiple_graphs,
        trivial_attrs,
        seed_attrs,
    };

    let run_start = Instant::now();
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, finishing current iteration then stopping");
            stop.store(true, Ordering::Relaxed);
        })
        .expect("failed to install interrupt handler");
    }

    let mut rand = StdRand::with_seed(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1),
    );
    let run_id = random_run_id(&mut rand);

    let discrepancy_log_path = match args.output {
        OutputArg::File => {
            PathBuf::from(discrepancy_log_name(&fuzzer_name.to_string(), &run_id))
        }
        OutputArg::Console => {
            std::env::temp_dir().join(discrepancy_log_name(&fuzzer_name.to_string(), &run_id))
        }
    };
    let mut reporter = Reporter::new(&discrepancy_log_path)
        .map_err(graphfuzz_core::FuzzError::from)?;
    let feedback = FeedbackEvaluator::new(args.feedback_check_type.into(), CoverageSet::new());

    let summary = match args.scheduler {
        SchedulerArg::Mem => {
            let mut scheduler = InMemoryScheduler::new();
            run_fuzz_loop(
                &cfg,
                &mut scheduler,
                seed_source.as_ref(),
                &tester,
                &feedback,
                &mut reporter,
                &mut rand,
                run_start,
                &stop,
            )
        }
        SchedulerArg::Disk => {
            let folder = args.folder.ok_or_else(|| {
                CliError::CorpusDirUnavailable(
                    "--folder is required with --scheduler disk".into(),
                    std::io::Error::other("missing --folder"),
                )
            })?;
            let mut scheduler = DiskScheduler::new(&folder, fuzzer_name.to_string())
                .map_err(graphfuzz_core::FuzzError::from)?;
            run_fuzz_loop(
                &cfg,
                &mut scheduler,
                seed_source.as_ref(),
                &tester,
                &feedback,
                &mut reporter,
                &mut rand,
                run_start,
                &stop,
            )
        }
    }
    .map_err(CliError::from)?;

    log::info!(
        "ran {} iterations, kept {}, observed {} discrepancies, {} timeouts",
        summary.iterations_run,
        summary.kept,
        summary.discrepancies_observed,
        summary.timeouts
    );
    if args.output == OutputArg::Console {
        println!(
            "{} iterations / {} kept / {} discrepancies / {} timeouts",
            summary.iterations_run, summary.kept, summary.discrepancies_observed, summary.timeouts
        );
    }
    Ok(())
}
