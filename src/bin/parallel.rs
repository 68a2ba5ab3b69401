//! Parallel launcher: runs several `(fuzzer, output-folder, worker-count)`
//! groups, each a disk-backed coordinator with its own worker pool, honoring
//! one global timeout shared across every group.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use graphfuzz_core::coordinator::{run_workers, spawn_deadline_watchdog, SchedulerBackend, WorkerSpec};
use graphfuzz_core::feedback::FeedbackMode;
use graphfuzz_core::fuzzloop::FuzzLoopConfig;
use graphfuzz_core::reporter::{discrepancy_log_name, random_run_id};
use graphfuzz_core::tester::registry;
use graphfuzz_core::tester::{FuzzerName, SeedSource, Tester, TrivialSeedSource};
use graphfuzz_core::{CliError, GraphAttrs};
use libafl_bolts::rands::StdRand;

/// Local mirror of `graphfuzz_core::feedback::FeedbackMode` so this binary
/// crate can derive `clap::ValueEnum` directly, same as `src/bin/fuzz.rs`'s
/// own `FeedbackArg`.
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

/// Fuzz several algorithm families in parallel, each with its own disk
/// corpus and worker-thread pool.
///
/// Takes repeated `NAME FOLDER WORKER_COUNT` triples, e.g.:
/// `graphfuzz-parallel SCC ./scc-out 4 STPL ./stpl-out 2 --timeout 120`
#[derive(Debug, Parser)]
#[command(name = "graphfuzz-parallel", version, about)]
struct Args {
    #[arg(trailing_var_arg = true, allow_hyphen_values = false)]
    groups: Vec<String>,

    #[arg(long, default_value_t = 20)]
    timeout: u64,

    #[arg(long, default_value_t = 60)]
    num_iterations: usize,

    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    #[arg(long, value_enum, default_value_t = FeedbackArg::Regular)]
    feedback_check_type: FeedbackArg,
}

struct Group {
    fuzzer_name: FuzzerName,
    folder: PathBuf,
    workers: usize,
}

fn parse_groups(raw: &[String]) -> Result<Vec<Group>, CliError> {
    if raw.len() % 3 != 0 {
        return Err(CliError::BadGroupSyntax(format!(
            "expected NAME FOLDER WORKER_COUNT triples, got {} trailing arguments",
            raw.len()
        )));
    }
    let mut groups = Vec::with_capacity(raw.len() / 3);
    for chunk in raw.chunks(3) {
        let [name, folder, count] = chunk else { unreachable!() };
        let fuzzer_name = FuzzerName::parse(name)
            .ok_or_else(|| CliError::BadGroupSyntax(format!("unrecognized fuzzer name '{name}'")))?;
        let workers: usize = count.parse().map_err(|_| {
            CliError::BadGroupSyntax(format!("worker count '{count}' is not a number"))
        })?;
        groups.push(Group { fuzzer_name, folder: PathBuf::from(folder), workers });
    }
    Ok(groups)
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
    let groups = parse_groups(&args.groups)?;
    if groups.is_empty() {
        return Err(CliError::BadGroupSyntax(
            "at least one NAME FOLDER WORKER_COUNT group is required".into(),
        ));
    }

    let run_start = Instant::now();
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, finishing current iterations then stopping");
            stop.store(true, Ordering::Relaxed);
        })
        .expect("failed to install interrupt handler");
    }
    let _watchdog =
        spawn_deadline_watchdog(Arc::clone(&stop), run_start, Duration::from_secs(args.timeout));

    let mut naming_rand = StdRand::with_seed(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1),
    );

    for group in groups {
        let tester: Arc<dyn Tester> = registry::for_fuzzer(group.fuzzer_name)
            .map(Arc::from)
            .ok_or(CliError::UnimplementedFuzzer(group.fuzzer_name))?;
        let seed_attrs = registry::attrs_for(group.fuzzer_name);
        let trivial_attrs = seed_attrs.first().copied().unwrap_or_else(GraphAttrs::simple_directed);
        let seed_source: Arc<dyn SeedSource> =
            Arc::new(TrivialSeedSource { default_attrs: trivial_attrs });

        std::fs::create_dir_all(&group.folder).map_err(|e| {
            CliError::CorpusDirUnavailable(group.folder.display().to_string(), e)
        })?;

        let fuzz_cfg = FuzzLoopConfig {
            iterations: args.num_iterations,
            timeout: Duration::from_secs(args.timeout),
            use_multiple_graphs: false,
            trivial_attrs,
            seed_attrs,
        };

        let specs: Vec<WorkerSpec> = (0..group.workers)
            .map(|id| {
                let run_id = random_run_id(&mut naming_rand);
                WorkerSpec {
                    id,
                    log_path: group.folder.join(format!("worker-{id}.log")),
                    discrepancy_log_path: group.folder.join(discrepancy_log_name(
                        &group.fuzzer_name.to_string(),
                        &run_id,
                    )),
                    scheduler: SchedulerBackend::Disk {
                        dir: group.folder.clone(),
                        prefix: format!("{}-worker-{id}", group.fuzzer_name),
                        batch_size: args.batch_size,
                    },
                    fuzz_cfg: fuzz_cfg.clone(),
                    rand_seed: (id as u64 + 1).wrapping_mul(0x9E37_79B9),
                }
            })
            .collect();

        log::info!(
            "starting group {} with {} workers writing to {}",
            group.fuzzer_name,
            group.workers,
            group.folder.display()
        );

        let outcomes = run_workers(
            specs,
            seed_source,
            tester,
            args.feedback_check_type.into(),
            run_start,
            Arc::clone(&stop),
        )?;
        for outcome in outcomes {
            match outcome.result {
                Ok(summary) => log::info!(
                    "{} worker {} finished: {} iterations, {} kept, {} discrepancies",
                    group.fuzzer_name,
                    outcome.id,
                    summary.iterations_run,
                    summary.kept,
                    summary.discrepancies_observed
                ),
                Err(e) => log::error!("{} worker {} failed: {e}", group.fuzzer_name, outcome.id),
            }
        }
    }

    Ok(())
}
