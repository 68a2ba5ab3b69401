//! Differential graph-algorithm fuzzing engine shared by the `graphfuzz`
//! and `graphfuzz-parallel` CLI launchers.
//!
//! A run wires together a [`graph::Graph`] model, a [`mutator`], a
//! [`corpus::CorpusScheduler`] backend, a [`feedback::FeedbackEvaluator`],
//! a caller-supplied [`tester::Tester`]/[`tester::SeedSource`] pair, and a
//! [`reporter::Reporter`], then drives them through [`fuzzloop::run_fuzz_loop`].
//! [`coordinator`] runs several of those loops concurrently, sharing one
//! coverage set across worker threads.

pub mod coordinator;
pub mod corpus;
pub mod error;
pub mod feedback;
pub mod fuzzloop;
pub mod graph;
pub mod mutator;
pub mod persist;
pub mod reporter;
pub mod tester;

pub use error::{CliError, CorpusError, FuzzError};
pub use fuzzloop::{FuzzLoopConfig, FuzzLoopSummary};
pub use graph::{Graph, GraphAttrs};
pub use tester::{FuzzerName, SeedSource, Tester};
