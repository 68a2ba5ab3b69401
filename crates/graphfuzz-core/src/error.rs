//! Crate-wide error types, one per component, following the three-tier
//! policy in the spec: recoverable (logged, loop continues), setup
//! (aborts the worker), fatal (propagates, terminates the run).

use thiserror::Error;

use crate::graph::GraphError;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus is empty")]
    Empty,
    #[error("batch file {0} is malformed or truncated")]
    MalformedBatch(String),
    #[error("i/o error on corpus backend: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize a seed record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("corpus directory {0} does not exist and could not be created")]
    DirectoryUnavailable(String),
}

#[derive(Debug, Error)]
pub enum FuzzError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("shared coverage set mutex was poisoned")]
    CoverageMutexPoisoned,
    #[error("reporter failed to persist a discrepancy record: {0}")]
    ReporterIo(std::io::Error),
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("unknown scheduler backend '{0}'")]
    UnknownScheduler(String),
    #[error("bad parallel launcher arguments: {0}")]
    BadGroupSyntax(String),
    #[error("fuzzer '{0:?}' is recognized but its algorithm family is not bundled in this workspace")]
    UnimplementedFuzzer(crate::tester::FuzzerName),
    #[error("corpus directory '{0}' does not exist and could not be created: {1}")]
    CorpusDirUnavailable(String, std::io::Error),
    #[error("coordinator could not spawn worker {0}: {1}")]
    SpawnFailed(usize, std::io::Error),
    #[error(transparent)]
    Fuzz(#[from] FuzzError),
}
