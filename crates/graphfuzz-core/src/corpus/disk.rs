use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use libafl_bolts::rands::{Rand, StdRand};
use log::warn;

use super::{CorpusScheduler, SeedRecord};
use crate::error::CorpusError;
use crate::graph::Graph;
use crate::persist::{read_json_lines, JsonlWriter};

/// Default batch size B from §3: every batch file holds exactly this many
/// records except possibly the last (and the still-open one).
pub const DEFAULT_BATCH_SIZE: usize = 1000;

const MAX_BATCH_SAMPLE_ATTEMPTS: usize = 8;

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n.max(1)).unwrap()
}

fn random_instance_id<R: Rand>(rand: &mut R) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..10).map(|_| HEX[rand.below(nz(16))] as char).collect()
}

/// One closed batch: its path and how many records it holds (needed only
/// for `iterate`; `sample` deliberately ignores record counts per the
/// design note in §4.2).
struct ClosedBatch {
    path: PathBuf,
    batch_id: u64,
}

/// Batched on-disk corpus. Appends go to the currently open batch; once it
/// reaches `batch_size` records it is closed (flushed, recorded as a
/// `ClosedBatch`) and a fresh batch file is opened.
///
/// `sample` picks a uniformly random *closed* batch (the open one is never
/// eligible), loads every record in it, and picks uniformly among those —
/// this is deliberately **not** uniform over all records in the corpus; see
/// the design note on `CorpusScheduler::sample`.
pub struct DiskScheduler {
    dir: PathBuf,
    prefix: String,
    instance_id: String,
    batch_size: usize,

    next_seq: u64,
    closed_batches: Vec<ClosedBatch>,
    current_batch_id: u64,
    current_batch_count: usize,
    current_writer: JsonlWriter,

    rand: StdRand,
}

impl DiskScheduler {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, CorpusError> {
        Self::with_batch_size(dir, prefix, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self, CorpusError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|_| CorpusError::DirectoryUnavailable(dir.display().to_string()))?;
        let mut seed_rand = StdRand::with_seed(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0),
        );
        let instance_id = random_instance_id(&mut seed_rand);
        let prefix = prefix.into();
        let first_batch_path = batch_path(&dir, &prefix, &instance_id, 1);
        let current_writer = JsonlWriter::open_append(&first_batch_path)?;
        Ok(Self {
            dir,
            prefix,
            instance_id,
            batch_size: batch_size.max(1),
            next_seq: 1,
            closed_batches: Vec::new(),
            current_batch_id: 1,
            current_batch_count: 0,
            current_writer,
            rand: seed_rand,
        })
    }

    /// Reopen an existing corpus directory for a given (prefix, instance-id)
    /// pair, discovering already-closed batches on disk. Used by the
    /// round-trip test and by a worker resuming a private disk corpus
    /// within one run.
    pub fn reopen(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        instance_id: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self, CorpusError> {
        let dir = dir.into();
        let prefix = prefix.into();
        let instance_id = instance_id.into();
        fs::create_dir_all(&dir)
            .map_err(|_| CorpusError::DirectoryUnavailable(dir.display().to_string()))?;

        let mut closed_batches = Vec::new();
        let mut batch_id = 1u64;
        let mut next_seq = 1u64;
        loop {
            let path = batch_path(&dir, &prefix, &instance_id, batch_id);
            if !path.exists() {
                break;
            }
            match read_json_lines::<SeedRecord>(&path) {
                Ok(records) => {
                    if records.len() < batch_size {
                        // Last, not-yet-closed batch: reopen it for append.
                        next_seq = records.last().map(|r| r.seq + 1).unwrap_or(next_seq);
                        let current_writer = JsonlWriter::open_append(&path)?;
                        return Ok(Self {
                            dir,
                            prefix,
                            instance_id,
                            batch_size: batch_size.max(1),
                            next_seq,
                            closed_batches,
                            current_batch_id: batch_id,
                            current_batch_count: records.len(),
                            current_writer,
                            rand: StdRand::with_seed(batch_id),
                        });
                    }
                    next_seq = records.last().map(|r| r.seq + 1).unwrap_or(next_seq);
                    closed_batches.push(ClosedBatch { path: path.clone(), batch_id });
                    batch_id += 1;
                }
                Err(_) => break,
            }
        }

        let path = batch_path(&dir, &prefix, &instance_id, batch_id);
        let current_writer = JsonlWriter::open_append(&path)?;
        Ok(Self {
            dir,
            prefix,
            instance_id,
            batch_size: batch_size.max(1),
            next_seq,
            closed_batches,
            current_batch_id: batch_id,
            current_batch_count: 0,
            current_writer,
            rand: StdRand::with_seed(batch_id),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn roll_batch_if_full(&mut self) -> Result<(), CorpusError> {
        if self.current_batch_count < self.batch_size {
            return Ok(());
        }
        self.current_writer.flush()?;
        self.closed_batches.push(ClosedBatch {
            path: self.current_writer.path().to_path_buf(),
            batch_id: self.current_batch_id,
        });
        self.current_batch_id += 1;
        self.current_batch_count = 0;
        let path = batch_path(&self.dir, &self.prefix, &self.instance_id, self.current_batch_id);
        self.current_writer = JsonlWriter::open_append(&path)?;
        Ok(())
    }
}

fn batch_path(dir: &Path, prefix: &str, instance_id: &str, batch_id: u64) -> PathBuf {
    dir.join(format!("{prefix}_{instance_id}_batch_{batch_id}.pkl"))
}

impl CorpusScheduler for DiskScheduler {
    fn add(&mut self, graph: Graph, timestamp: f64) -> Result<u64, CorpusError> {
        self.roll_batch_if_full()?;
        let seq = self.next_seq;
        self.next_seq += 1;
        let record = SeedRecord { seq, timestamp, graph };
        self.current_writer.append_json_line(&record)?;
        self.current_batch_count += 1;
        Ok(seq)
    }

    fn sample<R: Rand>(&mut self, rand: &mut R) -> Result<Graph, CorpusError> {
        if self.closed_batches.is_empty() {
            return Err(CorpusError::Empty);
        }
        let mut attempts = 0;
        while attempts < MAX_BATCH_SAMPLE_ATTEMPTS.min(self.closed_batches.len() * 2).max(1) {
            let batch_idx = rand.below(nz(self.closed_batches.len()));
            let path = self.closed_batches[batch_idx].path.clone();
            match read_json_lines::<SeedRecord>(&path) {
                Ok(records) if !records.is_empty() => {
                    let idx = rand.below(nz(records.len()));
                    return Ok(records[idx].graph.clone());
                }
                Ok(_) => {
                    warn!("corpus batch {} is empty, resampling", path.display());
                }
                Err(e) => {
                    let malformed = CorpusError::MalformedBatch(path.display().to_string());
                    warn!("{malformed} ({e}), resampling");
                }
            }
            attempts += 1;
        }
        Err(CorpusError::Empty)
    }

    fn iterate(&mut self) -> Result<Box<dyn Iterator<Item = SeedRecord> + '_>, CorpusError> {
        self.current_writer.flush()?;
        let mut all = Vec::new();
        for batch in &self.closed_batches {
            all.extend(read_json_lines::<SeedRecord>(&batch.path)?);
        }
        let open_path =
            batch_path(&self.dir, &self.prefix, &self.instance_id, self.current_batch_id);
        if open_path.exists() {
            all.extend(read_json_lines::<SeedRecord>(&open_path)?);
        }
        all.sort_by_key(|r| r.seq);
        Ok(Box::new(all.into_iter()))
    }

    fn len(&self) -> usize {
        self.closed_batches.len() * self.batch_size + self.current_batch_count
    }

    fn flush(&mut self) -> Result<(), CorpusError> {
        self.current_writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphAttrs;
    use libafl_bolts::rands::StdRand;

    fn trivial() -> Graph {
        Graph::trivial(GraphAttrs::simple_directed())
    }

    #[test]
    fn round_trip_after_close_and_reopen() {
        let dir = tempdir();
        let mut s = DiskScheduler::with_batch_size(&dir, "seeds", 1000).unwrap();
        s.add(trivial(), 0.0).unwrap();
        s.flush().unwrap();
        let instance_id = s.instance_id().to_string();
        drop(s);

        let mut reopened = DiskScheduler::reopen(&dir, "seeds", instance_id, 1000).unwrap();
        let records: Vec<SeedRecord> = reopened.iterate().unwrap().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].seq, 1);
    }

    #[test]
    fn batching_2500_records_at_1000_produces_three_files_and_full_replay() {
        let dir = tempdir();
        let mut s = DiskScheduler::with_batch_size(&dir, "seeds", 1000).unwrap();
        for _ in 0..2500 {
            s.add(trivial(), 0.0).unwrap();
        }
        s.flush().unwrap();
        assert_eq!(s.closed_batches.len(), 2);
        let records: Vec<SeedRecord> = s.iterate().unwrap().collect();
        assert_eq!(records.len(), 2500);
        let seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
        let expected: Vec<u64> = (1..=2500).collect();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn sample_excludes_the_currently_open_batch() {
        let dir = tempdir();
        let mut s = DiskScheduler::with_batch_size(&dir, "seeds", 1000).unwrap();
        for _ in 0..1000 {
            s.add(trivial(), 0.0).unwrap();
        }
        // Batch 1 is now closed (1000 records); batch 2 is open but empty.
        let mut rand = StdRand::with_seed(3);
        // Must succeed: batch 1 is closed and has records.
        assert!(s.sample(&mut rand).is_ok());

        for _ in 0..999 {
            s.add(trivial(), 0.0).unwrap();
        }
        // Batch 2 now has 999 records but is still open (not yet rolled).
        // sample must still only be able to draw from batch 1.
        for _ in 0..20 {
            assert!(s.sample(&mut rand).is_ok());
        }
    }

    #[test]
    fn sample_on_empty_disk_corpus_fails_recoverably() {
        let dir = tempdir();
        let mut s = DiskScheduler::with_batch_size(&dir, "seeds", 1000).unwrap();
        let mut rand = StdRand::with_seed(9);
        assert!(matches!(s.sample(&mut rand), Err(CorpusError::Empty)));
    }

    fn tempdir() -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("graphfuzz-disk-corpus-test-{nanos}"));
        p
    }
}
