use std::num::NonZeroUsize;

use libafl_bolts::rands::Rand;

use super::{CorpusScheduler, SeedRecord};
use crate::error::CorpusError;
use crate::graph::Graph;

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n.max(1)).unwrap()
}

/// All records in a single ordered buffer. `sample` picks uniformly,
/// `add`/`sample` are both O(1) (O(n) worst case for `sample`'s clone, but
/// the selection itself is a single RNG draw).
#[derive(Default)]
pub struct InMemoryScheduler {
    records: Vec<SeedRecord>,
    next_seq: u64,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self { records: Vec::new(), next_seq: 1 }
    }

    pub fn records(&self) -> &[SeedRecord] {
        &self.records
    }
}

impl CorpusScheduler for InMemoryScheduler {
    fn add(&mut self, graph: Graph, timestamp: f64) -> Result<u64, CorpusError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.push(SeedRecord { seq, timestamp, graph });
        Ok(seq)
    }

    fn sample<R: Rand>(&mut self, rand: &mut R) -> Result<Graph, CorpusError> {
        if self.records.is_empty() {
            return Err(CorpusError::Empty);
        }
        let idx = rand.below(nz(self.records.len()));
        Ok(self.records[idx].graph.clone())
    }

    fn iterate(&mut self) -> Result<Box<dyn Iterator<Item = SeedRecord> + '_>, CorpusError> {
        Ok(Box::new(self.records.drain(..)))
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn flush(&mut self) -> Result<(), CorpusError> {
        Ok(())
    }
}
