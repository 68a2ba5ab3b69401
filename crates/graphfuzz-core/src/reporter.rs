//! Stateful discrepancy collector (§4.6). Keeps the two in-memory mappings
//! and persists every discrepancy record to the per-run, per-algorithm
//! `.pkl` log named by §3.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;

use libafl_bolts::rands::Rand;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::CorpusError;
use crate::graph::Graph;
use crate::persist::JsonlWriter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub tag: String,
    pub graph: Graph,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ReporterSnapshot {
    pub first_seen_at: HashMap<String, f64>,
    pub total_count: HashMap<String, u64>,
}

/// Builds the `{algorithm}_discrepancy_{run-id}.pkl` file name from §3/§6.
pub fn discrepancy_log_name(algorithm: &str, run_id: &str) -> String {
    format!("{algorithm}_discrepancy_{run_id}.pkl")
}

/// A fresh 8-hex-digit run id, per §3 ("keyed by an 8-hex-digit run id"),
/// generated the same way `corpus::disk`'s 10-hex-digit instance ids are.
pub fn random_run_id<R: Rand>(rand: &mut R) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let nz16 = NonZeroUsize::new(16).unwrap();
    (0..8).map(|_| HEX[rand.below(nz16)] as char).collect()
}

pub struct Reporter {
    first_seen_at: HashMap<String, f64>,
    total_count: HashMap<String, u64>,
    discrepancy_log: JsonlWriter,
}

impl Reporter {
    pub fn new(discrepancy_log_path: &Path) -> Result<Self, CorpusError> {
        Ok(Self {
            first_seen_at: HashMap::new(),
            total_count: HashMap::new(),
            discrepancy_log: JsonlWriter::open_append(discrepancy_log_path)?,
        })
    }

    /// Record one discrepancy observation. First occurrence of `tag` is
    /// write-once and logs an announcement line; `total_count[tag]` always
    /// increments. The full record (tag, graph, timestamp) is always
    /// persisted, regardless of whether this is a first occurrence.
    pub fn observe(&mut self, tag: &str, graph: &Graph, at_seconds: f64) -> Result<(), CorpusError> {
        if !self.first_seen_at.contains_key(tag) {
            self.first_seen_at.insert(tag.to_string(), at_seconds);
            info!("Recorded first occurrence of '{tag}' at {at_seconds} seconds since start.");
        }
        *self.total_count.entry(tag.to_string()).or_insert(0) += 1;

        let record = DiscrepancyRecord { tag: tag.to_string(), graph: graph.clone(), timestamp: at_seconds };
        self.discrepancy_log.append_json_line(&record)
    }

    pub fn snapshot(&self) -> ReporterSnapshot {
        ReporterSnapshot {
            first_seen_at: self.first_seen_at.clone(),
            total_count: self.total_count.clone(),
        }
    }

    pub fn flush(&self) -> Result<(), CorpusError> {
        self.discrepancy_log.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphAttrs;
    use libafl_bolts::rands::StdRand;

    #[test]
    fn random_run_id_is_eight_hex_digits() {
        let mut rand = StdRand::with_seed(5);
        let id = random_run_id(&mut rand);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    fn tempfile(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("graphfuzz-reporter-test-{nanos}-{name}"));
        p
    }

    #[test]
    fn first_seen_is_idempotent_and_count_accumulates() {
        let path = tempfile("discrepancies.pkl");
        let mut r = Reporter::new(&path).unwrap();
        let g = Graph::trivial(GraphAttrs::simple_directed());
        r.observe("tarjan-vs-buggy", &g, 1.0).unwrap();
        r.observe("tarjan-vs-buggy", &g, 2.0).unwrap();
        r.observe("tarjan-vs-buggy", &g, 3.0).unwrap();
        let snap = r.snapshot();
        assert_eq!(snap.first_seen_at["tarjan-vs-buggy"], 1.0);
        assert_eq!(snap.total_count["tarjan-vs-buggy"], 3);
    }

    #[test]
    fn scc_scenario_after_one_iteration() {
        let path = tempfile("scc-discrepancies.pkl");
        let mut r = Reporter::new(&path).unwrap();
        let g = Graph::trivial(GraphAttrs::simple_directed());
        r.observe("tarjan-vs-buggy", &g, 0.0).unwrap();
        let snap = r.snapshot();
        assert!((snap.first_seen_at["tarjan-vs-buggy"] - 0.0).abs() < 1e-9);
        assert_eq!(snap.total_count["tarjan-vs-buggy"], 1);
    }
}
