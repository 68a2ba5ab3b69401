//! Append-only JSON-lines persistence, generalized from the teacher's
//! `fuzz/jsonl.rs::JsonlWriter`. Every persisted artifact in this crate
//! (corpus batches, discrepancy logs, per-worker text logs) is an append
//! stream guarded by a single mutex around a buffered file handle.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CorpusError;

/// A cloneable handle to a single append-only file, line-buffered and
/// guarded by a mutex so multiple writers (e.g. the discrepancy log
/// written to from the main loop and flushed at shutdown) share one
/// consistent stream.
#[derive(Clone)]
pub struct JsonlWriter {
    path: PathBuf,
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlWriter {
    pub fn open_append(path: &Path) -> Result<Self, CorpusError> {
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), inner: Arc::new(Mutex::new(BufWriter::new(f))) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_json_line<T: Serialize>(&self, value: &T) -> Result<(), CorpusError> {
        let line = serde_json::to_string(value)?;
        let mut w = self.inner.lock().expect("jsonl writer mutex poisoned");
        writeln!(w, "{line}")?;
        Ok(())
    }

    pub fn append_line(&self, line: &str) -> Result<(), CorpusError> {
        let mut w = self.inner.lock().expect("jsonl writer mutex poisoned");
        writeln!(w, "{line}")?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), CorpusError> {
        let mut w = self.inner.lock().expect("jsonl writer mutex poisoned");
        w.flush()?;
        Ok(())
    }
}

/// Read every line of `path` as a JSON value of type `T`, stopping at EOF.
/// A malformed line is reported as `CorpusError::Serde` rather than
/// panicking; callers (the disk corpus backend) treat that as a skip of
/// the whole batch.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CorpusError> {
    let f = File::open(path)?;
    let r = BufReader::new(f);
    let mut out = Vec::new();
    for line in r.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(serde_json::from_str(trimmed)?);
    }
    Ok(out)
}
