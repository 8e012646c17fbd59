//! Append-only JSON Lines logs

use crate::error::{StoreError, StoreResult};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One JSON object per line, never rewritten
#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    /// Log at `path`; the file and its parents are created on first append
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    ///
    /// # Errors
    /// Returns error if the record cannot be serialized or written
    pub fn append<T: Serialize>(&self, record: &T) -> StoreResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(&line)
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.sync_data().map_err(|e| StoreError::io(&self.path, e))
    }

    /// Read every record; a missing file reads as empty
    ///
    /// # Errors
    /// Returns error if the file is unreadable or a line is not JSON
    pub fn read_all(&self) -> StoreResult<Vec<Value>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlLog::new(dir.path().join("logs").join("events.jsonl"));

        log.append(&json!({"event": "A"})).unwrap();
        log.append(&json!({"event": "B"})).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records, vec![json!({"event": "A"}), json!({"event": "B"})]);
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlLog::new(dir.path().join("none.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }
}
