//! Date-partitioned, write-once run ledger
//!
//! Layout: `{root}/YYYY/MM/DD/{run_id}.json`, the date taken from the run's
//! timestamp so a replay lands in the same partition.

use crate::atomic::write_json_exclusive;
use crate::error::{StoreError, StoreResult};
use dtl_artifact::RunConfig;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Append-only ledger of completed runs
#[derive(Debug, Clone)]
pub struct RunLedger {
    root: PathBuf,
}

fn sorted_children(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
    paths.sort();
    Ok(paths)
}

impl RunLedger {
    /// Ledger rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path an entry for `run` lives at
    #[must_use]
    pub fn path_for(&self, run: &RunConfig) -> PathBuf {
        self.root
            .join(run.date_partition())
            .join(format!("{}.json", run.run_id()))
    }

    /// Record a run; each run id is recorded once per date partition
    ///
    /// # Errors
    /// [`StoreError::FileExists`] if the run is already recorded
    pub fn record(&self, run: &RunConfig, entry: &Value) -> StoreResult<PathBuf> {
        let path = self.path_for(run);
        write_json_exclusive(&path, entry, None)?;
        tracing::info!(run_id = %run.run_id(), "Recorded run in ledger");
        Ok(path)
    }

    fn entry_paths(&self) -> StoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for year in sorted_children(&self.root)? {
            for month in sorted_children(&year)? {
                for day in sorted_children(&month)? {
                    files.extend(
                        sorted_children(&day)?
                            .into_iter()
                            .filter(|p| p.extension().is_some_and(|x| x == "json")),
                    );
                }
            }
        }
        Ok(files)
    }

    /// Find an entry by run id across every partition
    ///
    /// # Errors
    /// Returns error if the ledger is unreadable or the entry is not JSON
    pub fn find_by_run_id(&self, run_id: &str) -> StoreResult<Option<Value>> {
        let wanted = format!("{run_id}.json");
        for path in self.entry_paths()? {
            if path.file_name().is_some_and(|n| n == wanted.as_str()) {
                let bytes = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
                return Ok(Some(serde_json::from_slice(&bytes)?));
            }
        }
        Ok(None)
    }

    /// Most recent `limit` entries, newest first
    ///
    /// # Errors
    /// Returns error if the ledger is unreadable or an entry is not JSON
    pub fn recent(&self, limit: usize) -> StoreResult<Vec<Value>> {
        let mut paths = self.entry_paths()?;
        paths.reverse();
        paths
            .into_iter()
            .take(limit)
            .map(|path| {
                let bytes = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }
}
