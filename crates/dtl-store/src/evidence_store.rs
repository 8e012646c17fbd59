//! Write-once evidence records keyed by evidence id

use crate::atomic::{write_json_exclusive, Validator};
use crate::error::{StoreError, StoreResult};
use dtl_artifact::EvidenceCandidate;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory of `{evidence_id}.json` files
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

fn check_key(id: &str) -> StoreResult<()> {
    let bad = id.is_empty()
        || id.contains(['/', '\\'])
        || id == "."
        || id == ".."
        || id.contains('\0');
    if bad {
        Err(StoreError::InvalidKey(id.to_string()))
    } else {
        Ok(())
    }
}

impl EvidenceStore {
    /// Store rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for `evidence_id`
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidKey`] if the id cannot be a file name
    pub fn path_for(&self, evidence_id: &str) -> StoreResult<PathBuf> {
        check_key(evidence_id)?;
        Ok(self.root.join(format!("{evidence_id}.json")))
    }

    /// Whether a record exists for `evidence_id`
    #[must_use]
    pub fn exists(&self, evidence_id: &str) -> bool {
        self.path_for(evidence_id).is_ok_and(|p| p.is_file())
    }

    /// Persist a candidate; existing records are never overwritten
    ///
    /// # Errors
    /// - [`StoreError::FileExists`] if the id is already stored
    /// - [`StoreError::Validation`] if `validator` rejects the record
    pub fn put(
        &self,
        candidate: &EvidenceCandidate,
        validator: Option<Validator<'_>>,
    ) -> StoreResult<PathBuf> {
        let path = self.path_for(&candidate.evidence_id)?;
        let value = serde_json::to_value(candidate)?;
        write_json_exclusive(&path, &value, validator)?;
        tracing::debug!(evidence_id = %candidate.evidence_id, "Stored evidence");
        Ok(path)
    }

    /// Raw JSON of a stored record
    ///
    /// # Errors
    /// Returns error if the record is missing, unreadable, or not JSON
    pub fn read_raw(&self, evidence_id: &str) -> StoreResult<Value> {
        let path = self.path_for(evidence_id)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path })
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Typed stored record
    ///
    /// # Errors
    /// Returns error if the record is missing or not a candidate
    pub fn get(&self, evidence_id: &str) -> StoreResult<EvidenceCandidate> {
        Ok(serde_json::from_value(self.read_raw(evidence_id)?)?)
    }

    /// Every stored evidence id, sorted
    ///
    /// # Errors
    /// Returns error if the directory is unreadable
    pub fn list_ids(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str) -> EvidenceCandidate {
        EvidenceCandidate::new(id, "https://example.com", 2, "2025-01-15T09:30:00Z")
    }

    #[test]
    fn put_get_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path().join("evidence"));

        store.put(&candidate("EV-B"), None).unwrap();
        store.put(&candidate("EV-A"), None).unwrap();

        assert!(store.exists("EV-A"));
        assert!(!store.exists("EV-C"));
        assert_eq!(store.get("EV-B").unwrap(), candidate("EV-B"));
        assert_eq!(store.list_ids().unwrap(), vec!["EV-A", "EV-B"]);
    }

    #[test]
    fn records_are_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        store.put(&candidate("EV-A"), None).unwrap();
        let err = store.put(&candidate("EV-A"), None).unwrap_err();
        assert!(err.is_file_exists());
    }

    #[test]
    fn rejects_path_like_keys() {
        let store = EvidenceStore::new("/tmp/unused");
        assert!(matches!(store.path_for("../x"), Err(StoreError::InvalidKey(_))));
        assert!(!store.exists("a/b"));
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(dir.path());
        assert!(matches!(store.read_raw("EV-X"), Err(StoreError::NotFound { .. })));
    }
}
