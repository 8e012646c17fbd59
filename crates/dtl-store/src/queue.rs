//! Bounded evidence candidate queue
//!
//! FIFO buffer between the gathering stage and the persisting stage. When
//! full, the oldest entry is dropped to make room. Not for concurrent use:
//! one run owns one queue.
//!
//! With persistence enabled every mutation snapshots
//! `{candidates, total_enqueued, total_dequeued}` so a crashed run can be
//! inspected, and a new queue built on the same path resumes from it.

use crate::atomic::write_replace;
use dtl_artifact::EvidenceCandidate;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

/// Default capacity
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Counters exposed for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Entries currently queued
    pub current_size: usize,
    /// Capacity
    pub max_size: usize,
    /// Accepted enqueues, lifetime
    pub total_enqueued: u64,
    /// Dequeued entries, lifetime
    pub total_dequeued: u64,
    /// Entries evicted by drop-oldest
    pub dropped: u64,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    candidates: Vec<EvidenceCandidate>,
    total_enqueued: u64,
    total_dequeued: u64,
}

/// Bounded, drop-oldest FIFO of [`EvidenceCandidate`]s
#[derive(Debug)]
pub struct EvidenceCandidateQueue {
    max_size: usize,
    items: VecDeque<EvidenceCandidate>,
    ids: HashSet<String>,
    total_enqueued: u64,
    total_dequeued: u64,
    persist_path: Option<PathBuf>,
}

impl EvidenceCandidateQueue {
    /// In-memory queue holding at most `max_size` entries (minimum 1)
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            items: VecDeque::with_capacity(max_size),
            ids: HashSet::new(),
            total_enqueued: 0,
            total_dequeued: 0,
            persist_path: None,
        }
    }

    /// Queue snapshotted to `path`, resuming from an existing snapshot
    ///
    /// An unreadable or corrupt snapshot is logged and ignored.
    #[must_use]
    pub fn with_persistence(max_size: usize, path: impl Into<PathBuf>) -> Self {
        let mut queue = Self::new(max_size);
        let path = path.into();
        queue.restore(&path);
        queue.persist_path = Some(path);
        queue
    }

    fn restore(&mut self, path: &Path) {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!("Cannot read queue snapshot {}: {}", path.display(), e);
                return;
            }
        };
        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Corrupt queue snapshot {}, starting fresh: {}", path.display(), e);
                return;
            }
        };

        self.total_enqueued = snapshot.total_enqueued;
        self.total_dequeued = snapshot.total_dequeued;
        for candidate in snapshot.candidates {
            if self.ids.insert(candidate.evidence_id.clone()) {
                self.items.push_back(candidate);
            }
        }
        while self.items.len() > self.max_size {
            self.evict_oldest();
        }
        tracing::info!(
            restored = self.items.len(),
            "Restored evidence queue from {}",
            path.display()
        );
    }

    fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let snapshot = Snapshot {
            candidates: self.items.iter().cloned().collect(),
            total_enqueued: self.total_enqueued,
            total_dequeued: self.total_dequeued,
        };
        let result = serde_json::to_vec_pretty(&snapshot)
            .map_err(crate::StoreError::from)
            .and_then(|bytes| write_replace(path, &bytes));
        if let Err(e) = result {
            tracing::warn!("Queue snapshot failed: {}", e);
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(old) = self.items.pop_front() {
            self.ids.remove(&old.evidence_id);
            tracing::debug!(evidence_id = %old.evidence_id, "Evicted oldest candidate");
        }
    }

    /// Append a candidate; returns `false` without change if its id is
    /// already queued
    pub fn enqueue(&mut self, candidate: EvidenceCandidate) -> bool {
        if self.ids.contains(&candidate.evidence_id) {
            return false;
        }
        self.ids.insert(candidate.evidence_id.clone());
        self.items.push_back(candidate);
        self.total_enqueued += 1;
        while self.items.len() > self.max_size {
            self.evict_oldest();
        }
        self.persist();
        true
    }

    /// Remove and return the oldest candidate
    pub fn dequeue(&mut self) -> Option<EvidenceCandidate> {
        let candidate = self.items.pop_front()?;
        self.ids.remove(&candidate.evidence_id);
        self.total_dequeued += 1;
        self.persist();
        Some(candidate)
    }

    /// Drain every candidate in FIFO order
    pub fn dequeue_all(&mut self) -> Vec<EvidenceCandidate> {
        let drained: Vec<EvidenceCandidate> = self.items.drain(..).collect();
        self.ids.clear();
        self.total_dequeued += drained.len() as u64;
        self.persist();
        drained
    }

    /// Oldest candidate, without removing it
    #[must_use]
    pub fn peek(&self) -> Option<&EvidenceCandidate> {
        self.items.front()
    }

    /// Every candidate in FIFO order, without removing them
    #[must_use]
    pub fn peek_all(&self) -> Vec<EvidenceCandidate> {
        self.items.iter().cloned().collect()
    }

    /// Drop every candidate without counting them as dequeued
    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
        self.persist();
    }

    /// Iterate in FIFO order
    pub fn iter(&self) -> impl Iterator<Item = &EvidenceCandidate> {
        self.items.iter()
    }

    /// Number of queued candidates
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Capacity
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Observability counters
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let current = self.items.len() as u64;
        QueueStats {
            current_size: self.items.len(),
            max_size: self.max_size,
            total_enqueued: self.total_enqueued,
            total_dequeued: self.total_dequeued,
            dropped: self
                .total_enqueued
                .saturating_sub(self.total_dequeued)
                .saturating_sub(current),
        }
    }
}

impl Default for EvidenceCandidateQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate(id: &str) -> EvidenceCandidate {
        EvidenceCandidate::new(id, "https://example.com", 1, "2025-01-15T09:30:00Z")
    }

    #[test]
    fn duplicate_id_rejected_without_mutation() {
        let mut q = EvidenceCandidateQueue::new(5);
        assert!(q.enqueue(candidate("EV-1")));
        assert!(!q.enqueue(candidate("EV-1")));
        assert_eq!(q.len(), 1);
        assert_eq!(q.stats().total_enqueued, 1);
    }

    #[test]
    fn id_may_return_after_dequeue() {
        let mut q = EvidenceCandidateQueue::new(5);
        q.enqueue(candidate("EV-1"));
        q.dequeue();
        assert!(q.enqueue(candidate("EV-1")));
    }

    #[test]
    fn drop_oldest_when_full() {
        let mut q = EvidenceCandidateQueue::new(2);
        q.enqueue(candidate("EV-1"));
        q.enqueue(candidate("EV-2"));
        q.enqueue(candidate("EV-3"));

        let ids: Vec<_> = q.iter().map(|c| c.evidence_id.as_str()).collect();
        assert_eq!(ids, vec!["EV-2", "EV-3"]);
        assert_eq!(q.stats().dropped, 1);
        // evicted id is free again
        assert!(q.enqueue(candidate("EV-1")));
    }

    #[test]
    fn dequeue_all_drains_fifo() {
        let mut q = EvidenceCandidateQueue::new(10);
        for i in 0..3 {
            q.enqueue(candidate(&format!("EV-{i}")));
        }
        let drained = q.dequeue_all();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].evidence_id, "EV-0");
        assert!(q.is_empty());

        assert_eq!(
            q.stats(),
            QueueStats {
                current_size: 0,
                max_size: 10,
                total_enqueued: 3,
                total_dequeued: 3,
                dropped: 0,
            }
        );
    }

    #[test]
    fn peek_is_non_destructive() {
        let mut q = EvidenceCandidateQueue::new(10);
        q.enqueue(candidate("EV-1"));
        q.enqueue(candidate("EV-2"));
        assert_eq!(q.peek().unwrap().evidence_id, "EV-1");
        assert_eq!(q.peek_all().len(), 2);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let q = EvidenceCandidateQueue::new(0);
        assert_eq!(q.max_size(), 1);
    }

    #[test]
    fn snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue").join("evidence_queue.json");

        {
            let mut q = EvidenceCandidateQueue::with_persistence(10, &path);
            q.enqueue(candidate("EV-1"));
            q.enqueue(candidate("EV-2"));
            q.dequeue();
        }

        let q = EvidenceCandidateQueue::with_persistence(10, &path);
        assert_eq!(q.peek().unwrap().evidence_id, "EV-2");
        assert_eq!(
            q.stats(),
            QueueStats {
                current_size: 1,
                max_size: 10,
                total_enqueued: 2,
                total_dequeued: 1,
                dropped: 0,
            }
        );
    }

    #[test]
    fn corrupt_snapshot_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence_queue.json");
        fs::write(&path, b"{not json").unwrap();

        let q = EvidenceCandidateQueue::with_persistence(10, &path);
        assert!(q.is_empty());
        assert_eq!(q.stats().total_enqueued, 0);
    }
}
