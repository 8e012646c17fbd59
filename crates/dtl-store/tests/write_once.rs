//! Write-once and queue eviction properties
//!
//! Tenet: two writers racing for one path produce exactly one winner, and the
//! file holds the winner's bytes.

use dtl_artifact::EvidenceCandidate;
use dtl_store::{write_exclusive, EvidenceCandidateQueue, StoreError};
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn concurrent_writers_exactly_one_wins() {
    for round in 0..20 {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join(format!("race-{round}.json")));
        let writers = 8;
        let barrier = Arc::new(Barrier::new(writers));

        let handles: Vec<_> = (0..writers)
            .map(|i| {
                let path = Arc::clone(&path);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let data = format!("writer-{i}");
                    barrier.wait();
                    (data.clone(), write_exclusive(&path, data.as_bytes()))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
        assert_eq!(winners.len(), 1, "round {round}: exactly one writer must win");

        for (_, result) in &results {
            if let Err(e) = result {
                assert!(
                    matches!(e, StoreError::FileExists { .. }),
                    "losers must observe FileExists, got {e}"
                );
            }
        }

        let on_disk = std::fs::read_to_string(path.as_ref()).unwrap();
        assert_eq!(on_disk, winners[0].0);
    }
}

fn candidate(i: usize) -> EvidenceCandidate {
    EvidenceCandidate::new(format!("EV-{i:012}"), "https://example.com", 1, "2025-01-15T09:30:00Z")
}

proptest! {
    #[test]
    fn prop_overflow_keeps_last_max_size_in_order(max_size in 1usize..20, extra in 0usize..20) {
        let mut q = EvidenceCandidateQueue::new(max_size);
        for i in 0..max_size + extra {
            prop_assert!(q.enqueue(candidate(i)));
        }

        let ids: Vec<String> = q.iter().map(|c| c.evidence_id.clone()).collect();
        let expected: Vec<String> = (extra..max_size + extra).map(|i| candidate(i).evidence_id).collect();
        prop_assert_eq!(ids, expected);
        prop_assert_eq!(q.stats().dropped, extra as u64);
    }
}
