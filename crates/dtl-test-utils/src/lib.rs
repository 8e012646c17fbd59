//! Testing utilities for the DTL workspace
//!
//! A [`Fixture`] is a throwaway project root holding the reference
//! `config/` tree, so integration tests run against the same schemas,
//! manifests and policies the repository ships.

#![allow(missing_docs)]

use dtl_artifact::{into_payload, CommitBundle, EvidenceCandidate, RunConfig, RunMode};
use dtl_store::EvidenceStore;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RUN_TS: &str = "2025-01-15T09:30:00Z";

const REFERENCE_FILES: &[(&str, &str)] = &[
    (
        "schemas/proposal_envelope.json",
        include_str!("../../../config/schemas/proposal_envelope.json"),
    ),
    (
        "schemas/commit_bundle.json",
        include_str!("../../../config/schemas/commit_bundle.json"),
    ),
    (
        "schemas/strategist_to_researcher.json",
        include_str!("../../../config/schemas/strategist_to_researcher.json"),
    ),
    (
        "schemas/evidence_candidate.json",
        include_str!("../../../config/schemas/evidence_candidate.json"),
    ),
    (
        "schemas/routing_statistics.json",
        include_str!("../../../config/schemas/routing_statistics.json"),
    ),
    (
        "manifests/strategist.skill.md",
        include_str!("../../../config/manifests/strategist.skill.md"),
    ),
    (
        "manifests/researcher.skill.md",
        include_str!("../../../config/manifests/researcher.skill.md"),
    ),
    (
        "manifests/reporter.skill.md",
        include_str!("../../../config/manifests/reporter.skill.md"),
    ),
    ("kill_switches.json", include_str!("../../../config/kill_switches.json")),
    (
        "degraded_mode_policy.json",
        include_str!("../../../config/degraded_mode_policy.json"),
    ),
];

/// Temp project root with the reference `config/` tree
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config");
        for (rel, contents) in REFERENCE_FILES {
            let path = config.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join("config")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("data")
    }

    pub fn evidence_store(&self) -> EvidenceStore {
        EvidenceStore::new(self.data_dir().join("evidence_store"))
    }

    pub fn prewrite_dir(&self) -> PathBuf {
        self.data_dir().join("run_ledger").join("prewrite")
    }

    pub fn committed_file(&self, run_id: &str) -> PathBuf {
        self.data_dir()
            .join("run_ledger")
            .join("committed")
            .join(format!("COMMITTED-{run_id}.json"))
    }

    pub fn run_artifact(&self, run_id: &str) -> PathBuf {
        self.data_dir().join("dtl_runs").join(format!("{run_id}.json"))
    }

    pub fn read_json(&self, path: impl AsRef<Path>) -> Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    /// Overwrite a file under `config/`
    pub fn write_config(&self, rel: &str, contents: &str) {
        let path = self.config_dir().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Turn a kill switch on in `config/kill_switches.json`
    pub fn enable_switch(&self, name: &str, enforcement: &str) {
        let path = self.config_dir().join("kill_switches.json");
        let mut policy = self.read_json(&path);
        policy["switches"][name]["enabled"] = json!(true);
        policy["switches"][name]["enforcement"] = json!(enforcement);
        fs::write(path, serde_json::to_vec_pretty(&policy).unwrap()).unwrap();
    }

    /// Write `data/routing_statistics.json`
    pub fn write_routing_stats(&self, stats: &Value) {
        let path = self.data_dir().join("routing_statistics.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_vec_pretty(stats).unwrap()).unwrap();
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run_config(run_id: &str) -> RunConfig {
    RunConfig::new(run_id, RUN_TS, RunMode::Mock).unwrap()
}

pub fn evidence(id: &str, fetched_at: &str) -> EvidenceCandidate {
    EvidenceCandidate::new(id, "https://api.example.com/evidence", 2, fetched_at)
        .with_summary("Test evidence")
        .with_assets(["XAU"])
}

pub fn sealed_bundle(run: &RunConfig, evidence_refs: &[&str], claims: &[&str]) -> CommitBundle {
    CommitBundle::seal(
        run,
        "reporter-v1.0",
        into_payload(json!({"evidence_count": evidence_refs.len()})).unwrap(),
        evidence_refs.iter().map(|r| (*r).to_string()).collect(),
        claims.iter().map(|c| (*c).to_string()).collect(),
    )
    .unwrap()
}
