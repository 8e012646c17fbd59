//! Commit gate
//!
//! The last checkpoint before anything is persisted. Seven checks run in a
//! fixed order and the first failure wins:
//!
//! 1. schema (skipped when no schema is configured)
//! 2. content hash
//! 3. evidence existence
//! 4. evidence freshness
//! 5. capability compliance
//! 6. kill-switch compliance
//! 7. prewrite token present with a matching hash
//!
//! Commit is two-phase. [`CommitGate::validate_eligibility`] runs checks 1-6
//! so a prewrite is only ever created for an eligible bundle;
//! [`CommitGate::validate`] runs all seven; [`CommitGate::promote_to_committed`]
//! moves the prewrite to its committed name exactly once per run.
//!
//! Layout, given a prewrite directory `P`:
//!
//! ```text
//! P/PREWRITE-{run_id}.json
//! P/../committed/COMMITTED-{run_id}.json
//! P/../promotion_log.jsonl
//! ```

use crate::error::{KernelError, KernelResult};
use crate::rejection::{
    CommitResult, CommitStatus, PromoteResult, PromoteStatus, RejectionCode, RejectionPayload,
};
use chrono::{DateTime, FixedOffset};
use dtl_artifact::{parse_timestamp, CommitBundle};
use dtl_constitutional::{CompiledSchema, DISABLE_LEARNING, DISABLE_WRITES};
use dtl_store::{move_noclobber, write_replace, EvidenceStore, JsonlLog, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default evidence TTL: seven days
pub const DEFAULT_EVIDENCE_TTL_SECS: i64 = 7 * 24 * 3600;

/// Claims blocked while `DISABLE_LEARNING` is active
pub const LEARNING_CAPABILITIES: &[&str] = &["routing_statistics_write", "strategy_adaptation"];

/// Caller-supplied inputs for checks 4-6
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    /// Names of enabled kill switches
    pub active_kill_switches: &'a [String],
    /// Capabilities the committing stage may claim
    pub allowed_capabilities: &'a BTreeSet<String>,
    /// Reference instant for freshness (the run timestamp)
    pub now: DateTime<FixedOffset>,
}

/// Prewrite token contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrewriteToken {
    /// Run the token belongs to
    pub run_id: String,
    /// Full bundle hash locked in by the token
    pub bundle_hash: String,
    /// Bundle timestamp
    pub timestamp: String,
    /// Committing stage
    pub agent_id: String,
    /// Evidence the bundle relies on
    pub evidence_refs: Vec<String>,
    /// Claims the bundle makes
    pub capability_claims: Vec<String>,
}

/// Commit gate over an evidence store and a prewrite directory
#[derive(Debug, Clone)]
pub struct CommitGate {
    evidence: EvidenceStore,
    prewrite_dir: PathBuf,
    committed_dir: PathBuf,
    promotion_log: JsonlLog,
    evidence_ttl_secs: i64,
    schema: Option<CompiledSchema>,
}

fn check_run_id(run_id: &str) -> KernelResult<()> {
    let bad = run_id.trim().is_empty()
        || run_id.contains(['/', '\\', '\0'])
        || run_id == "."
        || run_id == "..";
    if bad {
        Err(KernelError::InvalidRunId(run_id.to_string()))
    } else {
        Ok(())
    }
}

impl CommitGate {
    /// Gate with no schema and the default TTL
    #[must_use]
    pub fn new(evidence: EvidenceStore, prewrite_dir: impl Into<PathBuf>) -> Self {
        let prewrite_dir = prewrite_dir.into();
        let ledger_dir = prewrite_dir
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            evidence,
            committed_dir: ledger_dir.join("committed"),
            promotion_log: JsonlLog::new(ledger_dir.join("promotion_log.jsonl")),
            prewrite_dir,
            evidence_ttl_secs: DEFAULT_EVIDENCE_TTL_SECS,
            schema: None,
        }
    }

    /// Enable check 1 with `schema`
    #[must_use]
    pub fn with_schema(mut self, schema: CompiledSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the evidence TTL in seconds
    #[must_use]
    pub const fn with_evidence_ttl_secs(mut self, secs: i64) -> Self {
        self.evidence_ttl_secs = secs;
        self
    }

    /// Evidence TTL in seconds
    #[inline]
    #[must_use]
    pub const fn evidence_ttl_secs(&self) -> i64 {
        self.evidence_ttl_secs
    }

    /// Evidence store consulted by checks 3 and 4
    #[inline]
    #[must_use]
    pub const fn evidence_store(&self) -> &EvidenceStore {
        &self.evidence
    }

    /// Promotion/deletion log
    #[inline]
    #[must_use]
    pub const fn promotion_log(&self) -> &JsonlLog {
        &self.promotion_log
    }

    /// Prewrite token path for `run_id`
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidRunId`] if `run_id` cannot name a file
    pub fn prewrite_path(&self, run_id: &str) -> KernelResult<PathBuf> {
        check_run_id(run_id)?;
        Ok(self.prewrite_dir.join(format!("PREWRITE-{run_id}.json")))
    }

    /// Committed artifact path for `run_id`
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidRunId`] if `run_id` cannot name a file
    pub fn committed_path(&self, run_id: &str) -> KernelResult<PathBuf> {
        check_run_id(run_id)?;
        Ok(self.committed_dir.join(format!("COMMITTED-{run_id}.json")))
    }

    /// Checks 1-6; call before [`Self::create_prewrite`]
    #[must_use]
    pub fn validate_eligibility(&self, bundle: &CommitBundle, ctx: &GateContext<'_>) -> CommitResult {
        let bundle_hash = recomputed_hash(bundle);
        let rejection = self.run_checks(bundle, &bundle_hash, ctx);
        finish(bundle, bundle_hash, rejection, "eligibility")
    }

    /// All seven checks; the authoritative gate
    #[must_use]
    pub fn validate(&self, bundle: &CommitBundle, ctx: &GateContext<'_>) -> CommitResult {
        let bundle_hash = recomputed_hash(bundle);
        let rejection = self
            .run_checks(bundle, &bundle_hash, ctx)
            .or_else(|| self.check_prewrite(bundle, &bundle_hash));
        finish(bundle, bundle_hash, rejection, "commit")
    }

    fn run_checks(&self, bundle: &CommitBundle, bundle_hash: &str, ctx: &GateContext<'_>) -> Option<RejectionPayload> {
        self.check_schema(bundle)
            .or_else(|| check_hash(bundle, bundle_hash))
            .or_else(|| self.check_evidence_exists(bundle))
            .or_else(|| self.check_evidence_freshness(bundle, ctx.now))
            .or_else(|| check_capabilities(bundle, ctx.allowed_capabilities))
            .or_else(|| check_kill_switches(bundle, ctx.active_kill_switches))
    }

    fn check_schema(&self, bundle: &CommitBundle) -> Option<RejectionPayload> {
        let schema = self.schema.as_ref()?;
        let value = match bundle.to_value() {
            Ok(v) => v,
            Err(e) => {
                return Some(
                    RejectionPayload::new(RejectionCode::SchemaInvalid)
                        .with_field("/")
                        .with_details(e.to_string()),
                )
            }
        };
        let violations = schema.validate(&value).err()?;
        let first = violations.first()?;
        Some(
            RejectionPayload::new(RejectionCode::SchemaInvalid)
                .with_field(first.pointer.clone())
                .with_details(first.message.clone()),
        )
    }

    fn check_evidence_exists(&self, bundle: &CommitBundle) -> Option<RejectionPayload> {
        let mut missing: Vec<String> = Vec::new();
        for id in &bundle.evidence_refs {
            if !self.evidence.exists(id) && !missing.contains(id) {
                missing.push(id.clone());
            }
        }
        if missing.is_empty() {
            return None;
        }
        Some(
            RejectionPayload::new(RejectionCode::EvidenceMissing)
                .with_details(format!("Missing evidence files: {}", missing.join(", ")))
                .with_evidence(missing),
        )
    }

    fn check_evidence_freshness(&self, bundle: &CommitBundle, now: DateTime<FixedOffset>) -> Option<RejectionPayload> {
        let mut invalid: Vec<String> = Vec::new();
        let mut stale: Vec<String> = Vec::new();

        for id in &bundle.evidence_refs {
            let fetched_at = self
                .evidence
                .read_raw(id)
                .ok()
                .and_then(|record| record.get("fetched_at").and_then(Value::as_str).map(str::to_string));
            let Some(instant) = fetched_at.and_then(|ts| parse_timestamp(&ts).ok()) else {
                invalid.push(id.clone());
                continue;
            };
            if (now - instant).num_seconds() > self.evidence_ttl_secs {
                stale.push(id.clone());
            }
        }

        if !invalid.is_empty() {
            return Some(
                RejectionPayload::new(RejectionCode::EvidenceInvalidTimestamp)
                    .with_field("fetched_at")
                    .with_details(format!(
                        "Evidence with missing or timezone-less fetched_at: {}",
                        invalid.join(", ")
                    ))
                    .with_evidence(invalid),
            );
        }
        if !stale.is_empty() {
            return Some(
                RejectionPayload::new(RejectionCode::EvidenceStale)
                    .with_details(format!(
                        "Evidence older than {}s: {}",
                        self.evidence_ttl_secs,
                        stale.join(", ")
                    ))
                    .with_evidence(stale),
            );
        }
        None
    }

    fn check_prewrite(&self, bundle: &CommitBundle, bundle_hash: &str) -> Option<RejectionPayload> {
        let path = match self.prewrite_path(&bundle.run_id) {
            Ok(p) => p,
            Err(e) => {
                return Some(
                    RejectionPayload::new(RejectionCode::PrewriteMissing)
                        .with_field("run_id")
                        .with_details(e.to_string()),
                )
            }
        };
        if !path.is_file() {
            return Some(
                RejectionPayload::new(RejectionCode::PrewriteMissing)
                    .with_field("run_id")
                    .with_details(format!("No prewrite found for run {}", bundle.run_id)),
            );
        }
        let token = match read_token(&path) {
            Ok(t) => t,
            Err(e) => {
                return Some(
                    RejectionPayload::new(RejectionCode::PrewriteMissing)
                        .with_details(format!("Invalid prewrite file: {e}")),
                )
            }
        };
        if token.bundle_hash != bundle_hash {
            return Some(
                RejectionPayload::new(RejectionCode::HashMismatch)
                    .with_field("prewrite.bundle_hash")
                    .with_details(format!(
                        "Prewrite hash {} != bundle hash {bundle_hash}",
                        token.bundle_hash
                    )),
            );
        }
        None
    }

    /// Record commit intent for `bundle`, replacing any earlier token for the
    /// same run
    ///
    /// # Errors
    /// Returns error if the run id is unusable or the token cannot be written
    pub fn create_prewrite(&self, bundle: &CommitBundle) -> KernelResult<PathBuf> {
        let path = self.prewrite_path(&bundle.run_id)?;
        let token = PrewriteToken {
            run_id: bundle.run_id.clone(),
            bundle_hash: recomputed_hash(bundle),
            timestamp: bundle.timestamp.clone(),
            agent_id: bundle.agent_id.clone(),
            evidence_refs: bundle.evidence_refs.clone(),
            capability_claims: bundle.capability_claims.clone(),
        };
        write_replace(&path, &serde_json::to_vec_pretty(&token)?)?;
        tracing::debug!(run_id = %bundle.run_id, "Created prewrite {}", path.display());
        Ok(path)
    }

    /// Promote the prewrite for `run_id` to its committed name
    ///
    /// A run already committed is never touched again; a dangling prewrite
    /// for it is removed.
    #[must_use]
    pub fn promote_to_committed(&self, run_id: &str) -> PromoteResult {
        let result = |status, path: Option<PathBuf>, message: String| PromoteResult {
            status,
            run_id: run_id.to_string(),
            path,
            message,
        };

        let (prewrite, committed) = match (self.prewrite_path(run_id), self.committed_path(run_id)) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(e), _) | (_, Err(e)) => return result(PromoteStatus::RenameFailed, None, e.to_string()),
        };

        if committed.exists() {
            self.remove_dangling(&prewrite);
            return result(
                PromoteStatus::AlreadyCommitted,
                Some(committed.clone()),
                format!("Already committed: {}", committed.display()),
            );
        }
        if !prewrite.is_file() {
            return result(
                PromoteStatus::PrewriteNotFound,
                None,
                format!("Prewrite not found: {}", prewrite.display()),
            );
        }

        let timestamp = read_token(&prewrite).ok().map(|t| t.timestamp);

        match move_noclobber(&prewrite, &committed) {
            Ok(()) => {
                let record = json!({
                    "event": "PROMOTED",
                    "run_id": run_id,
                    "committed_file": committed.display().to_string(),
                    "timestamp": timestamp,
                });
                if let Err(e) = self.promotion_log.append(&record) {
                    tracing::warn!(run_id, "Failed to log promotion: {}", e);
                }
                tracing::info!(run_id, "Promoted to {}", committed.display());
                result(
                    PromoteStatus::Success,
                    Some(committed.clone()),
                    format!("Promoted to: {}", committed.display()),
                )
            }
            Err(StoreError::FileExists { .. }) => {
                self.remove_dangling(&prewrite);
                result(
                    PromoteStatus::AlreadyCommitted,
                    Some(committed.clone()),
                    format!("Already committed: {}", committed.display()),
                )
            }
            Err(StoreError::NotFound { .. }) => result(
                PromoteStatus::PrewriteNotFound,
                None,
                format!("Prewrite not found: {}", prewrite.display()),
            ),
            Err(e) => {
                tracing::error!(run_id, "Promotion failed: {}", e);
                result(PromoteStatus::RenameFailed, None, format!("Rename failed: {e}"))
            }
        }
    }

    /// Remove the prewrite for `run_id`; true if one was removed
    ///
    /// Must be called whenever full validation fails after a prewrite was
    /// created.
    pub fn delete_prewrite(&self, run_id: &str) -> bool {
        let Ok(path) = self.prewrite_path(run_id) else {
            return false;
        };
        let timestamp = read_token(&path).ok().map(|t| t.timestamp);
        match fs::remove_file(&path) {
            Ok(()) => {
                let record = json!({
                    "event": "PREWRITE_DELETED",
                    "run_id": run_id,
                    "timestamp": timestamp,
                });
                if let Err(e) = self.promotion_log.append(&record) {
                    tracing::warn!(run_id, "Failed to log prewrite deletion: {}", e);
                }
                tracing::info!(run_id, "Deleted prewrite");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(run_id, "Failed to delete prewrite: {}", e);
                false
            }
        }
    }

    fn remove_dangling(&self, prewrite: &Path) {
        match fs::remove_file(prewrite) {
            Ok(()) => tracing::info!("Removed dangling prewrite {}", prewrite.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove dangling prewrite {}: {}", prewrite.display(), e),
        }
    }
}

fn finish(
    bundle: &CommitBundle,
    bundle_hash: String,
    rejection: Option<RejectionPayload>,
    phase: &str,
) -> CommitResult {
    match &rejection {
        None => tracing::info!(run_id = %bundle.run_id, phase, "Commit gate accepted bundle"),
        Some(r) => tracing::warn!(
            run_id = %bundle.run_id,
            phase,
            code = %r.code,
            "Commit gate rejected bundle: {}",
            r.details.as_deref().unwrap_or("")
        ),
    }
    CommitResult {
        status: if rejection.is_none() {
            CommitStatus::Accepted
        } else {
            CommitStatus::Rejected
        },
        bundle_hash,
        timestamp: bundle.timestamp.clone(),
        rejection,
    }
}

fn recomputed_hash(bundle: &CommitBundle) -> String {
    bundle
        .compute_hash()
        .map_or_else(|_| bundle.content_hash.clone(), |h| h.to_string())
}

fn read_token(path: &Path) -> KernelResult<PrewriteToken> {
    let bytes = fs::read(path).map_err(|e| KernelError::io_error(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn check_hash(bundle: &CommitBundle, computed: &str) -> Option<RejectionPayload> {
    if bundle.verify() {
        return None;
    }
    Some(
        RejectionPayload::new(RejectionCode::HashMismatch)
            .with_field("content_hash")
            .with_details(format!("Expected {computed}, got {}", bundle.content_hash)),
    )
}

fn check_capabilities(bundle: &CommitBundle, allowed: &BTreeSet<String>) -> Option<RejectionPayload> {
    let unauthorized: BTreeSet<&String> = bundle
        .capability_claims
        .iter()
        .filter(|c| !allowed.contains(*c))
        .collect();
    if unauthorized.is_empty() {
        return None;
    }
    let caps: Vec<String> = unauthorized.into_iter().cloned().collect();
    Some(
        RejectionPayload::new(RejectionCode::CapabilityDenied)
            .with_field("capability_claims")
            .with_details(format!("Unauthorized capabilities: {}", caps.join(", ")))
            .with_capabilities(caps),
    )
}

fn check_kill_switches(bundle: &CommitBundle, active: &[String]) -> Option<RejectionPayload> {
    if active.iter().any(|s| s == DISABLE_WRITES) {
        return Some(
            RejectionPayload::new(RejectionCode::KillSwitchBlocked)
                .with_kill_switch(DISABLE_WRITES)
                .with_details("All writes disabled by kill switch"),
        );
    }
    if active.iter().any(|s| s == DISABLE_LEARNING) {
        let blocked: Vec<String> = bundle
            .capability_claims
            .iter()
            .filter(|c| LEARNING_CAPABILITIES.contains(&c.as_str()))
            .cloned()
            .collect();
        if !blocked.is_empty() {
            return Some(
                RejectionPayload::new(RejectionCode::KillSwitchBlocked)
                    .with_kill_switch(DISABLE_LEARNING)
                    .with_details("Learning-related capabilities blocked")
                    .with_capabilities(blocked),
            );
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtl_artifact::{into_payload, EvidenceCandidate, RunConfig, RunMode};
    use pretty_assertions::assert_eq;

    const RUN_TS: &str = "2025-01-15T09:30:00Z";

    struct Env {
        _dir: tempfile::TempDir,
        gate: CommitGate,
        allowed: BTreeSet<String>,
        now: DateTime<FixedOffset>,
    }

    impl Env {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = EvidenceStore::new(dir.path().join("evidence_store"));
            let gate = CommitGate::new(store, dir.path().join("run_ledger").join("prewrite"));
            Self {
                _dir: dir,
                gate,
                allowed: ["write_report".to_string()].into_iter().collect(),
                now: parse_timestamp(RUN_TS).unwrap(),
            }
        }

        fn ctx<'a>(&'a self, switches: &'a [String]) -> GateContext<'a> {
            GateContext {
                active_kill_switches: switches,
                allowed_capabilities: &self.allowed,
                now: self.now,
            }
        }

        fn evidence(&self, id: &str, fetched_at: &str) {
            self.gate
                .evidence_store()
                .put(&EvidenceCandidate::new(id, "https://example.com", 1, fetched_at), None)
                .unwrap();
        }
    }

    fn bundle(refs: &[&str], claims: &[&str]) -> CommitBundle {
        let run = RunConfig::new("RUN-1", RUN_TS, RunMode::Mock).unwrap();
        CommitBundle::seal(
            &run,
            "reporter-v1.0",
            into_payload(json!({"report": "ok"})).unwrap(),
            refs.iter().map(|s| (*s).to_string()).collect(),
            claims.iter().map(|s| (*s).to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn missing_evidence_lists_every_id() {
        let env = Env::new();
        env.evidence("EV-2", RUN_TS);
        let result = env.gate.validate(&bundle(&["EV-1", "EV-2", "EV-3"], &[]), &env.ctx(&[]));
        let rejection = result.rejection.unwrap();
        assert_eq!(rejection.code, RejectionCode::EvidenceMissing);
        assert_eq!(rejection.evidence_ids, vec!["EV-1", "EV-3"]);
    }

    #[test]
    fn tampered_bundle_is_hash_mismatch() {
        let env = Env::new();
        let mut b = bundle(&[], &[]);
        b.payload.insert("report".into(), json!("changed"));
        let result = env.gate.validate_eligibility(&b, &env.ctx(&[]));
        let rejection = result.rejection.unwrap();
        assert_eq!(rejection.code, RejectionCode::HashMismatch);
        assert_eq!(rejection.violating_field.as_deref(), Some("content_hash"));
    }

    #[test]
    fn invalid_timestamp_beats_stale() {
        let env = Env::new();
        env.evidence("EV-OLD", "2020-01-01T00:00:00Z");
        env.evidence("EV-NAIVE", "2025-01-15T09:00:00");
        let result = env.gate.validate_eligibility(&bundle(&["EV-OLD", "EV-NAIVE"], &[]), &env.ctx(&[]));
        let rejection = result.rejection.unwrap();
        assert_eq!(rejection.code, RejectionCode::EvidenceInvalidTimestamp);
        assert_eq!(rejection.evidence_ids, vec!["EV-NAIVE"]);
    }

    #[test]
    fn stale_evidence_rejected_relative_to_run_ts() {
        let env = Env::new();
        env.evidence("EV-OLD", "2025-01-01T00:00:00+00:00");
        env.evidence("EV-NEW", "2025-01-14T09:30:00-05:00");
        let result = env.gate.validate_eligibility(&bundle(&["EV-OLD", "EV-NEW"], &[]), &env.ctx(&[]));
        let rejection = result.rejection.unwrap();
        assert_eq!(rejection.code, RejectionCode::EvidenceStale);
        assert_eq!(rejection.evidence_ids, vec!["EV-OLD"]);
    }

    #[test]
    fn unauthorized_claims_reported_sorted() {
        let env = Env::new();
        let result = env
            .gate
            .validate_eligibility(&bundle(&[], &["zeta", "write_report", "alpha"]), &env.ctx(&[]));
        let rejection = result.rejection.unwrap();
        assert_eq!(rejection.code, RejectionCode::CapabilityDenied);
        assert_eq!(rejection.capabilities, vec!["alpha", "zeta"]);
    }

    #[test]
    fn disable_writes_rejects_unconditionally() {
        let env = Env::new();
        let switches = vec![DISABLE_WRITES.to_string()];
        let result = env.gate.validate_eligibility(&bundle(&[], &[]), &env.ctx(&switches));
        let rejection = result.rejection.unwrap();
        assert_eq!(rejection.code, RejectionCode::KillSwitchBlocked);
        assert_eq!(rejection.kill_switch.as_deref(), Some(DISABLE_WRITES));
    }

    #[test]
    fn disable_learning_rejects_only_learning_claims() {
        let mut env = Env::new();
        env.allowed.insert("strategy_adaptation".into());
        let switches = vec![DISABLE_LEARNING.to_string()];

        assert!(env
            .gate
            .validate_eligibility(&bundle(&[], &["write_report"]), &env.ctx(&switches))
            .accepted());

        let result = env
            .gate
            .validate_eligibility(&bundle(&[], &["write_report", "strategy_adaptation"]), &env.ctx(&switches));
        assert_eq!(result.code(), Some(RejectionCode::KillSwitchBlocked));
    }

    #[test]
    fn eligibility_skips_prewrite_but_validate_requires_it() {
        let env = Env::new();
        let b = bundle(&[], &["write_report"]);
        assert!(env.gate.validate_eligibility(&b, &env.ctx(&[])).accepted());
        assert_eq!(
            env.gate.validate(&b, &env.ctx(&[])).code(),
            Some(RejectionCode::PrewriteMissing)
        );

        env.gate.create_prewrite(&b).unwrap();
        let accepted = env.gate.validate(&b, &env.ctx(&[]));
        assert!(accepted.accepted());
        assert_eq!(accepted.bundle_hash, b.content_hash);
    }

    #[test]
    fn prewrite_for_other_bundle_is_hash_mismatch() {
        let env = Env::new();
        let first = bundle(&[], &[]);
        env.gate.create_prewrite(&first).unwrap();

        let second = bundle(&[], &["write_report"]);
        let rejection = env.gate.validate(&second, &env.ctx(&[])).rejection.unwrap();
        assert_eq!(rejection.code, RejectionCode::HashMismatch);
        assert_eq!(rejection.violating_field.as_deref(), Some("prewrite.bundle_hash"));
    }

    #[test]
    fn schema_failure_carries_pointer() {
        let schema = CompiledSchema::compile(
            "commit_bundle",
            &json!({"type": "object", "properties": {"agent_id": {"pattern": "^x"}}}),
        )
        .unwrap();
        let env = Env::new();
        let gate = env.gate.clone().with_schema(schema);
        let rejection = gate.validate_eligibility(&bundle(&[], &[]), &env.ctx(&[])).rejection.unwrap();
        assert_eq!(rejection.code, RejectionCode::SchemaInvalid);
        assert_eq!(rejection.violating_field.as_deref(), Some("/agent_id"));
    }

    #[test]
    fn promote_then_already_committed() {
        let env = Env::new();
        let b = bundle(&[], &[]);
        env.gate.create_prewrite(&b).unwrap();

        let first = env.gate.promote_to_committed("RUN-1");
        assert_eq!(first.status, PromoteStatus::Success);
        let committed = first.path.clone().unwrap();
        let original = fs::read(&committed).unwrap();

        env.gate.create_prewrite(&bundle(&[], &["write_report"])).unwrap();
        let second = env.gate.promote_to_committed("RUN-1");
        assert_eq!(second.status, PromoteStatus::AlreadyCommitted);
        assert_eq!(fs::read(&committed).unwrap(), original);
        assert!(!env.gate.prewrite_path("RUN-1").unwrap().exists());

        let log = env.gate.promotion_log().read_all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["event"], "PROMOTED");
        assert_eq!(log[0]["timestamp"], RUN_TS);
    }

    #[test]
    fn promote_without_prewrite() {
        let env = Env::new();
        assert_eq!(env.gate.promote_to_committed("RUN-9").status, PromoteStatus::PrewriteNotFound);
    }

    #[test]
    fn delete_prewrite_logs_once() {
        let env = Env::new();
        env.gate.create_prewrite(&bundle(&[], &[])).unwrap();
        assert!(env.gate.delete_prewrite("RUN-1"));
        assert!(!env.gate.delete_prewrite("RUN-1"));
        let log = env.gate.promotion_log().read_all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["event"], "PREWRITE_DELETED");
    }

    #[test]
    fn traversal_run_id_rejected() {
        let env = Env::new();
        assert!(matches!(
            env.gate.prewrite_path("../x"),
            Err(KernelError::InvalidRunId(_))
        ));
        assert_eq!(env.gate.promote_to_committed("..").status, PromoteStatus::RenameFailed);
    }
}
