//! Commit gate result types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why the gate refused a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    /// Bundle does not match the commit-bundle schema
    SchemaInvalid,
    /// Stored hash differs from the recomputed one
    HashMismatch,
    /// Referenced evidence is not in the store
    EvidenceMissing,
    /// Referenced evidence is older than the TTL
    EvidenceStale,
    /// Referenced evidence has no timezone-qualified `fetched_at`
    EvidenceInvalidTimestamp,
    /// Bundle claims capabilities outside the allowed set
    CapabilityDenied,
    /// An active kill switch forbids the commit
    KillSwitchBlocked,
    /// No usable prewrite token for the run
    PrewriteMissing,
}

impl RejectionCode {
    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SchemaInvalid => "SCHEMA_INVALID",
            Self::HashMismatch => "HASH_MISMATCH",
            Self::EvidenceMissing => "EVIDENCE_MISSING",
            Self::EvidenceStale => "EVIDENCE_STALE",
            Self::EvidenceInvalidTimestamp => "EVIDENCE_INVALID_TIMESTAMP",
            Self::CapabilityDenied => "CAPABILITY_DENIED",
            Self::KillSwitchBlocked => "KILL_SWITCH_BLOCKED",
            Self::PrewriteMissing => "PREWRITE_MISSING",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured rejection; never retried automatically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionPayload {
    /// Rejection code
    pub code: RejectionCode,
    /// Offending field or JSON pointer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violating_field: Option<String>,
    /// Evidence ids involved
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_ids: Vec<String>,
    /// Kill switch involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_switch: Option<String>,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Capabilities involved
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl RejectionPayload {
    /// Bare payload for `code`
    #[must_use]
    pub const fn new(code: RejectionCode) -> Self {
        Self {
            code,
            violating_field: None,
            evidence_ids: Vec::new(),
            kill_switch: None,
            details: None,
            capabilities: Vec::new(),
        }
    }

    /// Set the violating field
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.violating_field = Some(field.into());
        self
    }

    /// Set the evidence ids
    #[must_use]
    pub fn with_evidence(mut self, ids: Vec<String>) -> Self {
        self.evidence_ids = ids;
        self
    }

    /// Set the kill switch
    #[must_use]
    pub fn with_kill_switch(mut self, name: impl Into<String>) -> Self {
        self.kill_switch = Some(name.into());
        self
    }

    /// Set the details
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Set the capabilities
    #[must_use]
    pub fn with_capabilities(mut self, caps: Vec<String>) -> Self {
        self.capabilities = caps;
        self
    }
}

/// Gate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitStatus {
    /// Every check passed
    Accepted,
    /// A check failed
    Rejected,
}

/// Outcome of a gate validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// Verdict
    pub status: CommitStatus,
    /// Recomputed bundle hash
    pub bundle_hash: String,
    /// Bundle timestamp
    pub timestamp: String,
    /// Present iff rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionPayload>,
}

impl CommitResult {
    /// Whether the bundle was accepted
    #[inline]
    #[must_use]
    pub fn accepted(&self) -> bool {
        self.status == CommitStatus::Accepted
    }

    /// Rejection code, if rejected
    #[must_use]
    pub fn code(&self) -> Option<RejectionCode> {
        self.rejection.as_ref().map(|r| r.code)
    }
}

/// Promotion outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromoteStatus {
    /// Prewrite moved to committed
    Success,
    /// Run was committed before; nothing changed
    AlreadyCommitted,
    /// No prewrite to promote
    PrewriteNotFound,
    /// Move failed; not retried
    RenameFailed,
}

/// Result of [`crate::CommitGate::promote_to_committed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteResult {
    /// Outcome
    pub status: PromoteStatus,
    /// Run promoted
    pub run_id: String,
    /// Committed artifact, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Human-readable outcome
    pub message: String,
}

impl PromoteResult {
    /// Whether this call performed the promotion
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == PromoteStatus::Success
    }
}
