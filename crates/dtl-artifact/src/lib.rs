//! DTL Artifact System
//!
//! Tamper-evident data model shared by every control-plane component.
//!
//! # Core Concepts
//!
//! - [`ContentHash`]: SHA-256 over canonical JSON, shown as `sha256:<hex>`
//! - [`RunConfig`]: the `(run_id, run_ts)` determinism anchor
//! - [`ProposalEnvelope`]: hashed stage-to-stage message
//! - [`CommitBundle`]: hashed commit intent checked by the commit gate
//! - [`CapabilityManifest`] / [`CapabilityGuard`]: fail-closed permissions
//!
//! # Example
//!
//! ```rust,ignore
//! use dtl_artifact::{CapabilityGuard, CapabilityManifest, ProposalEnvelope, RunConfig, RunMode};
//!
//! let run = RunConfig::new("RUN-1", "2025-01-15T09:30:00Z", RunMode::Mock)?;
//! let manifest = CapabilityManifest::load("config/manifests/strategist.skill.md")?;
//! let guard = CapabilityGuard::new(manifest, ["read_routing_stats"]);
//!
//! let claims = guard.validate_claims(["propose_plan"])?;
//! let envelope = ProposalEnvelope::create(&run, payload, claims)?;
//! assert!(envelope.verify());
//! ```

#![warn(unreachable_pub)]

// Core modules
mod capability;
mod envelope;
mod error;
mod evidence;
mod hash;
mod ids;
mod manifest;
mod run;

// Re-exports
pub use capability::{effective_allowed, CapabilityDeniedError, CapabilityGuard, ValidatedClaims};
pub use envelope::{into_payload, CommitBundle, ProposalEnvelope, SCHEMA_VERSION};
pub use error::{ArtifactError, ArtifactResult};
pub use evidence::EvidenceCandidate;
pub use hash::{
    canonicalize, hash_hex, to_canonical_bytes, ContentHash, HashError, HASH_PREFIX,
};
pub use ids::{derive_evidence_id, derive_plan_id};
pub use manifest::{
    is_valid_agent_id, CapabilityManifest, ManifestError, ManifestErrorKind, ManifestReport,
};
pub use run::{parse_timestamp, RunConfig, RunMode};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with DTL artifacts
    pub use crate::{
        CapabilityGuard, CapabilityManifest, CommitBundle, ContentHash, EvidenceCandidate,
        ProposalEnvelope, RunConfig, RunMode,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_guard_envelope_flow() {
        let run = RunConfig::new("RUN-7", "2025-03-01T12:00:00+02:00", RunMode::Mock).unwrap();
        let manifest = CapabilityManifest::parse(
            "**Agent ID**: `researcher-v1.0`\n### ALLOWED\n- `fetch_news`\n### DENIED\n- `write_report`\n",
            "researcher.skill.md",
        )
        .unwrap();
        let guard = CapabilityGuard::new(manifest, ["compute_hash"]);

        assert!(guard.validate_claims(["write_report"]).is_err());

        let claims = guard.validate_claims(["fetch_news", "compute_hash"]).unwrap();
        let payload = into_payload(json!({"plan_id": "PLAN-00000000"})).unwrap();
        let envelope = ProposalEnvelope::create(&run, payload, claims).unwrap();

        assert!(envelope.verify());
        let parsed: ContentHash = envelope.content_hash().parse().unwrap();
        assert_eq!(parsed, envelope.compute_hash().unwrap());
    }

    #[test]
    fn evidence_ids_are_replayable() {
        let run = RunConfig::new("RUN-7", "2025-03-01T12:00:00Z", RunMode::Mock).unwrap();
        let first = derive_evidence_id(run.run_id(), run.run_ts(), &["GME", "news", "1"]);
        let replay = RunConfig::new(run.run_id(), run.run_ts(), RunMode::Mock).unwrap();
        let second = derive_evidence_id(replay.run_id(), replay.run_ts(), &["GME", "news", "1"]);
        assert_eq!(first, second);
    }
}
