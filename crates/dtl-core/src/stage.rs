//! Stage contract
//!
//! A stage turns a typed input into a [`ProposalEnvelope`]. Whatever a stage
//! does internally, its output leaves through [`Stage::wrap_output`], which
//! validates the claimed capabilities against the stage's manifest, hashes
//! the envelope, and passes it through the firewall. A stage cannot emit an
//! envelope that skipped any of the three.

use crate::error::{StageError, StageResult};
use dtl_artifact::{ArtifactError, CapabilityGuard, CapabilityManifest, ProposalEnvelope, RunConfig};
use dtl_constitutional::InterStageFirewall;
use dtl_store::{EvidenceCandidateQueue, EvidenceStore};
use serde_json::{Map, Value};
use std::path::Path;

/// Schema every stage output is checked against
pub const PROPOSAL_ENVELOPE_SCHEMA: &str = "proposal_envelope";
/// Schema for the commit bundle
pub const COMMIT_BUNDLE_SCHEMA: &str = "commit_bundle";
/// Schema for the plan handed from strategist to researcher
pub const STRATEGIST_TO_RESEARCHER_SCHEMA: &str = "strategist_to_researcher";
/// Schema for a queued evidence candidate
pub const EVIDENCE_CANDIDATE_SCHEMA: &str = "evidence_candidate";
/// Schema for routing statistics
pub const ROUTING_STATISTICS_SCHEMA: &str = "routing_statistics";

/// Everything a stage may touch during one run
pub struct StageContext<'a> {
    /// Run being executed
    pub run: &'a RunConfig,
    /// Boundary checks
    pub firewall: &'a InterStageFirewall,
    /// Evidence candidates awaiting persistence
    pub queue: &'a mut EvidenceCandidateQueue,
    /// Write-once evidence records
    pub evidence: &'a EvidenceStore,
}

/// One pipeline stage
pub trait Stage {
    /// Typed input
    type Input;

    /// Manifest file name inside the manifest directory
    const MANIFEST: &'static str;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Guard built from the stage's manifest and runner grants
    fn guard(&self) -> &CapabilityGuard;

    /// Produce the stage's envelope
    ///
    /// # Errors
    /// Returns error if the stage fails or its output is rejected
    fn process(&self, input: Self::Input, ctx: &mut StageContext<'_>) -> StageResult<ProposalEnvelope>;

    /// Validate claims, build the envelope, and run it through the firewall
    ///
    /// # Errors
    /// - [`StageError::CapabilityDenied`] if any claim is not allowed
    /// - [`StageError::FirewallRejected`] if the envelope fails the firewall
    fn wrap_output(
        &self,
        ctx: &StageContext<'_>,
        payload: Map<String, Value>,
        claims: Vec<String>,
    ) -> StageResult<ProposalEnvelope> {
        let claims = self.guard().validate_claims(claims)?;
        let envelope = ProposalEnvelope::create(ctx.run, payload, claims)?;

        let value = envelope.to_value().map_err(ArtifactError::from)?;
        let verdict = ctx.firewall.validate(&value, PROPOSAL_ENVELOPE_SCHEMA);
        if !verdict.valid {
            return Err(StageError::FirewallRejected {
                schema: verdict.schema_name,
                errors: verdict.errors,
            });
        }

        tracing::debug!(
            run_id = %ctx.run.run_id(),
            stage = self.name(),
            hash = %envelope.content_hash(),
            "Stage output accepted"
        );
        Ok(envelope)
    }
}

/// Load the manifest for `S` and combine it with runner grants
///
/// # Errors
/// Returns error if the manifest is missing or invalid
pub fn load_guard<S: Stage>(manifests_dir: &Path, grants: &[String]) -> StageResult<CapabilityGuard> {
    let manifest = CapabilityManifest::load(manifests_dir.join(S::MANIFEST))?;
    Ok(CapabilityGuard::new(manifest, grants.iter().cloned()))
}

pub(crate) fn push_unique(claims: &mut Vec<String>, claim: &str) {
    if !claims.iter().any(|c| c == claim) {
        claims.push(claim.to_string());
    }
}
