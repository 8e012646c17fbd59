//! Reporter: drains the evidence queue, persists what passes the firewall,
//! and seals the commit bundle

use crate::error::StageResult;
use crate::stage::{Stage, StageContext, EVIDENCE_CANDIDATE_SCHEMA};
use dtl_artifact::{
    into_payload, ArtifactError, CapabilityGuard, CommitBundle, EvidenceCandidate, ProposalEnvelope,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Capabilities the commit bundle exercises
pub const BUNDLE_CLAIMS: [&str; 2] = ["write_evidence_store", "write_report"];

const ENVELOPE_CLAIMS: [&str; 4] = [
    "build_commit_bundle",
    "read_evidence_queue",
    "write_evidence_store",
    "write_report",
];

const MAX_REPORT_ITEMS: usize = 10;

/// Report confidence from the average source trust tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Average tier at most 1.5
    High,
    /// Average tier at most 2.5
    Medium,
    /// Anything worse, or no evidence
    Low,
}

impl Confidence {
    /// Confidence for a set of persisted candidates
    #[must_use]
    pub fn from_evidence(evidence: &[EvidenceCandidate]) -> Self {
        if evidence.is_empty() {
            return Self::Low;
        }
        let total: u32 = evidence.iter().map(|e| u32::from(e.source_trust_tier)).sum();
        // Compare sums instead of averages: avg <= 1.5 <=> 2 * total <= 3 * n
        let n = u32::try_from(evidence.len()).unwrap_or(u32::MAX);
        if 2 * total <= 3 * n {
            Self::High
        } else if 2 * total <= 5 * n {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Reporter input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportInput {
    /// Plan the run followed
    pub plan_id: String,
    /// Report summary; derived from the evidence count when absent
    pub summary: Option<String>,
    /// Bundle payload; derived from the plan and evidence when absent
    pub analysis: Option<Map<String, Value>>,
}

/// Reporting stage
#[derive(Debug, Clone)]
pub struct Reporter {
    guard: CapabilityGuard,
}

impl Reporter {
    /// Reporter bound to its guard
    #[inline]
    #[must_use]
    pub const fn new(guard: CapabilityGuard) -> Self {
        Self { guard }
    }

    /// Drain the queue and persist every candidate the firewall accepts
    ///
    /// A candidate already in the store counts as persisted.
    fn persist_evidence(&self, ctx: &mut StageContext<'_>) -> StageResult<Vec<EvidenceCandidate>> {
        let mut persisted = Vec::new();
        for candidate in ctx.queue.dequeue_all() {
            let verdict = ctx.firewall.validate(&serde_json::to_value(&candidate)?, EVIDENCE_CANDIDATE_SCHEMA);
            if !verdict.valid {
                tracing::warn!(
                    run_id = %ctx.run.run_id(),
                    evidence_id = %candidate.evidence_id,
                    "Dropping evidence candidate: {}",
                    verdict.errors.join("; ")
                );
                continue;
            }
            match ctx.evidence.put(&candidate, None) {
                Ok(_) => {}
                Err(e) if e.is_file_exists() => {
                    tracing::debug!(evidence_id = %candidate.evidence_id, "Evidence already stored");
                }
                Err(e) => return Err(e.into()),
            }
            persisted.push(candidate);
        }
        Ok(persisted)
    }
}

impl Stage for Reporter {
    type Input = ReportInput;

    const MANIFEST: &'static str = "reporter.skill.md";

    fn name(&self) -> &'static str {
        "reporter"
    }

    fn guard(&self) -> &CapabilityGuard {
        &self.guard
    }

    fn process(&self, input: ReportInput, ctx: &mut StageContext<'_>) -> StageResult<ProposalEnvelope> {
        let evidence = self.persist_evidence(ctx)?;
        let evidence_refs: Vec<String> = evidence.iter().map(|e| e.evidence_id.clone()).collect();

        let analysis = match input.analysis {
            Some(analysis) => analysis,
            None => into_payload(json!({
                "plan_id": input.plan_id,
                "evidence_count": evidence_refs.len(),
                "analysis_timestamp": ctx.run.run_ts(),
            }))?,
        };

        let bundle_claims = self.guard.validate_claims(BUNDLE_CLAIMS)?;
        let bundle = CommitBundle::seal(
            ctx.run,
            bundle_claims.agent_id(),
            analysis,
            evidence_refs.clone(),
            bundle_claims.claims().to_vec(),
        )?;

        let items: Vec<Value> = evidence
            .iter()
            .take(MAX_REPORT_ITEMS)
            .map(|e| {
                let asset = e
                    .asset_tags
                    .as_ref()
                    .and_then(|tags| tags.first())
                    .map_or("N/A", String::as_str);
                json!({"asset": asset, "evidence_id": e.evidence_id})
            })
            .collect();
        let summary = input
            .summary
            .unwrap_or_else(|| format!("Analysis of {} evidence items", evidence_refs.len()));
        let report = json!({
            "summary": summary,
            "confidence_level": Confidence::from_evidence(&evidence),
            "analysis_items": items,
        });

        tracing::info!(
            run_id = %ctx.run.run_id(),
            evidence = evidence_refs.len(),
            bundle_hash = %bundle.content_hash,
            "Reporter sealed commit bundle"
        );

        let payload = into_payload(json!({
            "commit_bundle": bundle.to_value().map_err(ArtifactError::from)?,
            "report": report,
            "prewrite_required": true,
        }))?;
        self.wrap_output(ctx, payload, ENVELOPE_CLAIMS.iter().map(|c| (*c).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing;
    use dtl_store::{EvidenceCandidateQueue, EvidenceStore};
    use pretty_assertions::assert_eq;

    fn candidate(id: &str, tier: u8) -> EvidenceCandidate {
        EvidenceCandidate::new(id, "https://api.example.com/x", tier, testing::RUN_TS).with_assets(["XAU"])
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(Confidence::from_evidence(&[]), Confidence::Low);
        assert_eq!(
            Confidence::from_evidence(&[candidate("EV-1", 1), candidate("EV-2", 2)]),
            Confidence::High
        );
        assert_eq!(
            Confidence::from_evidence(&[candidate("EV-1", 2), candidate("EV-2", 3)]),
            Confidence::Medium
        );
        assert_eq!(Confidence::from_evidence(&[candidate("EV-1", 3)]), Confidence::Low);
    }

    #[test]
    fn persists_accepted_evidence_and_references_it() {
        let dir = tempfile::tempdir().unwrap();
        let run = testing::run();
        let firewall = testing::firewall();
        let store = EvidenceStore::new(dir.path());
        let mut queue = EvidenceCandidateQueue::new(10);
        queue.enqueue(candidate("EV-AAAAAAAAAAAA", 1));
        // Fails the evidence_candidate id pattern
        queue.enqueue(candidate("EV-bad", 1));
        queue.enqueue(candidate("EV-BBBBBBBBBBBB", 2));

        let envelope = {
            let mut ctx = StageContext {
                run: &run,
                firewall: &firewall,
                queue: &mut queue,
                evidence: &store,
            };
            Reporter::new(testing::guard::<Reporter>(&[]))
                .process(
                    ReportInput {
                        plan_id: "PLAN-0000ABCD".into(),
                        ..ReportInput::default()
                    },
                    &mut ctx,
                )
                .unwrap()
        };

        assert!(queue.is_empty());
        assert_eq!(store.list_ids().unwrap(), vec!["EV-AAAAAAAAAAAA", "EV-BBBBBBBBBBBB"]);

        let bundle = CommitBundle::from_value(envelope.payload()["commit_bundle"].clone()).unwrap();
        assert!(bundle.verify());
        assert_eq!(bundle.evidence_refs, vec!["EV-AAAAAAAAAAAA", "EV-BBBBBBBBBBBB"]);
        assert_eq!(bundle.capability_claims, vec!["write_evidence_store", "write_report"]);
        assert_eq!(bundle.payload["evidence_count"], json!(2));

        let report = &envelope.payload()["report"];
        assert_eq!(report["confidence_level"], json!("high"));
        assert_eq!(report["analysis_items"][0]["asset"], json!("XAU"));
        assert_eq!(report["summary"], json!("Analysis of 2 evidence items"));
    }

    #[test]
    fn already_stored_evidence_is_still_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let run = testing::run();
        let firewall = testing::firewall();
        let store = EvidenceStore::new(dir.path());
        store.put(&candidate("EV-AAAAAAAAAAAA", 1), None).unwrap();
        let mut queue = EvidenceCandidateQueue::new(10);
        queue.enqueue(candidate("EV-AAAAAAAAAAAA", 1));

        let mut ctx = StageContext {
            run: &run,
            firewall: &firewall,
            queue: &mut queue,
            evidence: &store,
        };
        let envelope = Reporter::new(testing::guard::<Reporter>(&[]))
            .process(ReportInput::default(), &mut ctx)
            .unwrap();

        let bundle = CommitBundle::from_value(envelope.payload()["commit_bundle"].clone()).unwrap();
        assert_eq!(bundle.evidence_refs, vec!["EV-AAAAAAAAAAAA"]);
    }
}
