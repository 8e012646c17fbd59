//! Researcher: research plan in, queued evidence candidates out

use super::strategist::{QueryType, ResearchPlan};
use crate::error::StageResult;
use crate::stage::{push_unique, Stage, StageContext};
use dtl_artifact::{derive_evidence_id, into_payload, CapabilityGuard, EvidenceCandidate, ProposalEnvelope, RunConfig};
use serde_json::json;

/// Sources consulted per request in mock mode
pub const MOCK_SOURCE_LIMIT: u32 = 2;

/// Evidence-gathering stage
///
/// Candidates only go onto the queue; persisting them is the reporter's
/// job.
#[derive(Debug, Clone)]
pub struct Researcher {
    guard: CapabilityGuard,
}

impl Researcher {
    /// Researcher bound to its guard
    #[inline]
    #[must_use]
    pub const fn new(guard: CapabilityGuard) -> Self {
        Self { guard }
    }

    /// Deterministic candidate for one `(asset, query_type, source)` triple
    #[must_use]
    pub fn fetch_evidence(run: &RunConfig, asset: &str, query_type: QueryType, source_idx: u32) -> EvidenceCandidate {
        let idx = source_idx.to_string();
        let evidence_id = derive_evidence_id(run.run_id(), run.run_ts(), &[asset, query_type.as_str(), &idx]);

        EvidenceCandidate::new(
            evidence_id,
            query_type.source_url(asset),
            query_type.trust_tier(),
            run.run_ts(),
        )
        .with_summary(format!("{} data for {asset} from source {}", query_type.title(), source_idx + 1))
        .with_relevance(f64::from(8u32.saturating_sub(source_idx)) / 10.0)
        .with_assets([asset])
    }
}

impl Stage for Researcher {
    type Input = ResearchPlan;

    const MANIFEST: &'static str = "researcher.skill.md";

    fn name(&self) -> &'static str {
        "researcher"
    }

    fn guard(&self) -> &CapabilityGuard {
        &self.guard
    }

    fn process(&self, plan: ResearchPlan, ctx: &mut StageContext<'_>) -> StageResult<ProposalEnvelope> {
        let mut candidates = Vec::new();
        let mut claims = Vec::new();

        for asset in &plan.asset_universe {
            for request in &plan.evidence_requests {
                if let Some(claim) = request.query_type.claim() {
                    push_unique(&mut claims, claim);
                }
                for idx in 0..request.max_sources.min(MOCK_SOURCE_LIMIT) {
                    let candidate = Self::fetch_evidence(ctx.run, asset, request.query_type, idx);
                    if !ctx.queue.enqueue(candidate.clone()) {
                        tracing::debug!(evidence_id = %candidate.evidence_id, "Candidate already queued");
                    }
                    push_unique(&mut claims, "enqueue_evidence");
                    candidates.push(candidate);
                }
            }
        }
        push_unique(&mut claims, "compute_hash");

        tracing::info!(
            run_id = %ctx.run.run_id(),
            plan_id = %plan.plan_id,
            candidates = candidates.len(),
            queued = ctx.queue.len(),
            "Researcher gathered evidence"
        );

        let payload = into_payload(json!({
            "evidence_candidates": candidates,
            "plan_id": plan.plan_id,
        }))?;
        self.wrap_output(ctx, payload, claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::strategist::{EvidenceRequest, Priority};
    use crate::stages::testing;
    use dtl_store::{EvidenceCandidateQueue, EvidenceStore};
    use pretty_assertions::assert_eq;

    fn plan(requests: Vec<EvidenceRequest>) -> ResearchPlan {
        ResearchPlan {
            plan_id: "PLAN-0000ABCD".into(),
            asset_universe: vec!["XAU".into(), "GME".into()],
            evidence_requests: requests,
            priority: Priority::High,
        }
    }

    #[test]
    fn candidates_are_deterministic() {
        let run = testing::run();
        let a = Researcher::fetch_evidence(&run, "XAU", QueryType::News, 1);
        let b = Researcher::fetch_evidence(&run, "XAU", QueryType::News, 1);

        assert_eq!(a, b);
        assert_eq!(a.fetched_at, run.run_ts());
        assert_eq!(a.source_trust_tier, 2);
        assert_eq!(a.summary.as_deref(), Some("News data for XAU from source 2"));
        assert_eq!(a.relevance_score, Some(0.7));
        assert_ne!(a.evidence_id, Researcher::fetch_evidence(&run, "XAU", QueryType::News, 0).evidence_id);
    }

    #[test]
    fn every_candidate_is_queued_and_claims_follow_usage() {
        let dir = tempfile::tempdir().unwrap();
        let run = testing::run();
        let firewall = testing::firewall();
        let mut queue = EvidenceCandidateQueue::new(100);
        let store = EvidenceStore::new(dir.path());
        let researcher = Researcher::new(testing::guard::<Researcher>(&[]));

        let envelope = {
            let mut ctx = StageContext {
                run: &run,
                firewall: &firewall,
                queue: &mut queue,
                evidence: &store,
            };
            researcher
                .process(
                    plan(vec![
                        EvidenceRequest {
                            query_type: QueryType::Price,
                            max_sources: 3,
                        },
                        EvidenceRequest {
                            query_type: QueryType::Catalyst,
                            max_sources: 1,
                        },
                    ]),
                    &mut ctx,
                )
                .unwrap()
        };

        // 2 assets x (2 price + 1 catalyst)
        assert_eq!(queue.len(), 6);
        assert_eq!(envelope.payload()["evidence_candidates"].as_array().unwrap().len(), 6);
        assert_eq!(
            envelope.capability_claims(),
            ["fetch_market_data", "enqueue_evidence", "compute_hash"]
        );
        assert!(store.list_ids().unwrap().is_empty());
    }

    #[test]
    fn empty_plan_still_claims_hashing() {
        let dir = tempfile::tempdir().unwrap();
        let run = testing::run();
        let firewall = testing::firewall();
        let mut queue = EvidenceCandidateQueue::new(10);
        let store = EvidenceStore::new(dir.path());
        let mut ctx = StageContext {
            run: &run,
            firewall: &firewall,
            queue: &mut queue,
            evidence: &store,
        };

        let envelope = Researcher::new(testing::guard::<Researcher>(&[]))
            .process(plan(vec![]), &mut ctx)
            .unwrap();
        assert_eq!(envelope.capability_claims(), ["compute_hash"]);
    }
}
