//! DTL Core
//!
//! Wires the control plane into a runnable pipeline:
//! - [`Stage`]: the contract every stage output goes through
//! - [`Strategist`], [`Researcher`], [`Reporter`]: deterministic reference
//!   stages
//! - [`Orchestrator`]: the eight-step run
//! - [`ControlPlaneConfig`]: `dtl.toml` and the on-disk layout
//!
//! # Example
//!
//! ```rust,ignore
//! use dtl_artifact::{RunConfig, RunMode};
//! use dtl_core::{ControlPlaneConfig, MarketContext, Orchestrator};
//!
//! let config = ControlPlaneConfig::load(".")?;
//! let mut orchestrator = Orchestrator::new(config)?;
//!
//! let run = RunConfig::mint(RunMode::Mock);
//! let result = orchestrator.run(&run, MarketContext::default());
//! println!("{} -> {}", result.run_id, result.system_state);
//! ```

#![warn(unreachable_pub)]

// Core modules
mod config;
mod error;
mod orchestrator;
mod stage;
mod stages;

// Re-exports
pub use config::{ControlPlaneConfig, CONFIG_FILE};
pub use error::{CoreError, CoreResult, StageError, StageResult};
pub use orchestrator::{evaluate_kill_switches, Orchestrator, RunResult, Step, ROUTING_STATS_GRANT};
pub use stage::{
    load_guard, Stage, StageContext, COMMIT_BUNDLE_SCHEMA, EVIDENCE_CANDIDATE_SCHEMA, PROPOSAL_ENVELOPE_SCHEMA,
    ROUTING_STATISTICS_SCHEMA, STRATEGIST_TO_RESEARCHER_SCHEMA,
};
pub use stages::{
    Confidence, EvidenceRequest, MarketContext, MarketStatus, Priority, QueryType, ReportInput, Reporter,
    ResearchPlan, Researcher, RoutingStatistics, Strategist, BUNDLE_CLAIMS, MAX_ASSETS, MOCK_SOURCE_LIMIT,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving runs
    pub use crate::{ControlPlaneConfig, MarketContext, MarketStatus, Orchestrator, RunResult, Stage, Step};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::stages::testing;
    use dtl_store::{EvidenceCandidateQueue, EvidenceStore};

    #[test]
    fn stage_chain_hands_plan_to_researcher() {
        let dir = tempfile::tempdir().unwrap();
        let run = testing::run();
        let firewall = testing::firewall();
        let store = EvidenceStore::new(dir.path());
        let mut queue = EvidenceCandidateQueue::new(100);
        let mut ctx = StageContext {
            run: &run,
            firewall: &firewall,
            queue: &mut queue,
            evidence: &store,
        };

        let plan = Strategist::new(testing::guard::<Strategist>(&[]))
            .process(MarketContext::default(), &mut ctx)
            .unwrap();
        let plan_value = serde_json::Value::Object(plan.payload().clone());
        assert!(firewall.validate(&plan_value, STRATEGIST_TO_RESEARCHER_SCHEMA).valid);

        let plan: ResearchPlan = serde_json::from_value(plan_value).unwrap();
        Researcher::new(testing::guard::<Researcher>(&[]))
            .process(plan, &mut ctx)
            .unwrap();

        // 2 assets x (2 price + 2 news + 2 catalyst)
        assert_eq!(ctx.queue.len(), 12);
    }
}
