//! Reference stages
//!
//! Deterministic, model-free stages that drive the pipeline end to end:
//! [`Strategist`] plans, [`Researcher`] gathers evidence candidates,
//! [`Reporter`] persists accepted evidence and seals the commit bundle.

mod reporter;
mod researcher;
mod strategist;

pub use reporter::{Confidence, ReportInput, Reporter, BUNDLE_CLAIMS};
pub use researcher::{Researcher, MOCK_SOURCE_LIMIT};
pub use strategist::{
    EvidenceRequest, MarketContext, MarketStatus, Priority, QueryType, ResearchPlan, RoutingStatistics,
    Strategist, MAX_ASSETS,
};
