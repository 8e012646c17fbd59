//! Strategist: market context in, research plan out

use crate::error::{StageError, StageResult};
use crate::stage::{Stage, StageContext};
use dtl_artifact::{derive_plan_id, into_payload, CapabilityGuard, ProposalEnvelope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Most assets a single plan may cover
pub const MAX_ASSETS: usize = 10;

const DEFAULT_ASSETS: [&str; 2] = ["XAU", "GME"];

/// Trading session the run belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    /// Before the open
    #[default]
    PreMarket,
    /// Regular session
    Open,
    /// After the close
    Closed,
}

impl MarketStatus {
    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreMarket => "pre_market",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketStatus {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre_market" => Ok(Self::PreMarket),
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(StageError::InvalidInput(format!("unknown market status '{other}'"))),
        }
    }
}

/// Read-only per-asset weights from earlier runs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutingStatistics {
    /// When the weights were last recomputed
    pub updated_at: String,
    /// Runs the weights are based on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_count: Option<u64>,
    /// Weight per asset; higher is planned first
    pub asset_weights: BTreeMap<String, f64>,
}

impl RoutingStatistics {
    fn weight(&self, asset: &str) -> f64 {
        self.asset_weights.get(asset).copied().unwrap_or(0.0)
    }
}

/// Strategist input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketContext {
    /// Current session
    pub market_status: MarketStatus,
    /// Candidate assets; empty means the default universe
    pub available_assets: Vec<String>,
    /// Present only when the runner granted `read_routing_stats`
    pub routing_stats: Option<RoutingStatistics>,
}

/// Kind of evidence requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Trades and quotes
    Price,
    /// News articles
    News,
    /// Social sentiment
    Sentiment,
    /// Earnings and other catalysts
    Catalyst,
    /// Technical indicators
    Technical,
}

impl QueryType {
    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::News => "news",
            Self::Sentiment => "sentiment",
            Self::Catalyst => "catalyst",
            Self::Technical => "technical",
        }
    }

    /// Capitalized form used in summaries
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Price => "Price",
            Self::News => "News",
            Self::Sentiment => "Sentiment",
            Self::Catalyst => "Catalyst",
            Self::Technical => "Technical",
        }
    }

    /// Capability exercised when gathering this kind of evidence
    #[must_use]
    pub const fn claim(self) -> Option<&'static str> {
        match self {
            Self::Price => Some("fetch_market_data"),
            Self::News => Some("fetch_news"),
            Self::Sentiment => Some("fetch_sentiment"),
            Self::Catalyst | Self::Technical => None,
        }
    }

    /// Source trust tier, 1 is an official API
    #[must_use]
    pub const fn trust_tier(self) -> u8 {
        match self {
            Self::Price => 1,
            Self::News | Self::Technical => 2,
            Self::Sentiment | Self::Catalyst => 3,
        }
    }

    /// Source URL for `asset`
    #[must_use]
    pub fn source_url(self, asset: &str) -> String {
        match self {
            Self::Price => format!("https://api.alpaca.markets/v2/stocks/{asset}/trades"),
            Self::News => format!("https://api.polygon.io/v2/reference/news?ticker={asset}"),
            Self::Sentiment => format!("https://api.socialsentiment.io/v1/{asset}"),
            Self::Catalyst => format!("https://api.earningswhispers.com/v1/{asset}"),
            Self::Technical => format!("https://api.tradingview.com/indicators/{asset}"),
        }
    }
}

/// One `{query_type, max_sources}` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRequest {
    /// Kind of evidence
    pub query_type: QueryType,
    /// Sources to consult
    pub max_sources: u32,
}

impl EvidenceRequest {
    const fn new(query_type: QueryType, max_sources: u32) -> Self {
        Self {
            query_type,
            max_sources,
        }
    }
}

/// Run urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Pre-market
    High,
    /// Regular session
    Normal,
    /// After the close
    Low,
}

/// Plan handed from strategist to researcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    /// `PLAN-` id derived from the run
    pub plan_id: String,
    /// Assets to research
    pub asset_universe: Vec<String>,
    /// Evidence to gather per asset
    pub evidence_requests: Vec<EvidenceRequest>,
    /// Urgency
    pub priority: Priority,
}

fn requests_for(status: MarketStatus) -> Vec<EvidenceRequest> {
    match status {
        MarketStatus::PreMarket => vec![
            EvidenceRequest::new(QueryType::Price, 3),
            EvidenceRequest::new(QueryType::News, 3),
            EvidenceRequest::new(QueryType::Catalyst, 2),
        ],
        MarketStatus::Open => vec![
            EvidenceRequest::new(QueryType::Price, 5),
            EvidenceRequest::new(QueryType::Technical, 2),
        ],
        MarketStatus::Closed => vec![EvidenceRequest::new(QueryType::News, 2)],
    }
}

const fn priority_for(status: MarketStatus) -> Priority {
    match status {
        MarketStatus::PreMarket => Priority::High,
        MarketStatus::Open => Priority::Normal,
        MarketStatus::Closed => Priority::Low,
    }
}

/// Planning stage
#[derive(Debug, Clone)]
pub struct Strategist {
    guard: CapabilityGuard,
}

impl Strategist {
    /// Strategist bound to its guard
    #[inline]
    #[must_use]
    pub const fn new(guard: CapabilityGuard) -> Self {
        Self { guard }
    }

    /// Pick at most [`MAX_ASSETS`] assets, highest routing weight first
    #[must_use]
    pub fn select_assets(&self, context: &MarketContext) -> Vec<String> {
        let mut assets: Vec<String> = if context.available_assets.is_empty() {
            DEFAULT_ASSETS.iter().map(|a| (*a).to_string()).collect()
        } else {
            context.available_assets.clone()
        };
        if let Some(stats) = &context.routing_stats {
            assets.sort_by(|a, b| stats.weight(b).total_cmp(&stats.weight(a)));
        }
        assets.truncate(MAX_ASSETS);
        assets
    }

    /// Build the plan for `context`
    #[must_use]
    pub fn plan(&self, run_id: &str, run_ts: &str, context: &MarketContext) -> ResearchPlan {
        ResearchPlan {
            plan_id: derive_plan_id(run_id, run_ts, self.guard.manifest().agent_id()),
            asset_universe: self.select_assets(context),
            evidence_requests: requests_for(context.market_status),
            priority: priority_for(context.market_status),
        }
    }
}

impl Stage for Strategist {
    type Input = MarketContext;

    const MANIFEST: &'static str = "strategist.skill.md";

    fn name(&self) -> &'static str {
        "strategist"
    }

    fn guard(&self) -> &CapabilityGuard {
        &self.guard
    }

    fn process(&self, input: MarketContext, ctx: &mut StageContext<'_>) -> StageResult<ProposalEnvelope> {
        let plan = self.plan(ctx.run.run_id(), ctx.run.run_ts(), &input);
        tracing::info!(
            run_id = %ctx.run.run_id(),
            plan_id = %plan.plan_id,
            assets = plan.asset_universe.len(),
            "Strategist planned research"
        );

        let mut claims: Vec<String> = ["read_market_data", "propose_plan", "select_assets"]
            .into_iter()
            .map(String::from)
            .collect();
        if input.routing_stats.is_some() {
            claims.push("read_routing_stats".into());
        }

        let payload = into_payload(serde_json::to_value(&plan)?)?;
        self.wrap_output(ctx, payload, claims)
    }
}
