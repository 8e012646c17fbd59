//! Evidence candidates produced by a gathering stage

use serde::{Deserialize, Serialize};

/// One piece of evidence awaiting persistence
///
/// `fetched_at` is kept as the raw string so the commit gate can tell a
/// naive timestamp apart from a stale one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCandidate {
    /// `EV-` followed by 12 uppercase chars, unique within a run
    pub evidence_id: String,
    /// Where the evidence came from
    pub source_url: String,
    /// 1 (highest trust) to 4
    pub source_trust_tier: u8,
    /// Timezone-qualified fetch time
    pub fetched_at: String,
    /// Short human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// 0.0 to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    /// Assets the evidence concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_tags: Option<Vec<String>>,
}

impl EvidenceCandidate {
    /// Create candidate with the required fields
    #[must_use]
    pub fn new(
        evidence_id: impl Into<String>,
        source_url: impl Into<String>,
        source_trust_tier: u8,
        fetched_at: impl Into<String>,
    ) -> Self {
        Self {
            evidence_id: evidence_id.into(),
            source_url: source_url.into(),
            source_trust_tier,
            fetched_at: fetched_at.into(),
            summary: None,
            relevance_score: None,
            asset_tags: None,
        }
    }

    /// With summary
    #[inline]
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// With relevance score
    #[inline]
    #[must_use]
    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    /// With asset tags
    #[inline]
    #[must_use]
    pub fn with_assets<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asset_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_are_omitted() {
        let candidate = EvidenceCandidate::new("EV-0123456789AB", "https://x", 1, "2025-01-15T09:30:00Z");
        let value = serde_json::to_value(&candidate).unwrap();
        assert_eq!(
            value,
            json!({
                "evidence_id": "EV-0123456789AB",
                "source_url": "https://x",
                "source_trust_tier": 1,
                "fetched_at": "2025-01-15T09:30:00Z"
            })
        );
    }

    #[test]
    fn builder_sets_optionals() {
        let candidate = EvidenceCandidate::new("EV-1", "u", 2, "t")
            .with_summary("Price data")
            .with_relevance(0.7)
            .with_assets(["XAU"]);
        assert_eq!(candidate.summary.as_deref(), Some("Price data"));
        assert_eq!(candidate.asset_tags, Some(vec!["XAU".to_string()]));
    }
}
