//! Run identity
//!
//! A [`RunConfig`] carries the `run_id` and `run_ts` minted once at the start
//! of a run. Every component receives it by value or reference; nothing else
//! reads the clock, so replaying the same pair reproduces every hash and ID.

use crate::error::ArtifactError;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution mode of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Deterministic reference stages, no external calls
    #[default]
    Mock,
    /// Stages backed by external collaborators
    Live,
}

impl RunMode {
    /// Lowercase wire name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mock" => Ok(Self::Mock),
            "live" => Ok(Self::Live),
            other => Err(ArtifactError::InvalidRunMode(other.to_string())),
        }
    }
}

/// Determinism anchor for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    run_id: String,
    run_ts: String,
    instant: DateTime<FixedOffset>,
    mode: RunMode,
}

impl RunConfig {
    /// Build from an existing `(run_id, run_ts)` pair
    ///
    /// # Errors
    /// Returns error if `run_id` is empty or `run_ts` is not RFC3339 with
    /// an explicit offset.
    pub fn new(
        run_id: impl Into<String>,
        run_ts: impl Into<String>,
        mode: RunMode,
    ) -> Result<Self, ArtifactError> {
        let run_id = run_id.into();
        let run_ts = run_ts.into();
        if run_id.trim().is_empty() {
            return Err(ArtifactError::EmptyRunId);
        }
        let instant = DateTime::parse_from_rfc3339(&run_ts)
            .map_err(|e| ArtifactError::invalid_timestamp(&run_ts, e.to_string()))?;
        Ok(Self {
            run_id,
            run_ts,
            instant,
            mode,
        })
    }

    /// Mint a fresh run from the current wall clock.
    ///
    /// This is the only place in the workspace that reads the clock.
    #[must_use]
    pub fn mint(mode: RunMode) -> Self {
        let now = Utc::now();
        Self {
            run_id: now.format("RUN-%Y%m%d_%H%M%S").to_string(),
            run_ts: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            instant: DateTime::<FixedOffset>::from(now),
            mode,
        }
    }

    /// Run identifier
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run timestamp exactly as minted
    #[inline]
    #[must_use]
    pub fn run_ts(&self) -> &str {
        &self.run_ts
    }

    /// Parsed run timestamp
    #[inline]
    #[must_use]
    pub const fn instant(&self) -> DateTime<FixedOffset> {
        self.instant
    }

    /// Execution mode
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    /// `YYYY/MM/DD` partition of the run date in UTC
    #[must_use]
    pub fn date_partition(&self) -> String {
        self.instant
            .with_timezone(&Utc)
            .format("%Y/%m/%d")
            .to_string()
    }
}

/// Parse a timezone-qualified timestamp; naive timestamps are rejected.
///
/// # Errors
/// Returns error if `value` is not RFC3339 with `Z` or an explicit offset.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, ArtifactError> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| ArtifactError::invalid_timestamp(value, e.to_string()))
}
