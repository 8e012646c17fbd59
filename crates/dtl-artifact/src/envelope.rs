//! Hashed messages exchanged between stages and the control plane
//!
//! - [`ProposalEnvelope`]: what a stage hands to the next stage
//! - [`CommitBundle`]: a concrete intent to persist, checked by the commit gate
//!
//! Both hash the canonical form of their covered fields with the order
//! insensitive lists sorted first, so reordering claims or evidence refs
//! never changes the hash.

use crate::capability::ValidatedClaims;
use crate::error::ArtifactError;
use crate::hash::{ContentHash, HashError};
use crate::run::RunConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Schema version stamped on every envelope and bundle
pub const SCHEMA_VERSION: &str = "2.0.0";

fn sorted(items: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = items.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

/// Immutable stage output
///
/// Fields are private: the only way to build one is
/// [`ProposalEnvelope::create`], which requires claims that already passed
/// capability validation and computes the hash last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalEnvelope {
    agent_id: String,
    schema_version: String,
    run_id: String,
    timestamp: String,
    payload: Map<String, Value>,
    capability_claims: Vec<String>,
    content_hash: String,
}

impl ProposalEnvelope {
    /// Build an envelope stamped with the run's id and timestamp
    ///
    /// # Errors
    /// Returns error if hashing fails
    pub fn create(
        run: &RunConfig,
        payload: Map<String, Value>,
        claims: ValidatedClaims,
    ) -> Result<Self, ArtifactError> {
        let (agent_id, capability_claims) = claims.into_parts();
        let mut envelope = Self {
            agent_id,
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run.run_id().to_string(),
            timestamp: run.run_ts().to_string(),
            payload,
            capability_claims,
            content_hash: String::new(),
        };
        envelope.content_hash = envelope.compute_hash()?.to_string();
        Ok(envelope)
    }

    /// Hash over `{agent_id, schema_version, run_id, timestamp, payload,
    /// sorted(capability_claims)}`
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn compute_hash(&self) -> Result<ContentHash, HashError> {
        let covered = json!({
            "agent_id": self.agent_id,
            "schema_version": self.schema_version,
            "run_id": self.run_id,
            "timestamp": self.timestamp,
            "payload": self.payload,
            "capability_claims": sorted(&self.capability_claims),
        });
        ContentHash::of_json(&covered, &[])
    }

    /// Whether the stored hash still matches the covered fields
    #[must_use]
    pub fn verify(&self) -> bool {
        self.compute_hash()
            .is_ok_and(|h| h.to_string() == self.content_hash)
    }

    /// Emitting stage
    #[inline]
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Schema version
    #[inline]
    #[must_use]
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Run the envelope belongs to
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run timestamp
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Stage output
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Claimed capabilities
    #[inline]
    #[must_use]
    pub fn capability_claims(&self) -> &[String] {
        &self.capability_claims
    }

    /// `sha256:<hex>` content hash
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// JSON form for firewall validation
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_value(&self) -> Result<Value, HashError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Commit-intent artifact validated by the commit gate
///
/// Fields are public because a bundle arriving at the gate is untrusted
/// input: the gate re-derives the hash instead of trusting the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitBundle {
    /// Run being committed
    pub run_id: String,
    /// Stage building the bundle
    pub agent_id: String,
    /// Schema version
    pub schema_version: String,
    /// Run timestamp
    pub timestamp: String,
    /// Content to persist
    pub payload: Map<String, Value>,
    /// Evidence ids the payload relies on
    pub evidence_refs: Vec<String>,
    /// Capabilities exercised by the commit
    pub capability_claims: Vec<String>,
    /// `sha256:<hex>` over every other field
    pub content_hash: String,
}

impl CommitBundle {
    /// Build a sealed bundle for `run`
    ///
    /// # Errors
    /// Returns error if hashing fails
    pub fn seal(
        run: &RunConfig,
        agent_id: impl Into<String>,
        payload: Map<String, Value>,
        evidence_refs: Vec<String>,
        capability_claims: Vec<String>,
    ) -> Result<Self, ArtifactError> {
        let mut bundle = Self {
            run_id: run.run_id().to_string(),
            agent_id: agent_id.into(),
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: run.run_ts().to_string(),
            payload,
            evidence_refs,
            capability_claims,
            content_hash: String::new(),
        };
        bundle.content_hash = bundle.compute_hash()?.to_string();
        Ok(bundle)
    }

    /// Hash over every field except `content_hash`, with `evidence_refs`
    /// and `capability_claims` sorted
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn compute_hash(&self) -> Result<ContentHash, HashError> {
        let covered = json!({
            "run_id": self.run_id,
            "agent_id": self.agent_id,
            "schema_version": self.schema_version,
            "timestamp": self.timestamp,
            "payload": self.payload,
            "evidence_refs": sorted(&self.evidence_refs),
            "capability_claims": sorted(&self.capability_claims),
        });
        ContentHash::of_json(&covered, &[])
    }

    /// Whether the stored hash matches the covered fields
    #[must_use]
    pub fn verify(&self) -> bool {
        self.compute_hash()
            .is_ok_and(|h| h.to_string() == self.content_hash)
    }

    /// Read a bundle out of a JSON value
    ///
    /// # Errors
    /// Returns error if the value does not have the bundle shape
    pub fn from_value(value: Value) -> Result<Self, HashError> {
        Ok(serde_json::from_value(value)?)
    }

    /// JSON form for schema validation and persistence
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_value(&self) -> Result<Value, HashError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Require `value` to be a JSON object and return its map
///
/// # Errors
/// Returns [`ArtifactError::PayloadNotObject`] for any other JSON type
pub fn into_payload(value: Value) -> Result<Map<String, Value>, ArtifactError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err(ArtifactError::PayloadNotObject("null")),
        Value::Bool(_) => Err(ArtifactError::PayloadNotObject("bool")),
        Value::Number(_) => Err(ArtifactError::PayloadNotObject("number")),
        Value::String(_) => Err(ArtifactError::PayloadNotObject("string")),
        Value::Array(_) => Err(ArtifactError::PayloadNotObject("array")),
    }
}
