//! Capability enforcement for stages
//!
//! A stage's effective permissions are `manifest.allowed ∪ runner_grants`,
//! minus `manifest.denied`. Denial always wins regardless of where the grant
//! came from.

use crate::manifest::CapabilityManifest;
use std::collections::BTreeSet;

/// Raised when a stage claims capabilities it does not hold
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("capability denied for {agent_id}: {}", unauthorized.iter().cloned().collect::<Vec<_>>().join(", "))]
pub struct CapabilityDeniedError {
    /// Stage that made the claim
    pub agent_id: String,
    /// Claims outside the effective allowed set, or explicitly denied
    pub unauthorized: BTreeSet<String>,
}

/// Effective allowed set for a manifest plus runner grants
#[must_use]
pub fn effective_allowed(manifest: &CapabilityManifest, grants: &BTreeSet<String>) -> BTreeSet<String> {
    manifest
        .allowed()
        .union(grants)
        .filter(|cap| !manifest.denied().contains(*cap))
        .cloned()
        .collect()
}

/// A claim list that has passed [`CapabilityGuard::validate_claims`]
///
/// Only the guard can build one, so any envelope built from it carries
/// claims its stage actually holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedClaims {
    agent_id: String,
    claims: Vec<String>,
}

impl ValidatedClaims {
    /// Stage the claims were validated for
    #[inline]
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The claims in the order they were made
    #[inline]
    #[must_use]
    pub fn claims(&self) -> &[String] {
        &self.claims
    }

    pub(crate) fn into_parts(self) -> (String, Vec<String>) {
        (self.agent_id, self.claims)
    }
}

/// Per-stage capability checker
///
/// Built once from a validated manifest and the runner's grants; immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct CapabilityGuard {
    manifest: CapabilityManifest,
    grants: BTreeSet<String>,
}

impl CapabilityGuard {
    /// Create guard for a manifest with extra runner grants
    #[must_use]
    pub fn new<I, S>(manifest: CapabilityManifest, grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            manifest,
            grants: grants.into_iter().map(Into::into).collect(),
        }
    }

    /// Underlying manifest
    #[inline]
    #[must_use]
    pub const fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    /// Runner-granted capabilities
    #[inline]
    #[must_use]
    pub const fn grants(&self) -> &BTreeSet<String> {
        &self.grants
    }

    /// Effective allowed set
    #[must_use]
    pub fn effective_allowed(&self) -> BTreeSet<String> {
        effective_allowed(&self.manifest, &self.grants)
    }

    /// Whether a single capability is held
    #[must_use]
    pub fn check_capability(&self, name: &str) -> bool {
        if self.manifest.denied().contains(name) {
            return false;
        }
        self.manifest.allowed().contains(name) || self.grants.contains(name)
    }

    /// Validate every claim, yielding a token the envelope factory accepts
    ///
    /// # Errors
    /// Returns [`CapabilityDeniedError`] listing every claim that is not held
    /// or is explicitly denied.
    pub fn validate_claims<I, S>(&self, claims: I) -> Result<ValidatedClaims, CapabilityDeniedError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let claims: Vec<String> = claims.into_iter().map(Into::into).collect();
        let unauthorized: BTreeSet<String> = claims
            .iter()
            .filter(|c| !self.check_capability(c))
            .cloned()
            .collect();

        if !unauthorized.is_empty() {
            tracing::warn!(
                agent_id = %self.manifest.agent_id(),
                "Capability claims denied: {:?}",
                unauthorized
            );
            return Err(CapabilityDeniedError {
                agent_id: self.manifest.agent_id().to_string(),
                unauthorized,
            });
        }

        Ok(ValidatedClaims {
            agent_id: self.manifest.agent_id().to_string(),
            claims,
        })
    }
}
