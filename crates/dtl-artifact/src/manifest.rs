//! Capability manifests
//!
//! A manifest is a markdown document declaring what a stage may and may not
//! do:
//!
//! ```text
//! **Agent ID**: `strategist-v1.0`
//! **Role**: Strategic planning
//!
//! ### ALLOWED
//! - `read_market_data`
//!
//! ### DENIED
//! - `write_evidence_store`
//! ```
//!
//! Parsing is line-oriented and fails closed: a [`CapabilityManifest`] only
//! exists if every invariant holds. [`ManifestReport`] is the diagnostic
//! variant that records problems instead of failing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

static AGENT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+-v[0-9]+\.[0-9]+$").expect("agent id regex is valid"));

/// Whether `agent_id` matches `^[a-z]+-v<major>.<minor>$`
#[must_use]
pub fn is_valid_agent_id(agent_id: &str) -> bool {
    AGENT_ID_PATTERN.is_match(agent_id)
}

/// Broad class of a manifest failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestErrorKind {
    /// Document missing or structurally incomplete
    Parse,
    /// Document parsed but violates an invariant
    Validation,
}

/// Errors raised while loading a manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest file does not exist
    #[error("manifest not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Manifest file could not be read
    #[error("io error reading manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No `**Agent ID**` line with a backtick-quoted id
    #[error("missing **Agent ID** in {origin}")]
    MissingAgentId { origin: String },

    /// `### ALLOWED` section empty or absent
    #[error("no ALLOWED capabilities in {origin}")]
    NoAllowedCapabilities { origin: String },

    /// Capabilities listed as both allowed and denied
    #[error("capabilities in both ALLOWED and DENIED: {}", overlap.join(", "))]
    Overlap { overlap: Vec<String> },

    /// Agent id does not match the required pattern
    #[error("invalid agent_id '{agent_id}': must match ^[a-z]+-v[0-9]+\\.[0-9]+$")]
    InvalidAgentId { agent_id: String },
}

impl ManifestError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Parse or validation failure
    #[must_use]
    pub const fn kind(&self) -> ManifestErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::Io { .. }
            | Self::MissingAgentId { .. }
            | Self::NoAllowedCapabilities { .. } => ManifestErrorKind::Parse,
            Self::Overlap { .. } | Self::InvalidAgentId { .. } => ManifestErrorKind::Validation,
        }
    }
}

/// Raw sections pulled from a manifest document before any checks
#[derive(Debug, Default)]
struct RawManifest {
    agent_id: Option<String>,
    role: String,
    allowed: BTreeSet<String>,
    denied: BTreeSet<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Allowed,
    Denied,
}

fn backtick_field(line: &str) -> Option<&str> {
    let mut parts = line.split('`');
    parts.next()?;
    parts.next()
}

fn scan(source: &str) -> RawManifest {
    let mut raw = RawManifest::default();

    for line in source.lines() {
        if line.contains("**Agent ID**") {
            if let Some(id) = backtick_field(line) {
                raw.agent_id = Some(id.to_string());
            }
        } else if line.contains("**Role**") {
            if let Some((_, role)) = line.rsplit_once(':') {
                raw.role = role.trim().to_string();
            }
        }
    }

    let mut section = Section::None;
    for line in source.lines() {
        if line.contains("### ALLOWED") {
            section = Section::Allowed;
        } else if line.contains("### DENIED") {
            section = Section::Denied;
        } else if line.starts_with("## ") || line.starts_with("# ") {
            section = Section::None;
        } else if let Some(rest) = line.strip_prefix("- `") {
            if let Some((name, _)) = rest.split_once('`') {
                match section {
                    Section::Allowed => {
                        raw.allowed.insert(name.to_string());
                    }
                    Section::Denied => {
                        raw.denied.insert(name.to_string());
                    }
                    Section::None => {}
                }
            }
        }
    }

    raw
}

fn read_source(path: &Path) -> Result<String, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::NotFound {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|e| ManifestError::io_error(path, e))
}

/// A fully validated capability manifest
///
/// Immutable once built. The only constructors run every check, so holding a
/// value proves `allowed ∩ denied = ∅`, `allowed ≠ ∅` and a well-formed id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityManifest {
    agent_id: String,
    role: String,
    allowed: BTreeSet<String>,
    denied: BTreeSet<String>,
}

impl CapabilityManifest {
    /// Parse manifest text; `origin` names the source in error messages.
    ///
    /// # Errors
    /// Returns [`ManifestErrorKind::Parse`] errors for a missing agent id or
    /// empty allowed list, [`ManifestErrorKind::Validation`] errors for
    /// overlap or a malformed agent id.
    pub fn parse(source: &str, origin: &str) -> Result<Self, ManifestError> {
        let raw = scan(source);

        let agent_id = raw.agent_id.ok_or_else(|| ManifestError::MissingAgentId {
            origin: origin.to_string(),
        })?;
        if raw.allowed.is_empty() {
            return Err(ManifestError::NoAllowedCapabilities {
                origin: origin.to_string(),
            });
        }

        let overlap: Vec<String> = raw.allowed.intersection(&raw.denied).cloned().collect();
        if !overlap.is_empty() {
            return Err(ManifestError::Overlap { overlap });
        }
        if !is_valid_agent_id(&agent_id) {
            return Err(ManifestError::InvalidAgentId { agent_id });
        }

        Ok(Self {
            agent_id,
            role: raw.role,
            allowed: raw.allowed,
            denied: raw.denied,
        })
    }

    /// Load and validate a manifest file
    ///
    /// # Errors
    /// See [`CapabilityManifest::parse`]; also fails if the file is missing
    /// or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let source = read_source(path)?;
        let manifest = Self::parse(&source, &path.display().to_string())?;
        tracing::debug!(
            agent_id = %manifest.agent_id,
            allowed = manifest.allowed.len(),
            denied = manifest.denied.len(),
            "Loaded manifest {}",
            path.display()
        );
        Ok(manifest)
    }

    /// Stage identity, e.g. `strategist-v1.0`
    #[inline]
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Free-text role line
    #[inline]
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Capabilities the manifest allows
    #[inline]
    #[must_use]
    pub const fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    /// Capabilities the manifest denies
    #[inline]
    #[must_use]
    pub const fn denied(&self) -> &BTreeSet<String> {
        &self.denied
    }
}

/// Non-fail-closed view of a manifest, for diagnostics only
///
/// Cannot be turned into a [`CapabilityManifest`]; use it to show an operator
/// everything wrong with a document at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestReport {
    /// Agent id if one was found
    pub agent_id: Option<String>,
    /// Role line
    pub role: String,
    /// Parsed allowed capabilities
    pub allowed: BTreeSet<String>,
    /// Parsed denied capabilities
    pub denied: BTreeSet<String>,
    /// True when no errors were recorded
    pub valid: bool,
    /// Every problem encountered
    pub parse_errors: Vec<String>,
}

impl ManifestReport {
    /// Inspect manifest text, collecting every problem
    #[must_use]
    pub fn inspect(source: &str, origin: &str) -> Self {
        let raw = scan(source);
        let mut errors = Vec::new();

        match &raw.agent_id {
            None => errors.push(
                ManifestError::MissingAgentId {
                    origin: origin.to_string(),
                }
                .to_string(),
            ),
            Some(id) if !is_valid_agent_id(id) => errors.push(
                ManifestError::InvalidAgentId {
                    agent_id: id.clone(),
                }
                .to_string(),
            ),
            Some(_) => {}
        }
        if raw.allowed.is_empty() {
            errors.push(
                ManifestError::NoAllowedCapabilities {
                    origin: origin.to_string(),
                }
                .to_string(),
            );
        }
        let overlap: Vec<String> = raw.allowed.intersection(&raw.denied).cloned().collect();
        if !overlap.is_empty() {
            errors.push(ManifestError::Overlap { overlap }.to_string());
        }

        Self {
            agent_id: raw.agent_id,
            role: raw.role,
            allowed: raw.allowed,
            denied: raw.denied,
            valid: errors.is_empty(),
            parse_errors: errors,
        }
    }

    /// Inspect a manifest file; a missing or unreadable file is recorded
    /// as an error rather than returned.
    #[must_use]
    pub fn inspect_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match read_source(path) {
            Ok(source) => Self::inspect(&source, &path.display().to_string()),
            Err(e) => Self {
                parse_errors: vec![e.to_string()],
                ..Self::default()
            },
        }
    }
}
