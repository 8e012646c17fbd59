//! Control-plane configuration
//!
//! Read from `<root>/dtl.toml`; every field has a default, so a project
//! root without the file runs on the reference layout:
//!
//! ```text
//! <root>/config/schemas/*.json
//! <root>/config/manifests/{strategist,researcher,reporter}.skill.md
//! <root>/config/kill_switches.json
//! <root>/config/degraded_mode_policy.json
//! <root>/data/...
//! ```

use crate::error::{CoreError, CoreResult};
use dtl_kernel::DEFAULT_EVIDENCE_TTL_SECS;
use dtl_store::DEFAULT_QUEUE_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the project root
pub const CONFIG_FILE: &str = "dtl.toml";

/// Configuration for one control-plane instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Project root; relative paths resolve against it
    #[serde(skip)]
    pub root: PathBuf,
    /// Directory holding schemas, manifests and policies
    pub config_dir: PathBuf,
    /// Directory holding every store
    pub data_dir: PathBuf,
    /// Schema directory, defaults to `<config_dir>/schemas`
    pub schemas_dir: Option<PathBuf>,
    /// Manifest directory, defaults to `<config_dir>/manifests`
    pub manifests_dir: Option<PathBuf>,
    /// Kill-switch policy, defaults to `<config_dir>/kill_switches.json`
    pub kill_switch_policy: Option<PathBuf>,
    /// Degraded-mode policy, defaults to `<config_dir>/degraded_mode_policy.json`
    pub degraded_mode_policy: Option<PathBuf>,
    /// Maximum evidence age relative to `run_ts`
    pub evidence_ttl_secs: i64,
    /// Evidence queue capacity
    pub queue_max_size: usize,
    /// Snapshot the evidence queue to disk
    pub queue_persist: bool,
    /// Operations checked against the kill switches at step 3
    pub requested_operations: Vec<String>,
    /// Capabilities the runner grants every stage
    pub runner_capabilities: Vec<String>,
}

impl ControlPlaneConfig {
    /// Create default configuration rooted at the current directory
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<root>/dtl.toml`, falling back to defaults when it is absent
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] if the file exists but cannot be read
    /// or parsed
    pub fn load(root: impl AsRef<Path>) -> CoreResult<Self> {
        let root = root.as_ref();
        let path = root.join(CONFIG_FILE);
        let config = match fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text).map_err(|e| CoreError::config(&path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, root.display());
                Self::default()
            }
            Err(e) => return Err(CoreError::config(&path, e)),
        };
        Ok(config.with_root(root))
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns the TOML error if the document is malformed
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// With project root
    #[inline]
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// With data directory
    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// With configuration directory
    #[inline]
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// With kill-switch policy file
    #[inline]
    #[must_use]
    pub fn with_kill_switch_policy(mut self, path: impl Into<PathBuf>) -> Self {
        self.kill_switch_policy = Some(path.into());
        self
    }

    /// With evidence TTL
    #[inline]
    #[must_use]
    pub fn with_evidence_ttl_secs(mut self, secs: i64) -> Self {
        self.evidence_ttl_secs = secs;
        self
    }

    /// With queue capacity
    #[inline]
    #[must_use]
    pub fn with_queue_max_size(mut self, max: usize) -> Self {
        self.queue_max_size = max;
        self
    }

    /// With or without queue snapshots
    #[inline]
    #[must_use]
    pub fn with_queue_persist(mut self, persist: bool) -> Self {
        self.queue_persist = persist;
        self
    }

    /// With extra runner grants
    #[must_use]
    pub fn with_runner_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner_capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn config_path(&self, explicit: Option<&PathBuf>, default: &str) -> PathBuf {
        match explicit {
            Some(p) => self.resolve(p),
            None => self.resolve(&self.config_dir).join(default),
        }
    }

    /// Resolved schema directory
    #[must_use]
    pub fn schemas_dir(&self) -> PathBuf {
        self.config_path(self.schemas_dir.as_ref(), "schemas")
    }

    /// Resolved manifest directory
    #[must_use]
    pub fn manifests_dir(&self) -> PathBuf {
        self.config_path(self.manifests_dir.as_ref(), "manifests")
    }

    /// Resolved kill-switch policy path
    #[must_use]
    pub fn kill_switch_policy(&self) -> PathBuf {
        self.config_path(self.kill_switch_policy.as_ref(), "kill_switches.json")
    }

    /// Resolved degraded-mode policy path
    #[must_use]
    pub fn degraded_mode_policy(&self) -> PathBuf {
        self.config_path(self.degraded_mode_policy.as_ref(), "degraded_mode_policy.json")
    }

    /// Resolved data directory
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.data_dir)
    }

    /// `<data>/evidence_store`
    #[must_use]
    pub fn evidence_store_dir(&self) -> PathBuf {
        self.data_dir().join("evidence_store")
    }

    /// `<data>/run_ledger/prewrite`; committed artifacts live next to it
    #[must_use]
    pub fn prewrite_dir(&self) -> PathBuf {
        self.data_dir().join("run_ledger").join("prewrite")
    }

    /// `<data>/alerts/degraded_mode.log`
    #[must_use]
    pub fn alert_log(&self) -> PathBuf {
        self.data_dir().join("alerts").join("degraded_mode.log")
    }

    /// `<data>/queue/evidence_queue.json`
    #[must_use]
    pub fn queue_snapshot(&self) -> PathBuf {
        self.data_dir().join("queue").join("evidence_queue.json")
    }

    /// `<data>/dtl_runs`
    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir().join("dtl_runs")
    }

    /// `<data>/ledger`
    #[must_use]
    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir().join("ledger")
    }

    /// `<data>/routing_statistics.json`, read when learning is enabled
    #[must_use]
    pub fn routing_stats_path(&self) -> PathBuf {
        self.data_dir().join("routing_statistics.json")
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            config_dir: PathBuf::from("config"),
            data_dir: PathBuf::from("data"),
            schemas_dir: None,
            manifests_dir: None,
            kill_switch_policy: None,
            degraded_mode_policy: None,
            evidence_ttl_secs: DEFAULT_EVIDENCE_TTL_SECS,
            queue_max_size: DEFAULT_QUEUE_SIZE,
            queue_persist: true,
            requested_operations: vec!["run_agents".into(), "write_evidence".into()],
            runner_capabilities: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_follow_reference_layout() {
        let config = ControlPlaneConfig::new().with_root("/srv/dtl");
        assert_eq!(config.schemas_dir(), PathBuf::from("/srv/dtl/config/schemas"));
        assert_eq!(config.kill_switch_policy(), PathBuf::from("/srv/dtl/config/kill_switches.json"));
        assert_eq!(config.prewrite_dir(), PathBuf::from("/srv/dtl/data/run_ledger/prewrite"));
        assert_eq!(config.evidence_ttl_secs, 604_800);
        assert_eq!(config.queue_max_size, 100);
    }

    #[test]
    fn toml_overrides_and_absolute_paths() {
        let config = ControlPlaneConfig::parse(
            r#"
            data_dir = "/var/lib/dtl"
            manifests_dir = "skills"
            evidence_ttl_secs = 3600
            runner_capabilities = ["read_evidence"]
            "#,
        )
        .unwrap()
        .with_root("/srv/dtl");

        assert_eq!(config.evidence_store_dir(), PathBuf::from("/var/lib/dtl/evidence_store"));
        assert_eq!(config.manifests_dir(), PathBuf::from("/srv/dtl/skills"));
        assert_eq!(config.evidence_ttl_secs, 3600);
        assert_eq!(config.runner_capabilities, vec!["read_evidence"]);
        assert_eq!(config.requested_operations, vec!["run_agents", "write_evidence"]);
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ControlPlaneConfig::load(dir.path()).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.data_dir(), dir.path().join("data"));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "queue_max_size = \"many\"").unwrap();
        let err = ControlPlaneConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }
}
