//! Kill-switch enforcement
//!
//! Operator-controlled switches block named operations. Switches are walked
//! in the configured order; a hard block is sticky for the rest of the walk,
//! a soft block only adds a warning. An enabled hard `DISABLE_WRITES` always
//! blocks `commit_gate_pass`, whatever was requested.

use crate::error::{ConstitutionalError, ConstitutionalResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Switch that shuts off all persistence
pub const DISABLE_WRITES: &str = "DISABLE_WRITES";
/// Switch that shuts off learning-related writes
pub const DISABLE_LEARNING: &str = "DISABLE_LEARNING";
/// Operation always blocked by a hard `DISABLE_WRITES`
pub const COMMIT_GATE_PASS: &str = "commit_gate_pass";

/// How a switch blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Blocks the run
    Hard,
    /// Warns only
    #[default]
    Soft,
}

/// One configured switch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KillSwitch {
    /// Whether the switch is on
    #[serde(default)]
    pub enabled: bool,
    /// Operator-facing description
    #[serde(default)]
    pub description: String,
    /// Hard or soft
    #[serde(default)]
    pub enforcement: Enforcement,
    /// Operations the switch blocks
    #[serde(default)]
    pub blocks: Vec<String>,
}

/// Kill-switch policy document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KillSwitchPolicy {
    /// Evaluation order; defaults to switch names in sorted order
    #[serde(default)]
    pub enforcement_order: Vec<String>,
    /// Switches by name
    #[serde(default)]
    pub switches: BTreeMap<String, KillSwitch>,
}

impl KillSwitchPolicy {
    /// Switch names in evaluation order
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        if self.enforcement_order.is_empty() {
            self.switches.keys().map(String::as_str).collect()
        } else {
            self.enforcement_order.iter().map(String::as_str).collect()
        }
    }
}

/// Outcome of [`KillSwitchEnforcer::enforce`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EnforcementResult {
    /// False if any hard switch blocked
    pub can_proceed: bool,
    /// Enabled switches, in evaluation order
    pub active_switches: Vec<String>,
    /// Operations blocked by any switch, without duplicates
    pub blocked_operations: Vec<String>,
    /// One entry per soft block
    pub warnings: Vec<String>,
}

/// Evaluates a [`KillSwitchPolicy`]
#[derive(Debug, Clone, Default)]
pub struct KillSwitchEnforcer {
    policy: KillSwitchPolicy,
}

impl KillSwitchEnforcer {
    /// Enforcer over an in-memory policy
    #[inline]
    #[must_use]
    pub const fn new(policy: KillSwitchPolicy) -> Self {
        Self { policy }
    }

    /// Load a policy document; a missing file means no switches
    ///
    /// # Errors
    /// Returns error if the file exists but is unreadable or malformed
    pub fn load(path: impl AsRef<Path>) -> ConstitutionalResult<Self> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Kill switch policy {} not found, no switches active", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(ConstitutionalError::io_error(path, e)),
        };
        let policy: KillSwitchPolicy =
            serde_json::from_str(&text).map_err(|e| ConstitutionalError::invalid_document(path, e))?;
        Ok(Self::new(policy))
    }

    /// Loaded policy
    #[inline]
    #[must_use]
    pub const fn policy(&self) -> &KillSwitchPolicy {
        &self.policy
    }

    /// Whether the named switch exists and is enabled
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.policy.switches.get(name).is_some_and(|s| s.enabled)
    }

    /// Enabled switch names in evaluation order, then `DISABLE_WRITES` if
    /// the order leaves it out
    #[must_use]
    pub fn active_switches(&self) -> Vec<String> {
        let mut active: Vec<String> = self
            .policy
            .order()
            .into_iter()
            .filter(|name| self.is_enabled(name))
            .map(str::to_string)
            .collect();
        if self.is_enabled(DISABLE_WRITES) {
            push_unique(&mut active, DISABLE_WRITES);
        }
        active
    }

    /// First enabled switch, in evaluation order, that blocks `operation`
    #[must_use]
    pub fn is_operation_blocked(&self, operation: &str) -> Option<&str> {
        self.policy.order().into_iter().find(|name| {
            self.policy
                .switches
                .get(*name)
                .is_some_and(|s| s.enabled && s.blocks.iter().any(|b| b == operation))
        })
    }

    /// Evaluate every switch against `requested` operations
    #[must_use]
    pub fn enforce<S: AsRef<str>>(&self, requested: &[S]) -> EnforcementResult {
        let mut result = EnforcementResult {
            can_proceed: true,
            ..EnforcementResult::default()
        };

        for name in self.policy.order() {
            let Some(switch) = self.policy.switches.get(name) else {
                continue;
            };
            if !switch.enabled {
                continue;
            }
            result.active_switches.push(name.to_string());

            let blocked: Vec<&str> = requested
                .iter()
                .map(AsRef::as_ref)
                .filter(|op| switch.blocks.iter().any(|b| b == op))
                .collect();

            if !blocked.is_empty() {
                for op in &blocked {
                    push_unique(&mut result.blocked_operations, op);
                }
                match switch.enforcement {
                    Enforcement::Hard => {
                        tracing::error!(switch = name, "Hard kill switch blocks {:?}", blocked);
                        result.can_proceed = false;
                    }
                    Enforcement::Soft => {
                        let warning = format!("{name}: soft-blocked {}", blocked.join(", "));
                        tracing::warn!("{}", warning);
                        result.warnings.push(warning);
                    }
                }
            }
        }

        // Hard DISABLE_WRITES applies whether or not the order lists it
        if let Some(switch) = self.policy.switches.get(DISABLE_WRITES).filter(|s| s.enabled) {
            push_unique(&mut result.active_switches, DISABLE_WRITES);
            if switch.enforcement == Enforcement::Hard {
                result.can_proceed = false;
                push_unique(&mut result.blocked_operations, COMMIT_GATE_PASS);
            }
        }

        result
    }
}

fn push_unique(list: &mut Vec<String>, op: &str) {
    if !list.iter().any(|o| o == op) {
        list.push(op.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(value: serde_json::Value) -> KillSwitchEnforcer {
        KillSwitchEnforcer::new(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn hard_disable_writes_blocks_regardless_of_request() {
        let enforcer = policy(json!({
            "enforcement_order": ["DISABLE_WRITES"],
            "switches": {"DISABLE_WRITES": {"enabled": true, "enforcement": "hard", "blocks": ["write_evidence"]}}
        }));
        let result = enforcer.enforce(&["run_agents"]);
        assert!(!result.can_proceed);
        assert!(result.blocked_operations.contains(&COMMIT_GATE_PASS.to_string()));
        assert_eq!(result.active_switches, vec![DISABLE_WRITES]);
    }

    #[test]
    fn hard_disable_writes_applies_when_left_out_of_the_order() {
        let enforcer = policy(json!({
            "enforcement_order": ["DISABLE_LEARNING"],
            "switches": {
                "DISABLE_LEARNING": {"enabled": false, "enforcement": "soft", "blocks": []},
                "DISABLE_WRITES": {"enabled": true, "enforcement": "hard", "blocks": ["write_evidence"]}
            }
        }));
        let result = enforcer.enforce(&["run_agents"]);
        assert!(!result.can_proceed);
        assert_eq!(result.blocked_operations, vec![COMMIT_GATE_PASS]);
        assert_eq!(result.active_switches, vec![DISABLE_WRITES]);
        assert_eq!(enforcer.active_switches(), vec![DISABLE_WRITES]);
    }

    #[test]
    fn soft_switch_warns_only() {
        let enforcer = policy(json!({
            "switches": {"DISABLE_LEARNING": {"enabled": true, "blocks": ["run_agents"]}}
        }));
        let result = enforcer.enforce(&["run_agents", "write_evidence"]);
        assert!(result.can_proceed);
        assert_eq!(result.blocked_operations, vec!["run_agents"]);
        assert_eq!(result.warnings, vec!["DISABLE_LEARNING: soft-blocked run_agents"]);
    }

    #[test]
    fn hard_block_is_sticky_across_later_soft_switches() {
        let enforcer = policy(json!({
            "enforcement_order": ["A", "B"],
            "switches": {
                "A": {"enabled": true, "enforcement": "hard", "blocks": ["run_agents"]},
                "B": {"enabled": true, "enforcement": "soft", "blocks": ["write_evidence"]}
            }
        }));
        let result = enforcer.enforce(&["run_agents", "write_evidence"]);
        assert!(!result.can_proceed);
        assert_eq!(result.blocked_operations, vec!["run_agents", "write_evidence"]);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn disabled_switches_are_ignored() {
        let enforcer = policy(json!({
            "switches": {"DISABLE_WRITES": {"enabled": false, "enforcement": "hard", "blocks": ["run_agents"]}}
        }));
        let result = enforcer.enforce(&["run_agents"]);
        assert!(result.can_proceed);
        assert!(result.active_switches.is_empty());
        assert!(!enforcer.is_enabled(DISABLE_WRITES));
    }

    #[test]
    fn order_skips_unknown_names() {
        let enforcer = policy(json!({
            "enforcement_order": ["GHOST", "A"],
            "switches": {"A": {"enabled": true, "blocks": []}}
        }));
        assert_eq!(enforcer.active_switches(), vec!["A"]);
    }

    #[test]
    fn operation_lookup() {
        let enforcer = policy(json!({
            "enforcement_order": ["A", "B"],
            "switches": {
                "A": {"enabled": false, "blocks": ["x"]},
                "B": {"enabled": true, "blocks": ["x", "y"]}
            }
        }));
        assert_eq!(enforcer.is_operation_blocked("x"), Some("B"));
        assert_eq!(enforcer.is_operation_blocked("z"), None);
    }

    #[test]
    fn missing_policy_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let enforcer = KillSwitchEnforcer::load(dir.path().join("none.json")).unwrap();
        assert!(enforcer.enforce(&["run_agents"]).can_proceed);
    }

    #[test]
    fn malformed_policy_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ks.json");
        fs::write(&path, r#"{"switches": {"A": {"enforcement": "maybe"}}}"#).unwrap();
        assert!(matches!(
            KillSwitchEnforcer::load(&path),
            Err(ConstitutionalError::InvalidDocument { .. })
        ));
    }
}
