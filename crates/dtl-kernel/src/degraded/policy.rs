//! Degraded-mode policy document

use super::TriggerCondition;
use crate::error::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Alert template used when the policy does not set one
pub const DEFAULT_ALERT_TEMPLATE: &str = "DTL {state}: {trigger_condition} at {timestamp}. Run ID: {run_id}";

/// What a trigger does to the system state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolicyAction {
    /// Move to `DEGRADED`
    #[serde(rename = "ENTER_DEGRADED")]
    EnterDegraded,
    /// Move to `HALTED`
    #[serde(rename = "HALT")]
    Halt,
    /// No configured reaction
    #[default]
    #[serde(rename = "NONE")]
    NoAction,
}

impl PolicyAction {
    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnterDegraded => "ENTER_DEGRADED",
            Self::Halt => "HALT",
            Self::NoAction => "NONE",
        }
    }
}

/// One `{id, action}` rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    /// Trigger condition name
    pub id: String,
    /// Configured action
    #[serde(default)]
    pub action: PolicyAction,
}

/// `trigger_conditions` section
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerConditions {
    /// Rules, first match wins
    #[serde(default)]
    pub conditions: Vec<TriggerRule>,
}

/// `degraded_behavior` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedBehavior {
    /// Writes refused while degraded
    #[serde(default = "yes")]
    pub writes_blocked: bool,
    /// Analysis permitted while degraded
    #[serde(default = "yes")]
    pub analysis_allowed: bool,
}

impl Default for DegradedBehavior {
    fn default() -> Self {
        Self {
            writes_blocked: true,
            analysis_allowed: true,
        }
    }
}

/// `alerts` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Extra channels; `console` prints to stderr
    #[serde(default)]
    pub channels: Vec<String>,
    /// Message with `{state}`, `{trigger_condition}`, `{timestamp}`,
    /// `{run_id}` and `{details}` placeholders
    #[serde(default = "default_template")]
    pub message_template: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            message_template: default_template(),
        }
    }
}

/// `recovery` section
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoverySettings {
    /// Recover without operator acknowledgement
    #[serde(default)]
    pub auto_recovery: bool,
}

/// Degraded-mode policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DegradedModePolicy {
    /// Trigger rules
    #[serde(default)]
    pub trigger_conditions: TriggerConditions,
    /// Behavior while degraded
    #[serde(default)]
    pub degraded_behavior: DegradedBehavior,
    /// Alerting
    #[serde(default)]
    pub alerts: AlertSettings,
    /// Recovery
    #[serde(default)]
    pub recovery: RecoverySettings,
}

const fn yes() -> bool {
    true
}

fn default_template() -> String {
    DEFAULT_ALERT_TEMPLATE.to_string()
}

impl DegradedModePolicy {
    /// Load a policy document; a missing file means defaults
    ///
    /// # Errors
    /// Returns error if the file exists but is unreadable or malformed
    pub fn load(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Degraded mode policy {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(KernelError::io_error(path, e)),
        };
        serde_json::from_str(&text).map_err(|e| KernelError::InvalidPolicy {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Configured action for `trigger`
    #[must_use]
    pub fn action_for(&self, trigger: TriggerCondition) -> PolicyAction {
        self.trigger_conditions
            .conditions
            .iter()
            .find(|rule| rule.id == trigger.as_str())
            .map_or(PolicyAction::NoAction, |rule| rule.action)
    }

    /// Whether console alerts are enabled
    #[must_use]
    pub fn console_alerts(&self) -> bool {
        self.alerts.channels.iter().any(|c| c == "console")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_takes_defaults() {
        let policy: DegradedModePolicy = serde_json::from_value(json!({})).unwrap();
        assert!(policy.degraded_behavior.writes_blocked);
        assert!(policy.degraded_behavior.analysis_allowed);
        assert!(!policy.recovery.auto_recovery);
        assert_eq!(policy.alerts.message_template, DEFAULT_ALERT_TEMPLATE);
    }

    #[test]
    fn first_matching_rule_wins() {
        let policy: DegradedModePolicy = serde_json::from_value(json!({
            "trigger_conditions": {"conditions": [
                {"id": "KILL_SWITCH_ACTIVE", "action": "HALT"},
                {"id": "KILL_SWITCH_ACTIVE", "action": "ENTER_DEGRADED"},
                {"id": "SOMETHING_ELSE", "action": "HALT"}
            ]}
        }))
        .unwrap();
        assert_eq!(policy.action_for(TriggerCondition::KillSwitchActive), PolicyAction::Halt);
        assert_eq!(policy.action_for(TriggerCondition::EvidenceStale), PolicyAction::NoAction);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        fs::write(&path, r#"{"trigger_conditions": {"conditions": [{"id": "UNKNOWN", "action": "PANIC"}]}}"#).unwrap();
        assert!(matches!(
            DegradedModePolicy::load(&path),
            Err(KernelError::InvalidPolicy { .. })
        ));
    }
}
