//! Degraded-mode controller
//!
//! The single authority on whether the run may still write. Any firewall or
//! commit-gate rejection, active kill switch, missing manifest or unexpected
//! failure moves the system out of `NORMAL`; what it moves to, and how it
//! comes back, is policy.

mod policy;
mod state_machine;

pub use policy::{
    AlertSettings, DegradedBehavior, DegradedModePolicy, PolicyAction, RecoverySettings, TriggerConditions,
    TriggerRule, DEFAULT_ALERT_TEMPLATE,
};
pub use state_machine::{allowed_transitions, validate_transition};

use crate::error::KernelResult;
use dtl_store::JsonlLog;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// System state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemState {
    /// Everything permitted
    #[default]
    Normal,
    /// Analysis only
    Degraded,
    /// Nothing permitted until recovery
    Halted,
}

impl SystemState {
    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Degraded => "DEGRADED",
            Self::Halted => "HALTED",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What pushed the system out of `NORMAL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerCondition {
    /// Inter-stage firewall rejected a message
    FirewallRejection,
    /// Commit gate rejected the bundle
    CommitGateRejection,
    /// A hard kill switch blocked the run
    KillSwitchActive,
    /// A stage manifest could not be loaded
    ManifestMissing,
    /// Evidence exceeded its TTL
    EvidenceStale,
    /// Any other failure
    Unknown,
}

impl TriggerCondition {
    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirewallRejection => "FIREWALL_REJECTION",
            Self::CommitGateRejection => "COMMIT_GATE_REJECTION",
            Self::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            Self::ManifestMissing => "MANIFEST_MISSING",
            Self::EvidenceStale => "EVIDENCE_STALE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The trigger currently holding the system out of `NORMAL`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedModeEvent {
    /// Run that triggered it
    pub run_id: String,
    /// Run timestamp at trigger time
    pub timestamp: String,
    /// Trigger
    pub trigger_condition: TriggerCondition,
    /// Context
    pub details: String,
    /// Whether recovery happened
    pub recovered: bool,
    /// When recovery happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_timestamp: Option<String>,
}

/// Snapshot returned by [`DegradedModeController::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedStatus {
    /// Current state
    pub state: SystemState,
    /// Whether writes are permitted
    pub can_write: bool,
    /// Whether analysis is permitted
    pub can_analyze: bool,
    /// Event holding the current state, if any
    pub active_event: Option<DegradedModeEvent>,
}

#[derive(Serialize)]
struct AlertRecord<'a> {
    timestamp: &'a str,
    state: SystemState,
    run_id: &'a str,
    condition: TriggerCondition,
    details: &'a str,
    message: &'a str,
}

/// NORMAL / DEGRADED / HALTED state machine with operator alerts
#[derive(Debug, Clone)]
pub struct DegradedModeController {
    policy: DegradedModePolicy,
    alert_log: JsonlLog,
    state: SystemState,
    active_event: Option<DegradedModeEvent>,
}

impl DegradedModeController {
    /// Controller in `NORMAL` with alerts appended to `alert_log`
    #[must_use]
    pub fn new(policy: DegradedModePolicy, alert_log: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            alert_log: JsonlLog::new(alert_log),
            state: SystemState::Normal,
            active_event: None,
        }
    }

    /// Controller with the policy document at `policy_path`
    ///
    /// # Errors
    /// Returns error if the policy exists but cannot be read or parsed
    pub fn load(policy_path: impl AsRef<Path>, alert_log: impl Into<PathBuf>) -> KernelResult<Self> {
        Ok(Self::new(DegradedModePolicy::load(policy_path)?, alert_log))
    }

    /// Current state
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SystemState {
        self.state
    }

    /// Loaded policy
    #[inline]
    #[must_use]
    pub const fn policy(&self) -> &DegradedModePolicy {
        &self.policy
    }

    /// Alert log
    #[inline]
    #[must_use]
    pub const fn alert_log(&self) -> &JsonlLog {
        &self.alert_log
    }

    /// Event holding the current state
    #[inline]
    #[must_use]
    pub const fn active_event(&self) -> Option<&DegradedModeEvent> {
        self.active_event.as_ref()
    }

    /// Configured action for `trigger`
    #[must_use]
    pub fn check_condition(&self, trigger: TriggerCondition) -> PolicyAction {
        self.policy.action_for(trigger)
    }

    /// Leave `NORMAL` because of `trigger`
    ///
    /// Moves to `HALTED` when the policy says `HALT` or the system is already
    /// halted, otherwise to `DEGRADED`. The new event replaces any active one.
    pub fn enter_degraded_mode(
        &mut self,
        run_id: &str,
        timestamp: &str,
        trigger: TriggerCondition,
        details: &str,
    ) -> SystemState {
        let target = if self.state == SystemState::Halted || self.check_condition(trigger) == PolicyAction::Halt {
            SystemState::Halted
        } else {
            SystemState::Degraded
        };
        if let Err(e) = validate_transition(self.state, target) {
            tracing::error!(run_id, "{}", e);
            return self.state;
        }
        self.state = target;
        self.active_event = Some(DegradedModeEvent {
            run_id: run_id.to_string(),
            timestamp: timestamp.to_string(),
            trigger_condition: trigger,
            details: details.to_string(),
            recovered: false,
            recovery_timestamp: None,
        });
        self.send_alert(run_id, timestamp, trigger, details);
        self.state
    }

    fn send_alert(&self, run_id: &str, timestamp: &str, trigger: TriggerCondition, details: &str) {
        let message = self
            .policy
            .alerts
            .message_template
            .replace("{state}", self.state.as_str())
            .replace("{trigger_condition}", trigger.as_str())
            .replace("{timestamp}", timestamp)
            .replace("{run_id}", run_id)
            .replace("{details}", details);

        tracing::warn!(run_id, state = %self.state, condition = %trigger, "{}", message);

        let record = AlertRecord {
            timestamp,
            state: self.state,
            run_id,
            condition: trigger,
            details,
            message: &message,
        };
        if let Err(e) = self.alert_log.append(&record) {
            tracing::error!(run_id, "Failed to persist alert: {}", e);
        }

        if self.policy.console_alerts() {
            eprintln!("\nALERT: {message}\n");
        }
    }

    /// Whether writes to immutable stores are permitted
    #[must_use]
    pub const fn can_write(&self) -> bool {
        match self.state {
            SystemState::Normal => true,
            SystemState::Degraded => !self.policy.degraded_behavior.writes_blocked,
            SystemState::Halted => false,
        }
    }

    /// Whether analysis may continue
    #[must_use]
    pub const fn can_analyze(&self) -> bool {
        match self.state {
            SystemState::Normal => true,
            SystemState::Degraded => self.policy.degraded_behavior.analysis_allowed,
            SystemState::Halted => false,
        }
    }

    /// Return to `NORMAL`
    ///
    /// Needs `operator_ack` unless the policy enables auto-recovery. `at`
    /// stamps the recovered event.
    pub fn recover(&mut self, run_id: &str, operator_ack: bool, at: &str) -> bool {
        if self.state == SystemState::Normal {
            return true;
        }
        if !self.policy.recovery.auto_recovery && !operator_ack {
            tracing::warn!(run_id, state = %self.state, "Recovery refused without operator acknowledgement");
            return false;
        }
        if let Err(e) = validate_transition(self.state, SystemState::Normal) {
            tracing::error!(run_id, "{}", e);
            return false;
        }
        self.state = SystemState::Normal;
        if let Some(event) = self.active_event.as_mut() {
            event.recovered = true;
            event.recovery_timestamp = Some(at.to_string());
        }
        tracing::info!(run_id, "Recovered to NORMAL");
        true
    }

    /// Status snapshot
    #[must_use]
    pub fn status(&self) -> DegradedStatus {
        DegradedStatus {
            state: self.state,
            can_write: self.can_write(),
            can_analyze: self.can_analyze(),
            active_event: self.active_event.clone(),
        }
    }
}
