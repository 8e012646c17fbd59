//! Run orchestrator
//!
//! Sequences one run through eight steps:
//!
//! 1. `load_policy`: kill switches, degraded-mode policy, runtime fingerprint
//! 2. `load_manifests`: one capability guard per stage
//! 3. `enforce_kill_switches`
//! 4. `run_strategist`
//! 5. `run_researcher`
//! 6. `run_reporter`
//! 7. `commit_gate_validate`: eligibility, prewrite, validate, promote
//! 8. `write_stores`: run artifact and ledger entry
//!
//! The first failing step ends the run and drives the degraded-mode
//! controller with the matching trigger; nothing after it executes.

use crate::config::ControlPlaneConfig;
use crate::error::{CoreResult, StageError};
use crate::stage::{
    load_guard, Stage, StageContext, COMMIT_BUNDLE_SCHEMA, ROUTING_STATISTICS_SCHEMA, STRATEGIST_TO_RESEARCHER_SCHEMA,
};
use crate::stages::{MarketContext, ReportInput, Reporter, ResearchPlan, Researcher, RoutingStatistics, Strategist};
use dtl_artifact::{CommitBundle, ProposalEnvelope, RunConfig};
use dtl_constitutional::{
    EnforcementResult, InterStageFirewall, KillSwitchEnforcer, SchemaRegistry, DISABLE_LEARNING,
};
use dtl_kernel::{
    CommitGate, DegradedModeController, DegradedStatus, GateContext, RejectionCode, RejectionPayload, SystemState,
    TriggerCondition,
};
use dtl_store::{write_json_exclusive, EvidenceCandidateQueue, EvidenceStore, RunLedger};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::fs;

/// Capability granted to every stage unless learning is switched off
pub const ROUTING_STATS_GRANT: &str = "read_routing_stats";

/// The eight run steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Load policies and record the runtime fingerprint
    LoadPolicy,
    /// Load stage manifests
    LoadManifests,
    /// Evaluate kill switches
    EnforceKillSwitches,
    /// Plan
    RunStrategist,
    /// Gather evidence
    RunResearcher,
    /// Persist evidence and seal the bundle
    RunReporter,
    /// Commit protocol
    CommitGateValidate,
    /// Run artifact and ledger
    WriteStores,
}

impl Step {
    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadPolicy => "load_policy",
            Self::LoadManifests => "load_manifests",
            Self::EnforceKillSwitches => "enforce_kill_switches",
            Self::RunStrategist => "run_strategist",
            Self::RunResearcher => "run_researcher",
            Self::RunReporter => "run_reporter",
            Self::CommitGateValidate => "commit_gate_validate",
            Self::WriteStores => "write_stores",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Run id
    pub run_id: String,
    /// Run timestamp
    pub run_ts: String,
    /// True iff all eight steps completed
    pub success: bool,
    /// Controller state after the run
    pub system_state: SystemState,
    /// Completed steps, in order
    pub steps_completed: Vec<Step>,
    /// Failure descriptions
    pub errors: Vec<String>,
    /// Commit-gate rejection that ended the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionPayload>,
    /// Per-step outputs
    pub output: Map<String, Value>,
}

impl RunResult {
    fn new(run: &RunConfig, state: SystemState) -> Self {
        Self {
            run_id: run.run_id().to_string(),
            run_ts: run.run_ts().to_string(),
            success: false,
            system_state: state,
            steps_completed: Vec::new(),
            errors: Vec::new(),
            rejection: None,
            output: Map::new(),
        }
    }

    /// Whether `step` completed
    #[must_use]
    pub fn completed(&self, step: Step) -> bool {
        self.steps_completed.contains(&step)
    }
}

struct Failure {
    trigger: TriggerCondition,
    details: String,
    rejection: Option<RejectionPayload>,
}

impl Failure {
    fn new(trigger: TriggerCondition, details: impl Into<String>) -> Self {
        Self {
            trigger,
            details: details.into(),
            rejection: None,
        }
    }

    fn unknown(err: impl fmt::Display) -> Self {
        Self::new(TriggerCondition::Unknown, err.to_string())
    }

    fn stage(err: &StageError) -> Self {
        let trigger = match err {
            StageError::FirewallRejected { .. } => TriggerCondition::FirewallRejection,
            StageError::Manifest(_) => TriggerCondition::ManifestMissing,
            _ => TriggerCondition::Unknown,
        };
        Self::new(trigger, err.to_string())
    }

    fn rejected(rejection: RejectionPayload) -> Self {
        let trigger = if rejection.code == RejectionCode::EvidenceStale {
            TriggerCondition::EvidenceStale
        } else {
            TriggerCondition::CommitGateRejection
        };
        Self {
            trigger,
            details: rejection.code.as_str().to_string(),
            rejection: Some(rejection),
        }
    }
}

type StepResult<T> = Result<T, Failure>;

fn record(result: &mut RunResult, step: Step) {
    tracing::info!(run_id = %result.run_id, step = %step, "Step complete");
    result.steps_completed.push(step);
}

fn payload_field<'a>(envelope: &'a ProposalEnvelope, key: &str) -> StepResult<&'a Value> {
    envelope
        .payload()
        .get(key)
        .ok_or_else(|| Failure::unknown(format!("{} envelope has no '{key}'", envelope.agent_id())))
}

fn to_value<T: Serialize>(value: &T) -> StepResult<Value> {
    serde_json::to_value(value).map_err(Failure::unknown)
}

struct Guards {
    strategist: Strategist,
    researcher: Researcher,
    reporter: Reporter,
    grants: Vec<String>,
}

/// Drives runs through the eight steps
///
/// The degraded-mode controller lives as long as the orchestrator, so a
/// `HALTED` state reached in one run blocks every later run until
/// [`Orchestrator::recover`] is called.
#[derive(Debug)]
pub struct Orchestrator {
    config: ControlPlaneConfig,
    firewall: InterStageFirewall,
    controller: DegradedModeController,
}

impl Orchestrator {
    /// Load schemas and the degraded-mode policy for `config`
    ///
    /// # Errors
    /// Returns error if a schema or the degraded-mode policy is malformed
    pub fn new(config: ControlPlaneConfig) -> CoreResult<Self> {
        let firewall = InterStageFirewall::new(SchemaRegistry::load_dir(config.schemas_dir())?);
        let controller = DegradedModeController::load(config.degraded_mode_policy(), config.alert_log())?;
        Ok(Self {
            config,
            firewall,
            controller,
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    /// Firewall in use
    #[inline]
    #[must_use]
    pub const fn firewall(&self) -> &InterStageFirewall {
        &self.firewall
    }

    /// Controller snapshot
    #[must_use]
    pub fn status(&self) -> DegradedStatus {
        self.controller.status()
    }

    /// Return to `NORMAL`; see [`DegradedModeController::recover`]
    pub fn recover(&mut self, run_id: &str, operator_ack: bool, at: &str) -> bool {
        self.controller.recover(run_id, operator_ack, at)
    }

    /// Execute one run
    ///
    /// Never fails: every failure is reported in the [`RunResult`] and
    /// reflected in the controller state.
    pub fn run(&mut self, run: &RunConfig, context: MarketContext) -> RunResult {
        let mut result = RunResult::new(run, self.controller.state());
        tracing::info!(run_id = %run.run_id(), run_ts = %run.run_ts(), mode = %run.mode().as_str(), "Run starting");

        if self.controller.state() == SystemState::Halted {
            tracing::error!(run_id = %run.run_id(), "System HALTED, operator recovery required");
            result.errors.push("system HALTED: operator recovery required".into());
            return result;
        }

        match self.execute(run, context, &mut result) {
            Ok(()) => result.success = true,
            Err(failure) => {
                let step = STEPS
                    .get(result.steps_completed.len())
                    .map_or("unknown", |s| s.as_str());
                tracing::error!(
                    run_id = %run.run_id(),
                    step,
                    trigger = %failure.trigger,
                    "Run failed: {}",
                    failure.details
                );
                result.errors.push(format!("{step}: {}", failure.details));
                result.rejection = failure.rejection;
                self.controller
                    .enter_degraded_mode(run.run_id(), run.run_ts(), failure.trigger, &failure.details);
            }
        }

        result.system_state = self.controller.state();
        tracing::info!(
            run_id = %run.run_id(),
            success = result.success,
            state = %result.system_state,
            "Run finished"
        );
        result
    }

    fn execute(&self, run: &RunConfig, context: MarketContext, result: &mut RunResult) -> StepResult<()> {
        // 1. Policies
        let kill_switches = KillSwitchEnforcer::load(self.config.kill_switch_policy()).map_err(Failure::unknown)?;
        let policy_applied = json!({
            "run_ts": run.run_ts(),
            "kill_switches": kill_switches.policy(),
            "degraded_mode": self.controller.policy(),
            "runtime_fingerprint": {
                "crate_version": crate::VERSION,
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            },
        });
        result.output.insert("policy_applied".into(), policy_applied.clone());
        record(result, Step::LoadPolicy);

        // 2. Manifests
        let learning_enabled = !kill_switches.is_enabled(DISABLE_LEARNING);
        let guards = self.load_guards(learning_enabled)?;
        result.output.insert("runner_grants".into(), json!(guards.grants));
        record(result, Step::LoadManifests);

        // 3. Kill switches
        let enforcement = kill_switches.enforce(self.config.requested_operations.as_slice());
        for warning in &enforcement.warnings {
            tracing::warn!(run_id = %run.run_id(), "Kill switch warning: {}", warning);
        }
        result.output.insert("kill_switches".into(), to_value(&enforcement)?);
        if !enforcement.can_proceed {
            return Err(Failure::new(
                TriggerCondition::KillSwitchActive,
                format!(
                    "blocked by {}: {}",
                    enforcement.active_switches.join(", "),
                    enforcement.blocked_operations.join(", ")
                ),
            ));
        }
        record(result, Step::EnforceKillSwitches);

        let evidence = EvidenceStore::new(self.config.evidence_store_dir());
        let mut queue = if self.config.queue_persist {
            EvidenceCandidateQueue::with_persistence(self.config.queue_max_size, self.config.queue_snapshot())
        } else {
            EvidenceCandidateQueue::new(self.config.queue_max_size)
        };
        let mut ctx = StageContext {
            run,
            firewall: &self.firewall,
            queue: &mut queue,
            evidence: &evidence,
        };

        // 4. Strategist
        let context = MarketContext {
            routing_stats: if learning_enabled { self.routing_stats() } else { None },
            ..context
        };
        let plan_envelope = guards
            .strategist
            .process(context, &mut ctx)
            .map_err(|e| Failure::stage(&e))?;
        let plan_value = Value::Object(plan_envelope.payload().clone());
        let verdict = self.firewall.validate(&plan_value, STRATEGIST_TO_RESEARCHER_SCHEMA);
        if !verdict.valid {
            return Err(Failure::new(TriggerCondition::FirewallRejection, verdict.errors.join("; ")));
        }
        let plan: ResearchPlan = serde_json::from_value(plan_value.clone()).map_err(Failure::unknown)?;
        result.output.insert("plan".into(), plan_value);
        record(result, Step::RunStrategist);

        // 5. Researcher
        let plan_id = plan.plan_id.clone();
        let research = guards
            .researcher
            .process(plan, &mut ctx)
            .map_err(|e| Failure::stage(&e))?;
        let gathered = payload_field(&research, "evidence_candidates")?
            .as_array()
            .map_or(0, Vec::len);
        result.output.insert("evidence_candidates".into(), json!(gathered));
        record(result, Step::RunResearcher);

        // 6. Reporter
        let queued = ctx.queue.len();
        let report_envelope = guards
            .reporter
            .process(
                ReportInput {
                    plan_id,
                    summary: Some(format!("Analyzed {queued} evidence items")),
                    analysis: None,
                },
                &mut ctx,
            )
            .map_err(|e| Failure::stage(&e))?;
        let report = payload_field(&report_envelope, "report")?.clone();
        let bundle = CommitBundle::from_value(payload_field(&report_envelope, "commit_bundle")?.clone())
            .map_err(Failure::unknown)?;
        result.output.insert("report".into(), report.clone());
        record(result, Step::RunReporter);

        // 7. Commit gate
        let allowed = guards.reporter.guard().effective_allowed();
        let gate_ctx = GateContext {
            active_kill_switches: &enforcement.active_switches,
            allowed_capabilities: &allowed,
            now: run.instant(),
        };
        let committed = self.commit(&evidence, &bundle, &gate_ctx, result)?;
        record(result, Step::CommitGateValidate);

        // 8. Stores
        if self.controller.can_write() {
            let artifact = json!({
                "run_id": run.run_id(),
                "run_ts": run.run_ts(),
                "mode": run.mode().as_str(),
                "success": true,
                "policy_applied": policy_applied,
                "report": report,
                "commit_bundle": to_value(&bundle)?,
            });
            let path = self.config.runs_dir().join(format!("{}.json", run.run_id()));
            let shown = path.display().to_string();
            write_json_exclusive(&path, &artifact, None).map_err(Failure::unknown)?;

            let entry = json!({
                "run_id": run.run_id(),
                "run_ts": run.run_ts(),
                "mode": run.mode().as_str(),
                "bundle_hash": bundle.content_hash,
                "evidence_count": bundle.evidence_refs.len(),
                "committed_file": committed,
                "run_artifact": shown,
            });
            RunLedger::new(self.config.ledger_dir())
                .record(run, &entry)
                .map_err(Failure::unknown)?;
            result.output.insert("run_artifact".into(), json!(shown));
        } else {
            tracing::warn!(run_id = %run.run_id(), state = %self.controller.state(), "Writes blocked, skipping stores");
            result.output.insert("write_skipped".into(), json!(true));
            result.output.insert("reason".into(), json!("DEGRADED"));
        }
        record(result, Step::WriteStores);
        Ok(())
    }

    fn load_guards(&self, learning_enabled: bool) -> StepResult<Guards> {
        let mut grants = self.config.runner_capabilities.clone();
        if learning_enabled && !grants.iter().any(|g| g == ROUTING_STATS_GRANT) {
            grants.push(ROUTING_STATS_GRANT.to_string());
        }
        let dir = self.config.manifests_dir();
        let missing = |e: StageError| Failure::new(TriggerCondition::ManifestMissing, e.to_string());

        Ok(Guards {
            strategist: Strategist::new(load_guard::<Strategist>(&dir, &grants).map_err(missing)?),
            researcher: Researcher::new(load_guard::<Researcher>(&dir, &grants).map_err(missing)?),
            reporter: Reporter::new(load_guard::<Reporter>(&dir, &grants).map_err(missing)?),
            grants,
        })
    }

    /// Routing statistics, if present and accepted by the firewall
    fn routing_stats(&self) -> Option<RoutingStatistics> {
        let path = self.config.routing_stats_path();
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cannot read routing statistics {}: {}", path.display(), e);
                return None;
            }
        };
        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Ignoring malformed routing statistics {}: {}", path.display(), e);
                return None;
            }
        };
        let verdict = self.firewall.validate(&value, ROUTING_STATISTICS_SCHEMA);
        if !verdict.valid {
            tracing::warn!("Ignoring routing statistics: {}", verdict.errors.join("; "));
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Eligibility, prewrite, validation and promotion; returns the
    /// committed path, or `None` when writes are blocked
    fn commit(
        &self,
        evidence: &EvidenceStore,
        bundle: &CommitBundle,
        ctx: &GateContext<'_>,
        result: &mut RunResult,
    ) -> StepResult<Option<String>> {
        let mut gate = CommitGate::new(evidence.clone(), self.config.prewrite_dir())
            .with_evidence_ttl_secs(self.config.evidence_ttl_secs);
        if let Some(schema) = self.firewall.schemas().get(COMMIT_BUNDLE_SCHEMA) {
            gate = gate.with_schema(schema.clone());
        }

        let eligibility = gate.validate_eligibility(bundle, ctx);
        result.output.insert("eligibility".into(), to_value(&eligibility)?);
        if let Some(rejection) = eligibility.rejection {
            return Err(Failure::rejected(rejection));
        }

        if !self.controller.can_write() {
            tracing::warn!(run_id = %bundle.run_id, "Writes blocked, skipping prewrite");
            result.output.insert("commit_skipped".into(), json!("DEGRADED"));
            return Ok(None);
        }

        gate.create_prewrite(bundle).map_err(Failure::unknown)?;
        let validation = gate.validate(bundle, ctx);
        result.output.insert("commit_result".into(), to_value(&validation)?);
        if let Some(rejection) = validation.rejection {
            gate.delete_prewrite(&bundle.run_id);
            return Err(Failure::rejected(rejection));
        }

        let promotion = gate.promote_to_committed(&bundle.run_id);
        result.output.insert("promotion".into(), to_value(&promotion)?);
        if !promotion.succeeded() {
            return Err(Failure::new(
                TriggerCondition::CommitGateRejection,
                format!("PROMOTE_FAILED ({:?}): {}", promotion.status, promotion.message),
            ));
        }
        Ok(promotion.path.map(|p| p.display().to_string()))
    }
}

const STEPS: [Step; 8] = [
    Step::LoadPolicy,
    Step::LoadManifests,
    Step::EnforceKillSwitches,
    Step::RunStrategist,
    Step::RunResearcher,
    Step::RunReporter,
    Step::CommitGateValidate,
    Step::WriteStores,
];

/// Kill-switch evaluation without running anything
///
/// # Errors
/// Returns error if the policy document is malformed
pub fn evaluate_kill_switches(config: &ControlPlaneConfig, operations: &[String]) -> CoreResult<EnforcementResult> {
    let enforcer = KillSwitchEnforcer::load(config.kill_switch_policy())?;
    Ok(enforcer.enforce(operations))
}
