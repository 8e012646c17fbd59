//! Firewall and kill-switch boundary checks
//!
//! Tenet: nothing crosses a stage boundary unless it matches its schema and
//! carries no executable payload in a high-risk field; a hard switch stops
//! the run before any stage executes.

use dtl_constitutional::{
    scan_for_injection, CompiledSchema, InterStageFirewall, KillSwitchEnforcer, SchemaRegistry, COMMIT_GATE_PASS,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;

fn envelope_firewall() -> InterStageFirewall {
    let mut registry = SchemaRegistry::new();
    registry.insert(
        CompiledSchema::compile(
            "proposal_envelope",
            &json!({
                "type": "object",
                "required": ["agent_id", "payload"],
                "properties": {
                    "agent_id": {"type": "string", "pattern": "^[a-z][a-z0-9_-]*-v[0-9]+\\.[0-9]+$"},
                    "payload": {"type": "object"}
                },
                "additionalProperties": false
            }),
        )
        .unwrap(),
    );
    InterStageFirewall::new(registry)
}

#[test]
fn extra_top_level_key_rejected_by_schema() {
    let verdict = envelope_firewall().validate(
        &json!({"agent_id": "strategist-v1.0", "payload": {}, "smuggled": "x"}),
        "proposal_envelope",
    );
    assert!(!verdict.valid);
    assert_eq!(verdict.errors.len(), 1);
    assert!(verdict.errors[0].starts_with("Schema violation at /:"));
}

#[test]
fn injection_in_nested_payload_rejected() {
    let verdict = envelope_firewall().validate(
        &json!({
            "agent_id": "strategist-v1.0",
            "payload": {"tool_args": [{"target": "javascript:alert(1)"}], "summary": "$(id)"}
        }),
        "proposal_envelope",
    );
    assert_eq!(
        verdict.errors,
        vec!["Injection pattern (JavaScript protocol) at payload.tool_args[0].target"]
    );
}

#[test]
fn bad_agent_id_reports_pointer() {
    let verdict = envelope_firewall().validate(&json!({"agent_id": "Strategist", "payload": {}}), "proposal_envelope");
    assert!(verdict.errors[0].starts_with("Schema violation at /agent_id:"));
}

#[test]
fn clean_deep_structure_passes_scan() {
    let message = json!({
        "query": ["AAPL price", "GME news"],
        "directives": [{"step": "fetch", "args": ["--limit", "5"]}],
        "notes": "{{ not scanned }}"
    });
    assert!(scan_for_injection(&message).is_empty());
}

#[test]
fn disable_writes_hard_halts_any_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kill_switches.json");
    fs::write(
        &path,
        json!({
            "enforcement_order": ["DISABLE_WRITES", "DISABLE_LEARNING"],
            "switches": {
                "DISABLE_WRITES": {
                    "enabled": true,
                    "description": "Stop all persistence",
                    "enforcement": "hard",
                    "blocks": ["write_evidence", "write_report"]
                },
                "DISABLE_LEARNING": {
                    "enabled": false,
                    "enforcement": "soft",
                    "blocks": ["routing_statistics_write"]
                }
            }
        })
        .to_string(),
    )
    .unwrap();

    let result = KillSwitchEnforcer::load(&path).unwrap().enforce(&["run_agents"]);

    assert!(!result.can_proceed);
    assert_eq!(result.active_switches, vec!["DISABLE_WRITES"]);
    assert_eq!(result.blocked_operations, vec![COMMIT_GATE_PASS]);
    assert!(result.warnings.is_empty());
}
