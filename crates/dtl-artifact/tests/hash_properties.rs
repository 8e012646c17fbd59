//! Hash order-independence and sensitivity properties
//!
//! Tenet: reordering keys or order-insensitive lists never changes a bundle's
//! hash; changing any covered field always does.

use dtl_artifact::{into_payload, CapabilityGuard, CapabilityManifest, CommitBundle, RunConfig, RunMode};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn run() -> RunConfig {
    RunConfig::new("RUN-1", "2025-01-15T09:30:00Z", RunMode::Mock).unwrap()
}

fn payload_from(pairs: &[(String, i64)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.clone(), json!(v));
    }
    map
}

fn reversed(pairs: &[(String, i64)]) -> Map<String, Value> {
    let mut rev = pairs.to_vec();
    rev.reverse();
    payload_from(&rev)
}

fn ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("EV-[0-9A-F]{12}", 0..6).prop_map(|s| s.into_iter().collect())
}

fn pairs() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..6)
        .prop_map(|m| m.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_bundle_hash_ignores_key_order(pairs in pairs(), refs in ids()) {
        let a = CommitBundle::seal(&run(), "reporter-v1.0", payload_from(&pairs), refs.clone(), vec!["write_report".into()]).unwrap();
        let b = CommitBundle::seal(&run(), "reporter-v1.0", reversed(&pairs), refs, vec!["write_report".into()]).unwrap();
        prop_assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn prop_bundle_hash_ignores_list_order(pairs in pairs(), refs in ids()) {
        let claims = vec!["write_evidence_store".to_string(), "write_report".to_string()];
        let a = CommitBundle::seal(&run(), "reporter-v1.0", payload_from(&pairs), refs.clone(), claims.clone()).unwrap();
        let mut rev_refs = refs;
        rev_refs.reverse();
        let mut rev_claims = claims;
        rev_claims.reverse();
        let b = CommitBundle::seal(&run(), "reporter-v1.0", payload_from(&pairs), rev_refs, rev_claims).unwrap();
        prop_assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn prop_bundle_hash_detects_any_covered_mutation(
        pairs in pairs(),
        refs in ids(),
        field in 0usize..7,
    ) {
        let original = CommitBundle::seal(&run(), "reporter-v1.0", payload_from(&pairs), refs, vec!["write_report".into()]).unwrap();
        let mut mutated = original.clone();
        match field {
            0 => mutated.run_id.push('X'),
            1 => mutated.agent_id = "reporter-v1.1".into(),
            2 => mutated.schema_version = "9.9.9".into(),
            3 => mutated.timestamp = "2025-01-15T09:30:01Z".into(),
            4 => { mutated.payload.insert("__mutated".into(), json!(true)); }
            5 => mutated.evidence_refs.push("EV-ZZZZZZZZZZZZ".into()),
            _ => mutated.capability_claims.push("write_evidence_store".into()),
        }
        prop_assert!(!mutated.verify());
        prop_assert_ne!(mutated.compute_hash().unwrap().to_string(), original.content_hash);
    }

    #[test]
    fn prop_claims_validate_iff_subset_and_disjoint(
        claims in prop::collection::vec(prop_oneof![
            Just("read_market_data"),
            Just("propose_plan"),
            Just("select_assets"),
            Just("write_evidence_store"),
            Just("shell_exec"),
        ], 0..5)
    ) {
        let manifest = CapabilityManifest::parse(
            "**Agent ID**: `strategist-v1.0`\n### ALLOWED\n- `read_market_data`\n- `propose_plan`\n- `select_assets`\n### DENIED\n- `write_evidence_store`\n",
            "strategist.skill.md",
        ).unwrap();
        let allowed = manifest.allowed().clone();
        let denied = manifest.denied().clone();
        let guard = CapabilityGuard::new(manifest, Vec::<String>::new());

        let should_pass = claims.iter().all(|c| allowed.contains(*c)) && claims.iter().all(|c| !denied.contains(*c));
        prop_assert_eq!(guard.validate_claims(claims.iter().copied()).is_ok(), should_pass);
    }
}

#[test]
fn nested_key_order_does_not_matter() {
    let a = into_payload(json!({"outer": {"b": 2, "a": [{"y": 1, "x": 0}]}})).unwrap();
    let b: Map<String, Value> =
        serde_json::from_str(r#"{"outer":{"a":[{"x":0,"y":1}],"b":2}}"#).unwrap();
    let ha = CommitBundle::seal(&run(), "reporter-v1.0", a, vec![], vec![]).unwrap();
    let hb = CommitBundle::seal(&run(), "reporter-v1.0", b, vec![], vec![]).unwrap();
    assert_eq!(ha.content_hash, hb.content_hash);
}
