//! Deterministic identifiers derived from the run anchor

use sha2::{Digest, Sha256};

fn upper_hex_prefix(seed: &str, len: usize) -> String {
    let digest = hex::encode_upper(Sha256::digest(seed.as_bytes()));
    digest[..len].to_string()
}

/// `EV-` followed by 12 uppercase hex chars of
/// `sha256("{run_id}:{run_ts}:{part}:...")`.
#[must_use]
pub fn derive_evidence_id(run_id: &str, run_ts: &str, parts: &[&str]) -> String {
    let mut seed = format!("{run_id}:{run_ts}");
    for part in parts {
        seed.push(':');
        seed.push_str(part);
    }
    format!("EV-{}", upper_hex_prefix(&seed, 12))
}

/// `PLAN-` followed by 8 uppercase hex chars.
///
/// Only the hour bucket of `run_ts` (its first 13 chars) feeds the seed, so
/// a replay within the same hour yields the same plan id.
#[must_use]
pub fn derive_plan_id(run_id: &str, run_ts: &str, agent_id: &str) -> String {
    let hour = run_ts.get(..13).unwrap_or(run_ts);
    format!("PLAN-{}", upper_hex_prefix(&format!("{run_id}:{hour}:{agent_id}"), 8))
}
