use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tollgate_core::decision::Decision;
use tollgate_core::event::ExecutionEvent;
use tollgate_core::types::Domain;

use super::chain;

pub const DECISIONS_FILE: &str = "decisions.jsonl";

pub fn decisions_path(state_dir: &Path) -> PathBuf {
    state_dir.join(DECISIONS_FILE)
}

/// Append a decision to the audit log, maintaining the hash chain.
///
/// Each entry gets `prev_hash` (SHA-256 of the previous line, or "genesis")
/// and `ts`.
pub fn append_decision(
    path: &Path,
    decision: &Decision,
    event: &ExecutionEvent,
    domain: Domain,
) -> Result<String> {
    let entry = serde_json::json!({
        "ts": Utc::now().to_rfc3339(),
        "gate": decision.gate.map(|g| g.as_str()),
        "verdict": decision.verdict.as_str(),
        "message": decision.message,
        "domain": domain.as_str(),
        "tool": event.tool.to_string(),
        "session_id": event.session_id,
    });
    chain::append(path, entry).with_context(|| format!("cannot write audit {}", path.display()))
}

pub fn read_decisions(path: &Path) -> Result<Vec<Value>> {
    chain::read(path)
}

/// Verify the hash chain in the audit log. Returns the number of valid entries.
pub fn verify_chain(path: &Path) -> Result<u64> {
    chain::verify(path)
}
