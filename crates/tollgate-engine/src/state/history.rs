use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tollgate_core::baseline::{HistoryEntry, MetricMap};

use super::chain;

pub const HISTORY_DIR: &str = "history";

/// `<state_dir>/history/<domain>.jsonl`
pub fn history_path(state_dir: &Path, domain: &str) -> PathBuf {
    state_dir.join(HISTORY_DIR).join(format!("{domain}.jsonl"))
}

/// Append a measurement to the domain's history ledger, maintaining the hash
/// chain. Returns the hash of the new entry.
pub fn append_history(path: &Path, key: &str, metrics: &MetricMap) -> Result<String> {
    let entry = serde_json::json!({
        "key": key,
        "metrics": metrics,
        "ts": Utc::now(),
    });
    chain::append(path, entry).with_context(|| format!("cannot append history {}", path.display()))
}

pub fn read_history(path: &Path) -> Result<Vec<HistoryEntry>> {
    chain::read(path)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::from_value(v)
                .with_context(|| format!("history entry {i} in {} is malformed", path.display()))
        })
        .collect()
}

/// Verify the ledger's hash chain. Returns the number of entries.
pub fn verify_history(path: &Path) -> Result<u64> {
    chain::verify(path)
}
