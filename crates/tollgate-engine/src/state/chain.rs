//! Hash-chained JSONL ledgers.
//!
//! Each line is a JSON object whose `prev_hash` is the SHA-256 of the previous
//! line's exact bytes; the first line uses `"genesis"`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::atomic::AdvisoryLock;

pub const GENESIS: &str = "genesis";

/// Bytes read from the end of a ledger to find its last line; grows when a
/// line is longer.
const TAIL_WINDOW: u64 = 4096;

pub fn line_hash(line: &str) -> String {
    format!("sha256:{:x}", Sha256::digest(line.as_bytes()))
}

/// Hash of the last complete non-blank line, read from the tail of the file,
/// and whether the file ends without a newline.
fn tail(file: &mut File) -> std::io::Result<(String, bool)> {
    let len = file.metadata()?.len();
    let mut window = TAIL_WINDOW;
    loop {
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        std::io::Read::by_ref(file).take(len - start).read_to_end(&mut buf)?;
        let open_ended = buf.last().is_some_and(|&b| b != b'\n');

        let text = String::from_utf8_lossy(&buf);
        // A window that starts mid-file may begin inside a line; skip it.
        let body = if start == 0 {
            &text[..]
        } else {
            text.find('\n').map_or("", |i| &text[i + 1..])
        };
        if let Some(line) = body.lines().rev().find(|l| !l.trim().is_empty()) {
            return Ok((line_hash(line), open_ended));
        }
        if start == 0 {
            return Ok((GENESIS.to_string(), open_ended));
        }
        window = window.saturating_mul(4);
    }
}

/// Append an object to the ledger, injecting `prev_hash`. Returns the hash
/// of the written line.
///
/// Only the tail of the file is read. Writers are serialized by an advisory
/// lock so concurrent hooks cannot fork the chain.
pub fn append(path: &Path, entry: Value) -> Result<String> {
    let Value::Object(fields) = entry else {
        bail!("ledger entries must be JSON objects");
    };
    let _lock = AdvisoryLock::acquire(path)?;

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    let (prev_hash, open_ended) =
        tail(&mut file).with_context(|| format!("cannot read {}", path.display()))?;

    // prev_hash leads so chains are easy to eyeball.
    let mut obj = serde_json::Map::new();
    obj.insert("prev_hash".into(), Value::String(prev_hash));
    for (k, v) in fields {
        if k != "prev_hash" {
            obj.insert(k, v);
        }
    }

    let line = serde_json::to_string(&Value::Object(obj))?;
    let hash = line_hash(&line);

    let mut record = String::with_capacity(line.len() + 2);
    if open_ended {
        record.push('\n');
    }
    record.push_str(&line);
    record.push('\n');
    file.write_all(record.as_bytes())
        .with_context(|| format!("cannot append to {}", path.display()))?;
    file.sync_data()?;

    Ok(hash)
}

/// Parse every non-empty line.
pub fn read(path: &Path) -> Result<Vec<Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
    };
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid JSON at line {} of {}", i + 1, path.display()))
        })
        .collect()
}

/// Verify the chain. Returns the number of valid entries.
pub fn verify(path: &Path) -> Result<u64> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;

    let mut count = 0u64;
    let mut prev_hash = GENESIS.to_string();

    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: Value = serde_json::from_str(line)
            .with_context(|| format!("invalid JSON at line {}", i + 1))?;
        let entry_prev = entry
            .get("prev_hash")
            .and_then(Value::as_str)
            .unwrap_or(GENESIS);
        if entry_prev != prev_hash {
            bail!(
                "hash chain broken at entry {}: expected prev_hash '{}', got '{}'",
                count,
                prev_hash,
                entry_prev
            );
        }
        prev_hash = line_hash(line);
        count += 1;
    }

    Ok(count)
}
