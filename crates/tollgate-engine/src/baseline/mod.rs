//! Baseline store: one JSON document per (domain, key), behind a swappable
//! byte-level backend.
//!
//! The store never locks. Concurrent writers race and the last rename wins,
//! which is acceptable for advisory quality baselines.

mod fs;
mod memory;

pub use self::fs::{FsBackend, BASELINES_DIR};
pub use self::memory::MemoryBackend;

use std::sync::Arc;

use tollgate_core::baseline::{BaselineRecord, DEFAULT_KEY};
use tollgate_core::errors::StoreError;
use tracing::{debug, warn};

/// Named blob storage underneath a [`BaselineStore`].
pub trait BaselineBackend {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Replace the document atomically.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;
    /// Returns false if there was nothing to remove.
    fn remove(&self, name: &str) -> Result<bool, StoreError>;
    /// Stored document names, sorted.
    fn list(&self) -> Result<Vec<String>, StoreError>;
}

impl<B: BaselineBackend + ?Sized> BaselineBackend for Arc<B> {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(name)
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).put(name, bytes)
    }

    fn remove(&self, name: &str) -> Result<bool, StoreError> {
        (**self).remove(name)
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        (**self).list()
    }
}

pub struct BaselineStore<B> {
    backend: B,
}

impl<B: BaselineBackend> BaselineStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read the baseline for `(domain, key)`.
    ///
    /// `Ok(None)` when absent. A document that does not parse, or whose
    /// metrics no longer match their hash, is `StoreError::Corrupt`.
    pub fn read(&self, domain: &str, key: &str) -> Result<Option<BaselineRecord>, StoreError> {
        let name = document_name(domain, key);
        let Some(bytes) = self.backend.get(&name)? else {
            return Ok(None);
        };
        let record: BaselineRecord =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        if !record.hash_matches() {
            return Err(StoreError::Corrupt {
                name,
                reason: "metrics do not match metrics_hash".to_string(),
            });
        }
        Ok(Some(record))
    }

    /// Write a baseline. Called on bootstrap and explicit reset only.
    pub fn write(&self, record: &BaselineRecord) -> Result<(), StoreError> {
        let name = document_name(&record.domain, &record.key);
        let mut json = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        json.push(b'\n');
        self.backend.put(&name, &json)?;
        debug!(baseline = %name, "baseline written");
        Ok(())
    }

    /// Delete a baseline so the next measurement bootstraps a new one.
    pub fn reset(&self, domain: &str, key: &str) -> Result<bool, StoreError> {
        self.backend.remove(&document_name(domain, key))
    }

    /// All readable baselines. Corrupt documents are skipped.
    pub fn list(&self) -> Result<Vec<BaselineRecord>, StoreError> {
        let mut records = Vec::new();
        for name in self.backend.list()? {
            let Some(bytes) = self.backend.get(&name)? else {
                continue;
            };
            match serde_json::from_slice::<BaselineRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!(baseline = %name, "skipping unreadable baseline: {e}"),
            }
        }
        Ok(records)
    }
}

/// `<domain>` for the default key, `<domain>--<slug(key)>` otherwise.
pub fn document_name(domain: &str, key: &str) -> String {
    if key == DEFAULT_KEY || key.is_empty() {
        domain.to_string()
    } else {
        format!("{domain}--{}", slug(key))
    }
}

/// Lowercase alphanumerics; every other run of characters becomes one `-`.
fn slug(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        DEFAULT_KEY.to_string()
    } else {
        trimmed.to_string()
    }
}
