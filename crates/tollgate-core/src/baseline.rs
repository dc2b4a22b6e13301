use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Key used when a domain keeps a single baseline.
pub const DEFAULT_KEY: &str = "default";

/// Named numeric metrics, sorted by name.
pub type MetricMap = BTreeMap<String, f64>;

/// Last-known-good metric snapshot for one (domain, key) pair.
///
/// Written on bootstrap or explicit reset only; ordinary gate runs compare
/// against it and never overwrite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub domain: String,
    #[serde(default = "default_key")]
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub metrics: MetricMap,
    #[serde(default)]
    pub metrics_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

impl BaselineRecord {
    /// Promote a measurement to a baseline.
    pub fn from_snapshot(domain: &str, key: &str, snapshot: &MeasurementSnapshot) -> Self {
        Self {
            domain: domain.to_string(),
            key: key.to_string(),
            created_at: snapshot.taken_at,
            metrics_hash: metrics_hash(&snapshot.metrics),
            metrics: snapshot.metrics.clone(),
            source: snapshot.source.clone(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// True if the stored hash matches the metric map. Records written before
    /// hashes existed carry an empty hash and are accepted.
    pub fn hash_matches(&self) -> bool {
        self.metrics_hash.is_empty() || self.metrics_hash == metrics_hash(&self.metrics)
    }
}

/// Result of one external measurement. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSnapshot {
    pub metrics: MetricMap,
    pub taken_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MeasurementSnapshot {
    pub fn new(metrics: MetricMap) -> Self {
        Self {
            metrics,
            taken_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// A single measurement history ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub prev_hash: String,
    pub key: String,
    pub metrics: MetricMap,
    pub ts: DateTime<Utc>,
}

/// Deterministic hash of a metric map.
pub fn metrics_hash(metrics: &MetricMap) -> String {
    let canonical: Vec<String> = metrics.iter().map(|(k, v)| format!("{k}:{v}")).collect();
    format!("sha256:{:x}", Sha256::digest(canonical.join(",").as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> MetricMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn metrics_hash_is_order_independent() {
        let a = metrics(&[("lcp_ms", 2400.0), ("performance_score", 92.0)]);
        let mut b = MetricMap::new();
        b.insert("performance_score".into(), 92.0);
        b.insert("lcp_ms".into(), 2400.0);
        assert_eq!(metrics_hash(&a), metrics_hash(&b));
        assert!(metrics_hash(&a).starts_with("sha256:"));
    }

    #[test]
    fn snapshot_promotes_to_baseline() {
        let snap = MeasurementSnapshot::new(metrics(&[("lcp_ms", 2400.0)]))
            .with_source("http://localhost:3000");
        let record = BaselineRecord::from_snapshot("performance", DEFAULT_KEY, &snap);
        assert_eq!(record.metrics, snap.metrics);
        assert_eq!(record.created_at, snap.taken_at);
        assert_eq!(record.source.as_deref(), Some("http://localhost:3000"));
        assert!(record.hash_matches());
    }

    #[test]
    fn tampered_metrics_fail_hash_check() {
        let snap = MeasurementSnapshot::new(metrics(&[("lcp_ms", 2400.0)]));
        let mut record = BaselineRecord::from_snapshot("performance", DEFAULT_KEY, &snap);
        record.metrics.insert("lcp_ms".into(), 1.0);
        assert!(!record.hash_matches());
    }

    #[test]
    fn legacy_record_without_hash_or_key_loads() {
        let json = r#"{"domain":"performance","created_at":"2026-01-01T00:00:00Z",
                       "metrics":{"performance_score":92}}"#;
        let record: BaselineRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.key, DEFAULT_KEY);
        assert_eq!(record.metric("performance_score"), Some(92.0));
        assert!(record.hash_matches());
    }
}
