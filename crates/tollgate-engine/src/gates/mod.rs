//! The four validators and their shared decision plumbing.

pub mod bundle;
pub mod coverage;
pub mod decision;
pub mod dependency;
pub mod packages;
pub mod performance;

use std::path::Path;

use tollgate_core::baseline::MetricMap;
use tollgate_core::decision::Decision;
use tollgate_core::event::ExecutionEvent;
use tollgate_core::types::GateKind;
use tracing::warn;

use crate::classify::ClassificationResult;
use crate::state::history::{append_history, history_path};

pub use self::bundle::BundleGate;
pub use self::coverage::CoverageGate;
pub use self::decision::{settle, ViolationPolicy};
pub use self::dependency::DependencyGate;
pub use self::performance::PerformanceGate;

/// A policy gate for one domain.
///
/// `evaluate` never fails: infrastructure problems resolve to allow through
/// [`settle`]. Only a measured violation produces warn or deny.
pub trait Validator {
    fn kind(&self) -> GateKind;
    fn applies(&self, event: &ExecutionEvent, classification: &ClassificationResult) -> bool;
    fn evaluate(&self, event: &ExecutionEvent, classification: &ClassificationResult) -> Decision;
}

/// Append a measurement to the history ledger under `state_dir`, if any.
/// Failures are logged and ignored.
pub(crate) fn record_history(state_dir: Option<&Path>, domain: &str, key: &str, metrics: &MetricMap) {
    let Some(state_dir) = state_dir else {
        return;
    };
    if let Err(e) = append_history(&history_path(state_dir, domain), key, metrics) {
        warn!(domain, "history append failed: {e:#}");
    }
}
