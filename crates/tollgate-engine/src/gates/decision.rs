use tollgate_core::decision::Decision;
use tollgate_core::errors::GateError;
use tollgate_core::types::GateKind;
use tracing::{info, warn};

/// How a gate reports a measured threshold violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationPolicy {
    pub enforce: bool,
}

impl ViolationPolicy {
    pub fn enforcing() -> Self {
        Self { enforce: true }
    }

    pub fn advisory() -> Self {
        Self { enforce: false }
    }

    /// Deny when enforcing, otherwise warn.
    pub fn violation(&self, message: impl Into<String>) -> Decision {
        if self.enforce {
            Decision::deny(message)
        } else {
            Decision::warn(message)
        }
    }
}

/// Resolve a gate run into its decision.
///
/// Every error is an infrastructure problem, not evidence of a violation,
/// and resolves to allow with an informational message.
pub fn settle(kind: GateKind, result: Result<Decision, GateError>) -> Decision {
    match result {
        Ok(decision) => decision.with_gate(kind),
        Err(e) => {
            match &e {
                GateError::Tool(_) | GateError::NoEndpoint(_) => {
                    info!(gate = %kind, "check skipped: {e}")
                }
                GateError::Store(_) | GateError::Internal(_) => {
                    warn!(gate = %kind, "check failed open: {e}")
                }
            }
            Decision::allow(format!("{kind} check skipped: {e}")).with_gate(kind)
        }
    }
}

/// Strictly greater than the ceiling. A value at the ceiling passes.
pub fn exceeds(value: f64, ceiling: f64) -> bool {
    value > ceiling
}

/// Strictly less than the floor. A value at the floor passes.
pub fn below(value: f64, floor: f64) -> bool {
    value < floor
}
