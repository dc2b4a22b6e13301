use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{GateKind, HookPhase, Verdict};

/// Exit code the host reads as "deny / regression detected, surface it".
pub const EXIT_BLOCK: i32 = 2;
/// Exit code the host reads as "continue".
pub const EXIT_CONTINUE: i32 = 0;

/// One compared metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: String,
    pub baseline: f64,
    pub current: f64,
    /// Relative change in percent; positive means the value grew. `None`
    /// when the baseline is zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_delta: Option<f64>,
    pub threshold_exceeded: bool,
}

impl fmt::Display for MetricDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ",
            self.metric,
            fmt_number(self.baseline),
            fmt_number(self.current)
        )?;
        match self.percent_delta {
            Some(pct) => write!(f, "({pct:+.1}%)"),
            None => f.write_str("(n/a)"),
        }
    }
}

/// Per-metric comparison of a measurement against its baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub deltas: Vec<MetricDelta>,
}

impl RegressionReport {
    pub fn regressions(&self) -> impl Iterator<Item = &MetricDelta> {
        self.deltas.iter().filter(|d| d.threshold_exceeded)
    }

    pub fn has_regressions(&self) -> bool {
        self.deltas.iter().any(|d| d.threshold_exceeded)
    }
}

/// The sole externally observable outcome of a gate invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RegressionReport>,
}

impl Decision {
    pub fn allow(message: impl Into<String>) -> Self {
        Self::new(Verdict::Allow, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Verdict::Warn, message)
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self::new(Verdict::Deny, message)
    }

    pub fn new(verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            verdict,
            message: message.into(),
            gate: None,
            report: None,
        }
    }

    pub fn with_gate(mut self, gate: GateKind) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_report(mut self, report: RegressionReport) -> Self {
        self.report = Some(report);
        self
    }

    pub fn is_allow(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    /// Exit code for the host.
    ///
    /// Deny always blocks. Warn is surfaced with the block code only after the
    /// action has run, where the host cannot block anymore and feeds the
    /// message back to the agent instead.
    pub fn exit_code(&self, phase: HookPhase) -> i32 {
        match (self.verdict, phase) {
            (Verdict::Deny, _) => EXIT_BLOCK,
            (Verdict::Warn, HookPhase::PostToolUse) => EXIT_BLOCK,
            _ => EXIT_CONTINUE,
        }
    }

    /// Merge decisions from several gates: the strictest verdict wins and
    /// every non-empty message is kept, strictest first.
    pub fn merge(decisions: Vec<Decision>) -> Decision {
        let mut decisions = decisions;
        decisions.sort_by(|a, b| b.verdict.cmp(&a.verdict));
        let mut iter = decisions.into_iter();
        let Some(mut first) = iter.next() else {
            return Decision::allow("");
        };
        for other in iter {
            if !other.message.is_empty() {
                if !first.message.is_empty() {
                    first.message.push('\n');
                }
                first.message.push_str(&other.message);
            }
            if first.report.is_none() {
                first.report = other.report;
            }
        }
        first
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gate {
            Some(gate) => write!(f, "{} [{gate}]: {}", self.verdict, self.message),
            None => write!(f, "{}: {}", self.verdict, self.message),
        }
    }
}

/// Render a metric value without a trailing `.0` for whole numbers.
pub fn fmt_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.3}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}
