use std::path::Path;

use tollgate_core::decision::Decision;
use tollgate_core::errors::{GateError, ToolError};
use tollgate_core::event::ExecutionEvent;
use tollgate_core::traits::{CoverageRunner, CoverageSummary};
use tollgate_core::types::{Domain, GateKind};

use super::decision::{below, settle, ViolationPolicy};
use super::Validator;
use crate::classify::ClassificationResult;

const TEST_DIRS: &[&str] = &["tests", "test", "__tests__"];
const TEST_MARKERS: &[&str] = &[".test.", ".spec.", "_test."];

/// True for files under a conventional test directory or carrying a test
/// naming marker. Edits to these are never coverage-gated.
pub fn is_test_file(path: &Path) -> bool {
    let in_test_dir = path
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .any(|c| TEST_DIRS.iter().any(|d| c.as_os_str() == *d));
    if in_test_dir {
        return true;
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    name.starts_with("test_") || TEST_MARKERS.iter().any(|m| name.contains(m))
}

/// Absolute coverage floor on source edits. The aggregate is the minimum of
/// the four metrics.
pub struct CoverageGate<R> {
    runner: R,
    threshold: f64,
    policy: ViolationPolicy,
}

impl<R: CoverageRunner> CoverageGate<R> {
    pub fn new(runner: R, threshold: f64, policy: ViolationPolicy) -> Self {
        Self {
            runner,
            threshold,
            policy,
        }
    }

    fn check(&self, event: &ExecutionEvent) -> Result<Decision, GateError> {
        let summary = self.runner.run(&event.working_directory)?;
        validate(&summary)?;

        let aggregate = summary.minimum();
        let (weakest, _) = summary.weakest();
        let detail = format!(
            "lines {:.1}%, statements {:.1}%, functions {:.1}%, branches {:.1}%",
            summary.lines, summary.statements, summary.functions, summary.branches
        );

        if below(aggregate, self.threshold) {
            Ok(self.policy.violation(format!(
                "Coverage {aggregate:.1}% ({weakest}) is below the {:.1}% threshold: {detail}",
                self.threshold
            )))
        } else {
            Ok(Decision::allow(format!(
                "Coverage {aggregate:.1}% meets the {:.1}% threshold",
                self.threshold
            )))
        }
    }
}

/// A runner that reports NaN or out-of-range values did not measure anything.
fn validate(summary: &CoverageSummary) -> Result<(), ToolError> {
    let values = [
        summary.lines,
        summary.statements,
        summary.functions,
        summary.branches,
    ];
    if values.iter().all(|v| v.is_finite() && (0.0..=100.0).contains(v)) {
        Ok(())
    } else {
        Err(ToolError::parse(
            "coverage",
            format!("percentages out of range: {values:?}"),
        ))
    }
}

impl<R: CoverageRunner> Validator for CoverageGate<R> {
    fn kind(&self) -> GateKind {
        GateKind::Coverage
    }

    fn applies(&self, event: &ExecutionEvent, classification: &ClassificationResult) -> bool {
        classification.domain == Domain::FileModification
            && event
                .relative_file_path()
                .is_some_and(|p| !is_test_file(&p))
    }

    fn evaluate(&self, event: &ExecutionEvent, _classification: &ClassificationResult) -> Decision {
        settle(self.kind(), self.check(event))
    }
}
