use tollgate_core::decision::Decision;
use tollgate_core::errors::GateError;
use tollgate_core::event::ExecutionEvent;
use tollgate_core::traits::{ScanReport, VulnerabilityScanner};
use tollgate_core::types::{Domain, GateKind};
use tracing::debug;

use super::decision::{settle, ViolationPolicy};
use super::packages::extract_packages;
use super::Validator;
use crate::classify::ClassificationResult;

/// Advisories listed in a message before the rest are summarized.
const MAX_LISTED: usize = 5;

/// Point-in-time vulnerability check for packages named on an install
/// command. Keeps no baseline.
pub struct DependencyGate<S> {
    scanner: S,
    policy: ViolationPolicy,
}

impl<S: VulnerabilityScanner> DependencyGate<S> {
    pub fn new(scanner: S, policy: ViolationPolicy) -> Self {
        Self { scanner, policy }
    }

    fn check(&self, event: &ExecutionEvent) -> Result<Decision, GateError> {
        let Some(command) = event.command() else {
            return Ok(Decision::allow(""));
        };
        let packages = extract_packages(command);
        if packages.is_empty() {
            return Ok(Decision::allow("No packages named; dependency scan skipped"));
        }
        debug!(count = packages.len(), "scanning packages");

        let report = self.scanner.scan(&packages, &event.working_directory)?;
        let names: Vec<String> = packages.iter().map(ToString::to_string).collect();
        Ok(self.decide(&names.join(", "), &report))
    }

    fn decide(&self, names: &str, report: &ScanReport) -> Decision {
        let counts = report.counts;
        if counts.critical > 0 || counts.high > 0 {
            self.policy.violation(format!(
                "Vulnerabilities found in {names}: {counts}{}",
                listing(report)
            ))
        } else if counts.moderate > 0 {
            Decision::warn(format!(
                "Moderate vulnerabilities found in {names}: {counts}{}",
                listing(report)
            ))
        } else if counts.low > 0 {
            Decision::allow(format!("Only low-severity advisories for {names}: {counts}"))
        } else {
            Decision::allow(format!("No known vulnerabilities in {names}"))
        }
    }
}

/// Most severe advisories first, one per line.
fn listing(report: &ScanReport) -> String {
    let mut findings: Vec<_> = report.findings.iter().collect();
    findings.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));

    let mut out = String::new();
    for f in findings.iter().take(MAX_LISTED) {
        out.push_str(&format!("\n  - {} [{}] {}", f.id, f.severity.label(), f.package));
        if let Some(summary) = &f.summary {
            out.push_str(&format!(": {summary}"));
        }
    }
    if findings.len() > MAX_LISTED {
        out.push_str(&format!("\n  ... and {} more", findings.len() - MAX_LISTED));
    }
    out
}

impl<S: VulnerabilityScanner> Validator for DependencyGate<S> {
    fn kind(&self) -> GateKind {
        GateKind::Dependency
    }

    fn applies(&self, _event: &ExecutionEvent, classification: &ClassificationResult) -> bool {
        classification.domain == Domain::DependencyInstall
    }

    fn evaluate(&self, event: &ExecutionEvent, _classification: &ClassificationResult) -> Decision {
        settle(self.kind(), self.check(event))
    }
}
