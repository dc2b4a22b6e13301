use std::path::Path;

use serde_json::Value;
use tollgate_core::errors::ToolError;
use tollgate_core::traits::{PackageRef, ScanReport, SeverityCounts, VulnerabilityScanner};
use tollgate_core::types::Severity;

use super::{run_command, split_command, stderr_tail};

const TOOL: &str = "audit command";

/// Runs a configured auditor that prints npm-audit style JSON.
///
/// Only `metadata.vulnerabilities` is read. Auditors exit non-zero when they
/// find something, so the exit status is ignored whenever stdout parses.
pub struct CommandScanner {
    command: String,
}

impl CommandScanner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// Severity counts from an npm-audit style report.
pub(crate) fn parse_audit_report(stdout: &str) -> Result<SeverityCounts, ToolError> {
    let doc: Value = serde_json::from_str(stdout.trim())
        .map_err(|e| ToolError::parse(TOOL, format!("not JSON: {e}")))?;
    let vulns = doc
        .pointer("/metadata/vulnerabilities")
        .and_then(Value::as_object)
        .ok_or_else(|| ToolError::parse(TOOL, "missing metadata.vulnerabilities"))?;

    let mut counts = SeverityCounts::default();
    for (label, n) in vulns {
        let Some(severity) = Severity::parse_label(label) else {
            continue;
        };
        let n = n.as_u64().unwrap_or(0);
        counts.add(severity, u32::try_from(n).unwrap_or(u32::MAX));
    }
    Ok(counts)
}

impl VulnerabilityScanner for CommandScanner {
    fn scan(&self, _packages: &[PackageRef], working_dir: &Path) -> Result<ScanReport, ToolError> {
        let argv = split_command(TOOL, &self.command)?;
        let output = run_command(TOOL, &argv, working_dir)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_audit_report(&stdout) {
            Ok(counts) => Ok(ScanReport {
                counts,
                findings: Vec::new(),
            }),
            Err(e) if !output.status.success() => Err(ToolError::failed(
                TOOL,
                format!("{} ({e}): {}", output.status, stderr_tail(&output)),
            )),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_npm_audit_metadata() {
        let counts = parse_audit_report(
            r#"{"auditReportVersion":2,"vulnerabilities":{},
                "metadata":{"vulnerabilities":{"info":4,"low":1,"moderate":2,"high":3,"critical":2,"total":12}}}"#,
        )
        .unwrap();
        assert_eq!(
            counts,
            SeverityCounts {
                critical: 2,
                high: 3,
                moderate: 2,
                low: 1
            }
        );
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(matches!(parse_audit_report("[]"), Err(ToolError::Parse { .. })));
        assert!(matches!(parse_audit_report("npm ERR!"), Err(ToolError::Parse { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn reads_report_from_command_stdout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("audit.json"),
            r#"{"metadata":{"vulnerabilities":{"critical":1,"high":0,"moderate":0,"low":0}}}"#,
        )
        .unwrap();
        let scanner = CommandScanner::new("cat audit.json");
        let report = scanner.scan(&[], dir.path()).unwrap();
        assert_eq!(report.counts.critical, 1);
    }
}
