use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;
use tollgate_core::errors::ToolError;
use tollgate_core::traits::{CoverageRunner, CoverageSummary};

use super::{run_command, split_command, stderr_tail};

const TOOL: &str = "coverage";

pub const DEFAULT_COMMAND: &str =
    "npx --no-install jest --coverage --coverageReporters=json-summary --silent";
pub const DEFAULT_SUMMARY: &str = "coverage/coverage-summary.json";

/// Runs the test suite with coverage, then reads an istanbul
/// `json-summary` report.
pub struct SummaryCoverageRunner {
    command: String,
    summary: PathBuf,
}

impl SummaryCoverageRunner {
    pub fn new(command: Option<&str>) -> Self {
        Self {
            command: command.unwrap_or(DEFAULT_COMMAND).to_string(),
            summary: PathBuf::from(DEFAULT_SUMMARY),
        }
    }
}

impl Default for SummaryCoverageRunner {
    fn default() -> Self {
        Self::new(None)
    }
}

/// `total.{lines,statements,functions,branches}.pct` from a summary report.
pub(crate) fn parse_summary(content: &str) -> Result<CoverageSummary, ToolError> {
    let doc: Value =
        serde_json::from_str(content).map_err(|e| ToolError::parse(TOOL, e.to_string()))?;
    let pct = |metric: &str| {
        doc.pointer(&format!("/total/{metric}/pct"))
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::parse(TOOL, format!("missing numeric total.{metric}.pct")))
    };
    Ok(CoverageSummary {
        lines: pct("lines")?,
        statements: pct("statements")?,
        functions: pct("functions")?,
        branches: pct("branches")?,
    })
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl CoverageRunner for SummaryCoverageRunner {
    fn run(&self, working_dir: &Path) -> Result<CoverageSummary, ToolError> {
        let argv = split_command(TOOL, &self.command)?;
        let summary_path = working_dir.join(&self.summary);
        let before = mtime(&summary_path);
        let output = run_command(TOOL, &argv, working_dir)?;

        // Failing tests exit non-zero but still write a fresh summary.
        let fresh = mtime(&summary_path).is_some_and(|t| Some(t) != before);
        if !output.status.success() && !fresh {
            return Err(ToolError::failed(
                TOOL,
                format!("{}: {}", output.status, stderr_tail(&output)),
            ));
        }

        let content = std::fs::read_to_string(&summary_path).map_err(|e| {
            ToolError::failed(TOOL, format!("no report at {}: {e}", summary_path.display()))
        })?;
        parse_summary(&content)
    }
}
