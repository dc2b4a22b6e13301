use std::path::Path;

use serde_json::Value;
use tollgate_core::baseline::{MeasurementSnapshot, MetricMap};
use tollgate_core::errors::ToolError;
use tollgate_core::traits::PerformanceProfiler;

use super::{run_command, split_command, stderr_tail};

const TOOL: &str = "lighthouse";
const URL_PLACEHOLDER: &str = "{url}";

/// Lighthouse audit id -> metric name.
const AUDITS: &[(&str, &str)] = &[
    ("first-contentful-paint", "fcp_ms"),
    ("largest-contentful-paint", "lcp_ms"),
    ("total-blocking-time", "tbt_ms"),
    ("cumulative-layout-shift", "cls"),
    ("speed-index", "speed_index_ms"),
    ("interactive", "tti_ms"),
];

/// Profiles a URL with Lighthouse, or with a configured command that prints
/// a Lighthouse JSON report. `{url}` in the command is replaced by the URL.
pub struct LighthouseProfiler {
    command: Option<String>,
}

impl LighthouseProfiler {
    pub fn new(command: Option<&str>) -> Self {
        Self {
            command: command.map(str::to_string),
        }
    }

    fn argv(&self, url: &str) -> Result<Vec<String>, ToolError> {
        match &self.command {
            Some(cmd) => Ok(split_command(TOOL, cmd)?
                .into_iter()
                .map(|arg| arg.replace(URL_PLACEHOLDER, url))
                .collect()),
            None => Ok(vec![
                "lighthouse".to_string(),
                url.to_string(),
                "--output=json".to_string(),
                "--quiet".to_string(),
                "--chrome-flags=--headless".to_string(),
            ]),
        }
    }
}

impl Default for LighthouseProfiler {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Score (0-100) and audit numeric values from a Lighthouse report.
pub(crate) fn parse_report(content: &str) -> Result<MetricMap, ToolError> {
    let report: Value = serde_json::from_str(content.trim())
        .map_err(|e| ToolError::parse(TOOL, format!("not JSON: {e}")))?;

    let mut metrics = MetricMap::new();
    if let Some(score) = report
        .pointer("/categories/performance/score")
        .and_then(Value::as_f64)
    {
        metrics.insert("performance_score".to_string(), (score * 100.0).round());
    }
    for (audit, metric) in AUDITS {
        if let Some(v) = report
            .pointer(&format!("/audits/{audit}/numericValue"))
            .and_then(Value::as_f64)
        {
            metrics.insert(metric.to_string(), v);
        }
    }

    if metrics.is_empty() {
        return Err(ToolError::parse(TOOL, "report has no performance metrics"));
    }
    Ok(metrics)
}

impl PerformanceProfiler for LighthouseProfiler {
    fn profile(&self, url: &str, working_dir: &Path) -> Result<MeasurementSnapshot, ToolError> {
        let argv = self.argv(url)?;
        let output = run_command(TOOL, &argv, working_dir)?;
        if !output.status.success() {
            return Err(ToolError::failed(
                TOOL,
                format!("{}: {}", output.status, stderr_tail(&output)),
            ));
        }
        let metrics = parse_report(&String::from_utf8_lossy(&output.stdout))?;
        Ok(MeasurementSnapshot::new(metrics).with_source(url))
    }
}
