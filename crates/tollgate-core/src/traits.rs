use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::baseline::MeasurementSnapshot;
use crate::errors::ToolError;
use crate::types::Severity;

/// Package ecosystems the dependency gate can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ecosystem {
    Npm,
    PyPI,
    CratesIo,
    RubyGems,
    Go,
    Packagist,
    Pub,
}

impl Ecosystem {
    /// Ecosystem name as used by the OSV database.
    pub fn osv_name(self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::PyPI => "PyPI",
            Ecosystem::CratesIo => "crates.io",
            Ecosystem::RubyGems => "RubyGems",
            Ecosystem::Go => "Go",
            Ecosystem::Packagist => "Packagist",
            Ecosystem::Pub => "Pub",
        }
    }
}

/// A package named on an install command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: Option<String>,
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{v}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One advisory affecting a requested package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub package: String,
    pub id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Findings counted per severity bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub high: u32,
    pub moderate: u32,
    pub low: u32,
}

impl SeverityCounts {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for f in findings {
            counts.add(f.severity, 1);
        }
        counts
    }

    pub fn add(&mut self, severity: Severity, n: u32) {
        match severity {
            Severity::Critical => self.critical = self.critical.saturating_add(n),
            Severity::High => self.high = self.high.saturating_add(n),
            Severity::Moderate => self.moderate = self.moderate.saturating_add(n),
            Severity::Low => self.low = self.low.saturating_add(n),
        }
    }

    /// Saturates at `u32::MAX`; scanner reports are untrusted input.
    pub fn total(&self) -> u32 {
        self.critical
            .saturating_add(self.high)
            .saturating_add(self.moderate)
            .saturating_add(self.low)
    }
}

impl fmt::Display for SeverityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Critical: {} | High: {} | Moderate: {} | Low: {}",
            self.critical, self.high, self.moderate, self.low
        )
    }
}

/// Result of a vulnerability scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub counts: SeverityCounts,
    /// Individual advisories when the scanner reports them.
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl ScanReport {
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        Self {
            counts: SeverityCounts::from_findings(&findings),
            findings,
        }
    }
}

/// The four coverage percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub lines: f64,
    pub statements: f64,
    pub functions: f64,
    pub branches: f64,
}

impl CoverageSummary {
    /// Strictest aggregate: the minimum of the four metrics.
    pub fn minimum(&self) -> f64 {
        self.lines
            .min(self.statements)
            .min(self.functions)
            .min(self.branches)
    }

    /// Name and value of the weakest metric.
    pub fn weakest(&self) -> (&'static str, f64) {
        let mut weakest = ("lines", self.lines);
        for (name, v) in [
            ("statements", self.statements),
            ("functions", self.functions),
            ("branches", self.branches),
        ] {
            if v < weakest.1 {
                weakest = (name, v);
            }
        }
        weakest
    }
}

/// Size of built artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReport {
    pub files: u64,
    pub raw_bytes: u64,
    pub compressed_bytes: u64,
    /// Per-directory compressed totals.
    #[serde(default)]
    pub per_dir: BTreeMap<String, u64>,
}

/// "Given package names, return severity counts."
pub trait VulnerabilityScanner {
    fn scan(&self, packages: &[PackageRef], working_dir: &Path) -> Result<ScanReport, ToolError>;
}

/// "Given a test run, return four percentages."
pub trait CoverageRunner {
    fn run(&self, working_dir: &Path) -> Result<CoverageSummary, ToolError>;
}

/// "Given a URL, return N named metrics."
pub trait PerformanceProfiler {
    fn profile(&self, url: &str, working_dir: &Path) -> Result<MeasurementSnapshot, ToolError>;
}

/// "Given a directory, return a byte size."
pub trait SizeMeasurer {
    fn measure(&self, dirs: &[PathBuf]) -> Result<SizeReport, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_minimum_is_strictest() {
        let s = CoverageSummary {
            lines: 72.5,
            statements: 70.3,
            functions: 68.9,
            branches: 65.2,
        };
        assert_eq!(s.minimum(), 65.2);
        assert_eq!(s.weakest(), ("branches", 65.2));
    }

    #[test]
    fn counts_from_findings() {
        let findings = vec![
            Finding {
                package: "a".into(),
                id: "GHSA-1".into(),
                severity: Severity::Critical,
                summary: None,
            },
            Finding {
                package: "a".into(),
                id: "GHSA-2".into(),
                severity: Severity::High,
                summary: None,
            },
            Finding {
                package: "b".into(),
                id: "GHSA-3".into(),
                severity: Severity::High,
                summary: None,
            },
        ];
        let report = ScanReport::from_findings(findings);
        assert_eq!(report.counts.critical, 1);
        assert_eq!(report.counts.high, 2);
        assert_eq!(report.counts.total(), 3);
        assert_eq!(
            report.counts.to_string(),
            "Critical: 1 | High: 2 | Moderate: 0 | Low: 0"
        );
    }

    #[test]
    fn counts_saturate() {
        let mut counts = SeverityCounts {
            critical: u32::MAX,
            ..SeverityCounts::default()
        };
        counts.add(Severity::Critical, 1);
        counts.add(Severity::High, 1);
        assert_eq!(counts.critical, u32::MAX);
        assert_eq!(counts.total(), u32::MAX);
    }

    #[test]
    fn package_ref_display() {
        let p = PackageRef {
            ecosystem: Ecosystem::Npm,
            name: "@types/node".into(),
            version: Some("20.1.0".into()),
        };
        assert_eq!(p.to_string(), "@types/node@20.1.0");
    }
}
