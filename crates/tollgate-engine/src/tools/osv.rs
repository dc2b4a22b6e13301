use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tollgate_core::errors::ToolError;
use tollgate_core::traits::{Finding, PackageRef, ScanReport, VulnerabilityScanner};
use tollgate_core::types::Severity;
use tracing::debug;

pub const OSV_QUERY_URL: &str = "https://api.osv.dev/v1/query";

const TOOL: &str = "osv.dev";
const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvVuln>,
}

#[derive(Debug, Deserialize)]
struct OsvVuln {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    database_specific: Option<Value>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
}

#[derive(Debug, Deserialize)]
struct OsvAffected {
    #[serde(default)]
    ranges: Vec<OsvRange>,
    #[serde(default)]
    database_specific: Option<Value>,
    #[serde(default)]
    ecosystem_specific: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OsvRange {
    #[serde(default)]
    events: Vec<Value>,
}

fn severity_field(v: Option<&Value>) -> Option<Severity> {
    v?.get("severity")?.as_str().and_then(Severity::parse_label)
}

impl OsvVuln {
    /// Advisory-level label first, then per-package labels. Unlabelled
    /// advisories count as moderate.
    fn severity(&self) -> Severity {
        severity_field(self.database_specific.as_ref())
            .or_else(|| {
                self.affected.iter().find_map(|a| {
                    severity_field(a.database_specific.as_ref())
                        .or_else(|| severity_field(a.ecosystem_specific.as_ref()))
                })
            })
            .unwrap_or(Severity::Moderate)
    }

    /// True if some affected range has no fix event after its last
    /// introduction, i.e. the latest release is still affected.
    fn is_unfixed(&self) -> bool {
        self.affected.iter().flat_map(|a| &a.ranges).any(|r| {
            r.events
                .last()
                .is_some_and(|e| e.get("introduced").is_some())
        })
    }
}

/// Convert a query response into findings for `package`.
///
/// A versioned query is already filtered by the database. A versionless one
/// would install the latest release, so only unfixed advisories count.
pub(crate) fn findings_from_response(package: &PackageRef, response: &OsvResponse) -> Vec<Finding> {
    let mut seen = BTreeSet::new();
    response
        .vulns
        .iter()
        .filter(|v| package.version.is_some() || v.is_unfixed())
        .filter(|v| seen.insert(v.id.clone()))
        .map(|v| Finding {
            package: package.to_string(),
            id: v.id.clone(),
            severity: v.severity(),
            summary: v.summary.clone(),
        })
        .collect()
}

/// Queries the OSV database, one request per package.
pub struct OsvScanner {
    agent: ureq::Agent,
    url: String,
}

impl OsvScanner {
    pub fn new() -> Self {
        Self::with_url(OSV_QUERY_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
            url: url.into(),
        }
    }

    fn query(&self, package: &PackageRef) -> Result<OsvResponse, ToolError> {
        let mut body = serde_json::json!({
            "package": {
                "name": package.name,
                "ecosystem": package.ecosystem.osv_name(),
            }
        });
        if let Some(version) = &package.version {
            body["version"] = Value::String(version.clone());
        }

        let response = self.agent.post(&self.url).send_json(body).map_err(|e| match e {
            ureq::Error::Status(code, _) => ToolError::failed(TOOL, format!("HTTP {code} for {package}")),
            ureq::Error::Transport(t) => ToolError::unavailable(TOOL, t.to_string()),
        })?;
        response
            .into_json::<OsvResponse>()
            .map_err(|e| ToolError::parse(TOOL, e.to_string()))
    }
}

impl Default for OsvScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl VulnerabilityScanner for OsvScanner {
    fn scan(&self, packages: &[PackageRef], _working_dir: &Path) -> Result<ScanReport, ToolError> {
        let mut findings = Vec::new();
        for package in packages {
            let response = self.query(package)?;
            let found = findings_from_response(package, &response);
            debug!(%package, advisories = found.len(), "osv query");
            findings.extend(found);
        }
        Ok(ScanReport::from_findings(findings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::traits::Ecosystem;

    fn pkg(version: Option<&str>) -> PackageRef {
        PackageRef {
            ecosystem: Ecosystem::Npm,
            name: "lodash".into(),
            version: version.map(str::to_string),
        }
    }

    fn response(json: &str) -> OsvResponse {
        serde_json::from_str(json).unwrap()
    }

    const FIXTURE: &str = r#"{"vulns":[
        {"id":"GHSA-fixed","summary":"old bug",
         "database_specific":{"severity":"CRITICAL"},
         "affected":[{"ranges":[{"type":"SEMVER","events":[{"introduced":"0"},{"fixed":"4.17.21"}]}]}]},
        {"id":"GHSA-open","summary":"still open",
         "database_specific":{"severity":"HIGH"},
         "affected":[{"ranges":[{"type":"SEMVER","events":[{"introduced":"0"}]}]}]},
        {"id":"OSV-nolabel",
         "affected":[{"ranges":[{"type":"SEMVER","events":[{"introduced":"1.0.0"}]}]}]},
        {"id":"GHSA-open","database_specific":{"severity":"HIGH"},"affected":[]}
    ]}"#;

    #[test]
    fn versioned_query_counts_every_advisory_once() {
        let findings = findings_from_response(&pkg(Some("4.17.20")), &response(FIXTURE));
        let report = ScanReport::from_findings(findings);
        assert_eq!(report.counts.critical, 1);
        assert_eq!(report.counts.high, 1);
        assert_eq!(report.counts.moderate, 1);
        assert_eq!(report.findings[0].package, "lodash@4.17.20");
    }

    #[test]
    fn versionless_query_ignores_fixed_advisories() {
        let findings = findings_from_response(&pkg(None), &response(FIXTURE));
        let ids: Vec<_> = findings.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["GHSA-open", "OSV-nolabel"]);
    }

    #[test]
    fn unknown_severity_is_moderate() {
        let findings = findings_from_response(&pkg(Some("1.0.0")), &response(FIXTURE));
        let unlabelled = findings.iter().find(|f| f.id == "OSV-nolabel").unwrap();
        assert_eq!(unlabelled.severity, Severity::Moderate);
    }

    #[test]
    fn per_package_severity_is_used_when_advisory_has_none() {
        let r = response(
            r#"{"vulns":[{"id":"RUSTSEC-1","affected":[{"ecosystem_specific":{"severity":"low"},
                "ranges":[{"events":[{"introduced":"0"}]}]}]}]}"#,
        );
        let findings = findings_from_response(&pkg(None), &r);
        assert_eq!(findings[0].severity, Severity::Low);
    }

    #[test]
    fn empty_response_has_no_findings() {
        assert!(findings_from_response(&pkg(None), &response("{}")).is_empty());
    }

    #[test]
    fn unreachable_database_is_unavailable() {
        // Nothing listens on port 9 (discard) on CI hosts.
        let scanner = OsvScanner::with_url("http://127.0.0.1:9/v1/query");
        let err = scanner
            .scan(&[pkg(None)], Path::new("."))
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable { .. }), "{err}");
    }
}
