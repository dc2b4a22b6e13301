use std::path::{Path, PathBuf};

use tollgate_core::baseline::{BaselineRecord, MeasurementSnapshot, MetricMap};
use tollgate_core::config::gates::{
    GateSettings, LIMIT_GAME_BYTES, LIMIT_MOBILE_BYTES, LIMIT_WEB_BYTES,
};
use tollgate_core::decision::Decision;
use tollgate_core::errors::GateError;
use tollgate_core::event::ExecutionEvent;
use tollgate_core::traits::{SizeMeasurer, SizeReport};
use tollgate_core::types::{Domain, GateKind, Platform};
use tracing::{debug, warn};

use super::decision::{exceeds, settle, ViolationPolicy};
use super::{record_history, Validator};
use crate::baseline::{BaselineBackend, BaselineStore};
use crate::classify::ClassificationResult;

pub const DOMAIN: &str = "bundle";

pub const METRIC_GZIP_BYTES: &str = "gzip_bytes";
pub const METRIC_RAW_BYTES: &str = "raw_bytes";
pub const METRIC_FILES: &str = "files";

/// Conventional output directories of the previous build, per platform.
pub fn default_dirs(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Web => &["dist", "build", "out", ".next/static"],
        Platform::Mobile => &["android/app/build/outputs", "build/app/outputs", "ios/build"],
        Platform::Game => &["Builds", "build", "export"],
        Platform::Unspecified => &[],
    }
}

/// Per-platform compressed-size ceilings, in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeLimits {
    pub web: f64,
    pub mobile: f64,
    pub game: f64,
}

impl SizeLimits {
    pub fn from_settings(settings: &GateSettings) -> Self {
        Self {
            web: settings.limit(LIMIT_WEB_BYTES, 500.0 * 1024.0),
            mobile: settings.limit(LIMIT_MOBILE_BYTES, 100.0 * 1024.0 * 1024.0),
            game: settings.limit(LIMIT_GAME_BYTES, 1024.0 * 1024.0 * 1024.0),
        }
    }

    fn for_platform(&self, platform: Platform) -> Option<f64> {
        match platform {
            Platform::Web => Some(self.web),
            Platform::Mobile => Some(self.mobile),
            Platform::Game => Some(self.game),
            Platform::Unspecified => None,
        }
    }
}

/// Pre-build check of the previous build's compressed size against a
/// per-platform ceiling.
///
/// The first in-limit measurement per platform is kept as a baseline; later
/// messages report growth against it. The verdict depends only on the ceiling.
pub struct BundleGate<M, B> {
    measurer: M,
    store: BaselineStore<B>,
    limits: SizeLimits,
    dirs: Vec<String>,
    policy: ViolationPolicy,
    state_dir: Option<PathBuf>,
}

impl<M: SizeMeasurer, B: BaselineBackend> BundleGate<M, B> {
    pub fn new(measurer: M, store: BaselineStore<B>, limits: SizeLimits, policy: ViolationPolicy) -> Self {
        Self {
            measurer,
            store,
            limits,
            dirs: Vec::new(),
            policy,
            state_dir: None,
        }
    }

    /// Replace the platform default artifact directories.
    pub fn with_dirs(mut self, dirs: Vec<String>) -> Self {
        self.dirs = dirs;
        self
    }

    /// Append every measurement to the history ledger under `state_dir`.
    pub fn with_history(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(state_dir.into());
        self
    }

    fn artifact_dirs(&self, root: &Path, platform: Platform) -> Vec<PathBuf> {
        let candidates: Vec<&str> = if self.dirs.is_empty() {
            default_dirs(platform).to_vec()
        } else {
            self.dirs.iter().map(String::as_str).collect()
        };
        candidates
            .into_iter()
            .map(|d| root.join(d))
            .filter(|p| p.is_dir())
            .collect()
    }

    fn check(&self, event: &ExecutionEvent, platform: Platform) -> Result<Decision, GateError> {
        let Some(ceiling) = self.limits.for_platform(platform) else {
            return Ok(Decision::allow(""));
        };
        let dirs = self.artifact_dirs(&event.working_directory, platform);
        if dirs.is_empty() {
            return Ok(Decision::allow(format!(
                "No previous {platform} build artifacts found; bundle size check skipped"
            )));
        }
        debug!(?dirs, "measuring build artifacts");

        let report = self.measurer.measure(&dirs)?;
        if report.files == 0 {
            return Ok(Decision::allow(format!(
                "No previous {platform} build artifacts found; bundle size check skipped"
            )));
        }

        let metrics = report_metrics(&report);
        let key = platform.as_str();
        record_history(self.state_dir.as_deref(), DOMAIN, key, &metrics);

        let size = report.compressed_bytes as f64;
        let over = exceeds(size, ceiling);
        let growth = self.growth_note(key, &metrics, over, &dirs);

        let summary = format!(
            "{platform} bundle: {} gzip ({} raw, {} files)",
            fmt_bytes(size),
            fmt_bytes(report.raw_bytes as f64),
            report.files
        );
        if over {
            Ok(self.policy.violation(format!(
                "{summary} exceeds the {} limit{growth}",
                fmt_bytes(ceiling)
            )))
        } else {
            Ok(Decision::allow(format!(
                "{summary} is within the {} limit{growth}",
                fmt_bytes(ceiling)
            )))
        }
    }

    /// Growth against the stored baseline, or bootstrap one. Store problems
    /// only cost the note.
    fn growth_note(&self, key: &str, metrics: &MetricMap, over: bool, dirs: &[PathBuf]) -> String {
        let current = metrics.get(METRIC_GZIP_BYTES).copied().unwrap_or_default();
        match self.store.read(DOMAIN, key) {
            Ok(Some(baseline)) => match baseline.metric(METRIC_GZIP_BYTES) {
                Some(base) if base > 0.0 => {
                    let pct = (current - base) * 100.0 / base;
                    format!("; {pct:+.1}% vs baseline {}", fmt_bytes(base))
                }
                _ => String::new(),
            },
            Ok(None) | Err(_) if over => String::new(),
            read => {
                if let Err(e) = read {
                    warn!(baseline = key, "replacing unreadable bundle baseline: {e}");
                }
                let source = dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let snapshot = MeasurementSnapshot::new(metrics.clone()).with_source(source);
                match self.store.write(&BaselineRecord::from_snapshot(DOMAIN, key, &snapshot)) {
                    Ok(()) => "; baseline recorded".to_string(),
                    Err(e) => {
                        warn!(baseline = key, "cannot record bundle baseline: {e}");
                        String::new()
                    }
                }
            }
        }
    }
}

fn report_metrics(report: &SizeReport) -> MetricMap {
    [
        (METRIC_GZIP_BYTES, report.compressed_bytes as f64),
        (METRIC_RAW_BYTES, report.raw_bytes as f64),
        (METRIC_FILES, report.files as f64),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Human-readable byte count (KiB/MiB/GiB, one decimal).
pub fn fmt_bytes(bytes: f64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if bytes < 1024.0 {
        return format!("{bytes:.0} B");
    }
    let mut value = bytes / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

impl<M: SizeMeasurer, B: BaselineBackend> Validator for BundleGate<M, B> {
    fn kind(&self) -> GateKind {
        GateKind::Bundle
    }

    fn applies(&self, _event: &ExecutionEvent, classification: &ClassificationResult) -> bool {
        classification.domain == Domain::BuildOrDeploy
            && classification.platform != Platform::Unspecified
    }

    fn evaluate(&self, event: &ExecutionEvent, classification: &ClassificationResult) -> Decision {
        settle(self.kind(), self.check(event, classification.platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MemoryBackend;
    use std::sync::Arc;
    use tollgate_core::baseline::DEFAULT_KEY;
    use tollgate_core::errors::ToolError;
    use tollgate_core::types::Verdict;

    struct FixedSize(Option<u64>);

    impl SizeMeasurer for FixedSize {
        fn measure(&self, _dirs: &[PathBuf]) -> Result<SizeReport, ToolError> {
            let gz = self.0.ok_or_else(|| ToolError::unavailable("gzip", "not on PATH"))?;
            Ok(SizeReport {
                files: 3,
                raw_bytes: gz * 3,
                compressed_bytes: gz,
                per_dir: Default::default(),
            })
        }
    }

    fn web_build() -> ClassificationResult {
        ClassificationResult {
            domain: Domain::BuildOrDeploy,
            platform: Platform::Web,
            rule_id: Some("build-web".into()),
        }
    }

    fn limits(web: f64) -> SizeLimits {
        SizeLimits {
            web,
            mobile: 1e9,
            game: 1e9,
        }
    }

    fn project_with_dist() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        dir
    }

    fn gate(size: Option<u64>, web_limit: f64, enforce: bool) -> BundleGate<FixedSize, Arc<MemoryBackend>> {
        BundleGate::new(
            FixedSize(size),
            BaselineStore::new(Arc::new(MemoryBackend::new())),
            limits(web_limit),
            ViolationPolicy { enforce },
        )
    }

    #[test]
    fn exactly_at_limit_is_not_exceeded() {
        let project = project_with_dist();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let d = gate(Some(512_000), 512_000.0, true).evaluate(&event, &web_build());
        assert_eq!(d.verdict, Verdict::Allow);
        assert!(d.message.contains("within"));
    }

    #[test]
    fn over_limit_warns_in_advisory_mode() {
        let project = project_with_dist();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let d = gate(Some(512_001), 512_000.0, false).evaluate(&event, &web_build());
        assert_eq!(d.verdict, Verdict::Warn);
        assert!(d.message.contains("exceeds the 500.0 KiB limit"), "{}", d.message);
    }

    #[test]
    fn over_limit_denies_when_enforced() {
        let project = project_with_dist();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let d = gate(Some(600_000), 512_000.0, true).evaluate(&event, &web_build());
        assert_eq!(d.verdict, Verdict::Deny);
        assert_eq!(d.gate, Some(GateKind::Bundle));
    }

    #[test]
    fn no_artifacts_allows() {
        let project = tempfile::tempdir().unwrap();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let d = gate(Some(10_000_000), 1.0, true).evaluate(&event, &web_build());
        assert_eq!(d.verdict, Verdict::Allow);
        assert!(d.message.contains("No previous web build artifacts"));
    }

    #[test]
    fn measurer_failure_allows() {
        let project = project_with_dist();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let d = gate(None, 1.0, true).evaluate(&event, &web_build());
        assert_eq!(d.verdict, Verdict::Allow);
    }

    #[test]
    fn first_measurement_becomes_baseline_then_growth_is_reported() {
        let project = project_with_dist();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let backend = Arc::new(MemoryBackend::new());

        let first = BundleGate::new(
            FixedSize(Some(100_000)),
            BaselineStore::new(Arc::clone(&backend)),
            limits(512_000.0),
            ViolationPolicy::advisory(),
        );
        let d = first.evaluate(&event, &web_build());
        assert!(d.message.contains("baseline recorded"));

        let store = BaselineStore::new(Arc::clone(&backend));
        let baseline = store.read(DOMAIN, "web").unwrap().unwrap();
        assert_eq!(baseline.metric(METRIC_GZIP_BYTES), Some(100_000.0));
        assert!(store.read(DOMAIN, DEFAULT_KEY).unwrap().is_none());

        let second = BundleGate::new(
            FixedSize(Some(110_000)),
            BaselineStore::new(Arc::clone(&backend)),
            limits(512_000.0),
            ViolationPolicy::advisory(),
        );
        let d = second.evaluate(&event, &web_build());
        assert_eq!(d.verdict, Verdict::Allow);
        assert!(d.message.contains("+10.0% vs baseline"), "{}", d.message);
        // The baseline is not moved by ordinary runs.
        let baseline = store.read(DOMAIN, "web").unwrap().unwrap();
        assert_eq!(baseline.metric(METRIC_GZIP_BYTES), Some(100_000.0));
    }

    #[test]
    fn over_limit_measurement_is_not_a_baseline() {
        let project = project_with_dist();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let backend = Arc::new(MemoryBackend::new());
        let g = BundleGate::new(
            FixedSize(Some(600_000)),
            BaselineStore::new(Arc::clone(&backend)),
            limits(512_000.0),
            ViolationPolicy::advisory(),
        );
        g.evaluate(&event, &web_build());
        assert!(BaselineStore::new(backend).read(DOMAIN, "web").unwrap().is_none());
    }

    #[test]
    fn configured_dirs_replace_defaults() {
        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(project.path().join("public/assets")).unwrap();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let g = gate(Some(1_000), 512_000.0, true).with_dirs(vec!["public/assets".into()]);
        let d = g.evaluate(&event, &web_build());
        assert!(d.message.contains("web bundle"), "{}", d.message);
    }

    #[test]
    fn history_is_appended() {
        let project = project_with_dist();
        let state = tempfile::tempdir().unwrap();
        let event = ExecutionEvent::shell("npm run build", project.path());
        let g = gate(Some(1_000), 512_000.0, true).with_history(state.path());
        g.evaluate(&event, &web_build());
        g.evaluate(&event, &web_build());
        let path = crate::state::history::history_path(state.path(), DOMAIN);
        assert_eq!(crate::state::history::verify_history(&path).unwrap(), 2);
    }

    #[test]
    fn unspecified_platform_does_not_apply() {
        let g = gate(Some(1), 1.0, true);
        let event = ExecutionEvent::shell("cargo build", "/work");
        let class = ClassificationResult {
            domain: Domain::BuildOrDeploy,
            ..ClassificationResult::none()
        };
        assert!(!g.applies(&event, &class));
        assert!(g.applies(&event, &web_build()));
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(fmt_bytes(512.0), "512 B");
        assert_eq!(fmt_bytes(512_000.0), "500.0 KiB");
        assert_eq!(fmt_bytes(100.0 * 1024.0 * 1024.0), "100.0 MiB");
    }
}
