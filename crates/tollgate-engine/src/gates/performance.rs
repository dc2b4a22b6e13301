use std::path::PathBuf;

use tollgate_core::baseline::{BaselineRecord, MetricMap, DEFAULT_KEY};
use tollgate_core::config::gates::{
    GateSettings, LIMIT_LAYOUT_SHIFT_PCT, LIMIT_SCORE_DROP, LIMIT_TIMING_PCT,
};
use tollgate_core::decision::{fmt_number, Decision, MetricDelta, RegressionReport};
use tollgate_core::errors::{GateError, ToolError};
use tollgate_core::event::ExecutionEvent;
use tollgate_core::traits::PerformanceProfiler;
use tollgate_core::types::{Domain, GateKind, Platform};
use tracing::{info, warn};

use super::decision::{exceeds, settle};
use super::{record_history, Validator};
use crate::baseline::{BaselineBackend, BaselineStore};
use crate::classify::ClassificationResult;
use crate::tools::endpoint::Endpoint;

pub const DOMAIN: &str = "performance";

pub const METRIC_SCORE: &str = "performance_score";
pub const METRIC_CLS: &str = "cls";

/// Per-metric regression margins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerfThresholds {
    /// Absolute drop of the 0-100 score, in points.
    pub score_drop_points: f64,
    /// Relative increase of timing metrics, in percent.
    pub timing_increase_pct: f64,
    /// Relative increase of cumulative layout shift, in percent.
    pub layout_shift_increase_pct: f64,
}

impl Default for PerfThresholds {
    fn default() -> Self {
        Self {
            score_drop_points: 5.0,
            timing_increase_pct: 10.0,
            layout_shift_increase_pct: 10.0,
        }
    }
}

impl PerfThresholds {
    pub fn from_settings(settings: &GateSettings) -> Self {
        let d = Self::default();
        Self {
            score_drop_points: settings.limit(LIMIT_SCORE_DROP, d.score_drop_points),
            timing_increase_pct: settings.limit(LIMIT_TIMING_PCT, d.timing_increase_pct),
            layout_shift_increase_pct: settings
                .limit(LIMIT_LAYOUT_SHIFT_PCT, d.layout_shift_increase_pct),
        }
    }
}

/// Deltas are compared at a millionth of a unit so float noise cannot push
/// a value that sits exactly on a threshold over it.
const DELTA_SCALE: f64 = 1e6;

fn settle_noise(v: f64) -> f64 {
    (v * DELTA_SCALE).round() / DELTA_SCALE
}

/// Relative change in percent. Zero baselines have no meaningful ratio.
fn percent_change(baseline: f64, current: f64) -> Option<f64> {
    (baseline != 0.0).then(|| settle_noise((current - baseline) * 100.0 / baseline))
}

/// Compare a measurement against a baseline, metric by metric.
///
/// Only metrics present in both maps are compared. Higher is better for the
/// score and worse for everything else.
pub fn compare(baseline: &MetricMap, current: &MetricMap, t: &PerfThresholds) -> RegressionReport {
    let deltas = current
        .iter()
        .filter_map(|(metric, &now)| {
            let before = *baseline.get(metric)?;
            let pct = percent_change(before, now);
            let threshold_exceeded = match metric.as_str() {
                METRIC_SCORE => exceeds(settle_noise(before - now), t.score_drop_points),
                METRIC_CLS => pct.is_some_and(|p| exceeds(p, t.layout_shift_increase_pct)),
                _ => pct.is_some_and(|p| exceeds(p, t.timing_increase_pct)),
            };
            Some(MetricDelta {
                metric: metric.clone(),
                baseline: before,
                current: now,
                percent_delta: pct,
                threshold_exceeded,
            })
        })
        .collect();
    RegressionReport { deltas }
}

/// Regression check of a local web endpoint against its first measurement.
///
/// Warns, never denies. The baseline is written once, on the first
/// successful measurement, and is only replaced by an explicit reset.
pub struct PerformanceGate<P, B> {
    profiler: P,
    store: BaselineStore<B>,
    thresholds: PerfThresholds,
    endpoint: Endpoint,
    state_dir: Option<PathBuf>,
}

impl<P: PerformanceProfiler, B: BaselineBackend> PerformanceGate<P, B> {
    pub fn new(profiler: P, store: BaselineStore<B>, thresholds: PerfThresholds, endpoint: Endpoint) -> Self {
        Self {
            profiler,
            store,
            thresholds,
            endpoint,
            state_dir: None,
        }
    }

    pub fn with_history(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(state_dir.into());
        self
    }

    pub fn store(&self) -> &BaselineStore<B> {
        &self.store
    }

    fn check(&self, event: &ExecutionEvent) -> Result<Decision, GateError> {
        let url = self
            .endpoint
            .resolve()
            .ok_or_else(|| GateError::NoEndpoint(self.endpoint.describe()))?;

        let snapshot = self.profiler.profile(&url, &event.working_directory)?;
        if snapshot.metrics.is_empty() {
            return Err(ToolError::parse("profiler", "no metrics in report").into());
        }
        record_history(self.state_dir.as_deref(), DOMAIN, DEFAULT_KEY, &snapshot.metrics);

        let baseline = match self.store.read(DOMAIN, DEFAULT_KEY) {
            Ok(found) => found,
            Err(e) => {
                warn!("treating unreadable performance baseline as missing: {e}");
                None
            }
        };

        let Some(baseline) = baseline else {
            let record = BaselineRecord::from_snapshot(DOMAIN, DEFAULT_KEY, &snapshot);
            self.store.write(&record)?;
            info!(%url, "performance baseline recorded");
            return Ok(Decision::allow(format!(
                "Performance baseline recorded for {url}: {}",
                describe(&snapshot.metrics)
            )));
        };

        let report = compare(&baseline.metrics, &snapshot.metrics, &self.thresholds);
        if report.has_regressions() {
            let lines: Vec<String> = report.regressions().map(|d| format!("  {d}")).collect();
            Ok(Decision::warn(format!(
                "Performance regression on {url} against the baseline from {}:\n{}",
                baseline.created_at.format("%Y-%m-%d %H:%M UTC"),
                lines.join("\n")
            ))
            .with_report(report))
        } else {
            Ok(Decision::allow(format!(
                "Performance on {url} is within thresholds ({} metrics compared)",
                report.deltas.len()
            ))
            .with_report(report))
        }
    }
}

fn describe(metrics: &MetricMap) -> String {
    metrics
        .iter()
        .map(|(k, v)| format!("{k} {}", fmt_number(*v)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl<P: PerformanceProfiler, B: BaselineBackend> Validator for PerformanceGate<P, B> {
    fn kind(&self) -> GateKind {
        GateKind::Performance
    }

    fn applies(&self, _event: &ExecutionEvent, classification: &ClassificationResult) -> bool {
        classification.domain == Domain::BuildOrDeploy && classification.platform == Platform::Web
    }

    fn evaluate(&self, event: &ExecutionEvent, _classification: &ClassificationResult) -> Decision {
        settle(self.kind(), self.check(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MemoryBackend;
    use std::cell::RefCell;
    use std::path::Path;
    use std::sync::Arc;
    use tollgate_core::baseline::MeasurementSnapshot;
    use tollgate_core::types::Verdict;

    /// Returns queued measurements in order; an empty queue means the tool is missing.
    struct ScriptedProfiler(RefCell<Vec<MetricMap>>);

    impl ScriptedProfiler {
        fn new(runs: Vec<MetricMap>) -> Self {
            Self(RefCell::new(runs))
        }
    }

    impl PerformanceProfiler for ScriptedProfiler {
        fn profile(&self, url: &str, _dir: &Path) -> Result<MeasurementSnapshot, ToolError> {
            let mut runs = self.0.borrow_mut();
            if runs.is_empty() {
                return Err(ToolError::unavailable("lighthouse", "not on PATH"));
            }
            Ok(MeasurementSnapshot::new(runs.remove(0)).with_source(url))
        }
    }

    fn metrics(pairs: &[(&str, f64)]) -> MetricMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn web_build() -> ClassificationResult {
        ClassificationResult {
            domain: Domain::BuildOrDeploy,
            platform: Platform::Web,
            rule_id: None,
        }
    }

    fn gate(runs: Vec<MetricMap>, backend: &Arc<MemoryBackend>) -> PerformanceGate<ScriptedProfiler, Arc<MemoryBackend>> {
        PerformanceGate::new(
            ScriptedProfiler::new(runs),
            BaselineStore::new(Arc::clone(backend)),
            PerfThresholds::default(),
            Endpoint::Fixed("http://localhost:3000".into()),
        )
    }

    fn build_event() -> ExecutionEvent {
        ExecutionEvent::shell("npm run build", "/work")
    }

    #[test]
    fn first_run_bootstraps_then_second_run_warns() {
        let backend = Arc::new(MemoryBackend::new());
        let g = gate(
            vec![
                metrics(&[("performance_score", 92.0), ("lcp_ms", 2400.0)]),
                metrics(&[("performance_score", 85.0), ("lcp_ms", 2880.0)]),
            ],
            &backend,
        );

        let first = g.evaluate(&build_event(), &web_build());
        assert_eq!(first.verdict, Verdict::Allow);
        let baseline = g.store().read(DOMAIN, DEFAULT_KEY).unwrap().unwrap();
        assert_eq!(
            baseline.metrics,
            metrics(&[("performance_score", 92.0), ("lcp_ms", 2400.0)])
        );

        let second = g.evaluate(&build_event(), &web_build());
        assert_eq!(second.verdict, Verdict::Warn);
        assert!(
            second.message.contains("lcp_ms: 2400 -> 2880 (+20.0%)"),
            "{}",
            second.message
        );
        let report = second.report.unwrap();
        let lcp = report.deltas.iter().find(|d| d.metric == "lcp_ms").unwrap();
        assert_eq!(lcp.baseline, 2400.0);
        assert_eq!(lcp.current, 2880.0);
        assert!(lcp.threshold_exceeded);

        // The regressing run did not touch the baseline.
        assert_eq!(g.store().read(DOMAIN, DEFAULT_KEY).unwrap().unwrap(), baseline);
    }

    #[test]
    fn identical_measurements_are_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let m = metrics(&[("performance_score", 90.0), ("lcp_ms", 2000.0), ("cls", 0.05)]);
        let g = gate(vec![m.clone(), m.clone(), m], &backend);

        g.evaluate(&build_event(), &web_build());
        let a = g.evaluate(&build_event(), &web_build());
        let b = g.evaluate(&build_event(), &web_build());
        assert_eq!(a.verdict, Verdict::Allow);
        assert_eq!(a.report, b.report);
        assert_eq!(a.report.unwrap().regressions().count(), 0);
    }

    #[test]
    fn unavailable_profiler_allows_without_baseline() {
        let backend = Arc::new(MemoryBackend::new());
        let g = gate(Vec::new(), &backend);
        let d = g.evaluate(&build_event(), &web_build());
        assert_eq!(d.verdict, Verdict::Allow);
        assert!(g.store().read(DOMAIN, DEFAULT_KEY).unwrap().is_none());
    }

    #[test]
    fn corrupt_baseline_is_replaced() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put(DOMAIN, b"garbage").unwrap();
        let g = gate(vec![metrics(&[("lcp_ms", 1000.0)])], &backend);
        let d = g.evaluate(&build_event(), &web_build());
        assert_eq!(d.verdict, Verdict::Allow);
        assert!(d.message.contains("baseline recorded"));
        assert!(g.store().read(DOMAIN, DEFAULT_KEY).unwrap().is_some());
    }

    #[test]
    fn unreachable_endpoint_allows() {
        let backend = Arc::new(MemoryBackend::new());
        let g = PerformanceGate::new(
            ScriptedProfiler::new(vec![metrics(&[("lcp_ms", 1.0)])]),
            BaselineStore::new(Arc::clone(&backend)),
            PerfThresholds::default(),
            Endpoint::Probe {
                host: "127.0.0.1".into(),
                ports: Vec::new(),
            },
        );
        let d = g.evaluate(&build_event(), &web_build());
        assert_eq!(d.verdict, Verdict::Allow);
        assert!(d.message.contains("no reachable endpoint"));
    }

    #[test]
    fn asymmetric_thresholds() {
        let t = PerfThresholds::default();
        let base = metrics(&[
            ("performance_score", 90.0),
            ("fcp_ms", 1000.0),
            ("cls", 0.10),
            ("tbt_ms", 0.0),
        ]);

        // Score drop of exactly 5 points and timing +10% sit on the boundary.
        let at_boundary = metrics(&[
            ("performance_score", 85.0),
            ("fcp_ms", 1100.0),
            ("cls", 0.10),
            ("tbt_ms", 250.0),
        ]);
        assert!(!compare(&base, &at_boundary, &t).has_regressions());

        let worse = metrics(&[
            ("performance_score", 84.0),
            ("fcp_ms", 1101.0),
            ("cls", 0.2),
            ("tbt_ms", 0.0),
        ]);
        let report = compare(&base, &worse, &t);
        let exceeded: Vec<_> = report.regressions().map(|d| d.metric.as_str()).collect();
        assert_eq!(exceeded, vec!["cls", "fcp_ms", "performance_score"]);

        // A zero baseline has no ratio and reports none.
        let tbt = compare(&base, &at_boundary, &t)
            .deltas
            .into_iter()
            .find(|d| d.metric == "tbt_ms")
            .unwrap();
        assert_eq!(tbt.percent_delta, None);
        assert_eq!(tbt.to_string(), "tbt_ms: 0 -> 250 (n/a)");

        // Improvements never regress.
        let better = metrics(&[("performance_score", 99.0), ("fcp_ms", 500.0), ("cls", 0.0)]);
        assert!(!compare(&base, &better, &t).has_regressions());
    }

    #[test]
    fn float_boundaries_do_not_regress() {
        let t = PerfThresholds::default();
        let base = metrics(&[("performance_score", 90.3), ("cls", 0.3), ("fcp_ms", 1210.5)]);
        let at_boundary = metrics(&[
            ("performance_score", 85.3),
            ("cls", 0.33),
            ("fcp_ms", 1331.55),
        ]);
        let report = compare(&base, &at_boundary, &t);
        assert!(!report.has_regressions(), "{:?}", report.deltas);
        let cls = report.deltas.iter().find(|d| d.metric == "cls").unwrap();
        assert_eq!(cls.percent_delta, Some(10.0));

        let just_over = metrics(&[("cls", 0.3301)]);
        assert!(compare(&base, &just_over, &t).has_regressions());
    }

    #[test]
    fn only_web_builds_apply() {
        let backend = Arc::new(MemoryBackend::new());
        let g = gate(Vec::new(), &backend);
        let mobile = ClassificationResult {
            platform: Platform::Mobile,
            ..web_build()
        };
        assert!(g.applies(&build_event(), &web_build()));
        assert!(!g.applies(&build_event(), &mobile));
    }
}
