//! Event -> classification -> validators -> one merged decision.

use std::path::{Path, PathBuf};

use tollgate_core::config::audit::AuditConfig;
use tollgate_core::config::gates::LIMIT_MIN_PCT;
use tollgate_core::config::{state_dir, TollgateConfig};
use tollgate_core::decision::Decision;
use tollgate_core::event::ExecutionEvent;
use tollgate_core::types::{Domain, GateKind};
use tracing::{debug, warn};

use crate::baseline::{BaselineStore, FsBackend};
use crate::classify::{ClassificationResult, Classifier};
use crate::gates::bundle::SizeLimits;
use crate::gates::performance::PerfThresholds;
use crate::gates::{BundleGate, CoverageGate, DependencyGate, PerformanceGate, Validator, ViolationPolicy};
use crate::state::audit_log::{append_decision, decisions_path};
use crate::tools::{
    CommandScanner, Endpoint, GzipSizeMeasurer, LighthouseProfiler, OsvScanner,
    SummaryCoverageRunner,
};

const DEFAULT_MIN_COVERAGE_PCT: f64 = 80.0;

pub struct Pipeline {
    classifier: Classifier,
    validators: Vec<Box<dyn Validator>>,
    enabled: bool,
    only: Option<GateKind>,
    audit: Option<(PathBuf, AuditConfig)>,
}

impl Pipeline {
    pub fn new(classifier: Classifier, validators: Vec<Box<dyn Validator>>) -> Self {
        Self {
            classifier,
            validators,
            enabled: true,
            only: None,
            audit: None,
        }
    }

    /// Production wiring for a project rooted at `root`. State lives in
    /// `<root>/.tollgate`.
    pub fn from_config(root: &Path, config: &TollgateConfig) -> Self {
        let state = state_dir(root);
        let mut validators: Vec<Box<dyn Validator>> = Vec::new();

        if config.gate_enabled(GateKind::Dependency) {
            let settings = config.gate(GateKind::Dependency);
            let policy = ViolationPolicy {
                enforce: settings.enforces(GateKind::Dependency),
            };
            match &settings.command {
                Some(cmd) => validators.push(Box::new(DependencyGate::new(CommandScanner::new(cmd.as_str()), policy))),
                None => validators.push(Box::new(DependencyGate::new(OsvScanner::new(), policy))),
            }
        }

        if config.gate_enabled(GateKind::Coverage) {
            let settings = config.gate(GateKind::Coverage);
            validators.push(Box::new(CoverageGate::new(
                SummaryCoverageRunner::new(settings.command.as_deref()),
                settings.limit(LIMIT_MIN_PCT, DEFAULT_MIN_COVERAGE_PCT),
                ViolationPolicy {
                    enforce: settings.enforces(GateKind::Coverage),
                },
            )));
        }

        if config.gate_enabled(GateKind::Bundle) {
            let settings = config.gate(GateKind::Bundle);
            let gate = BundleGate::new(
                GzipSizeMeasurer,
                BaselineStore::new(FsBackend::in_state_dir(&state)),
                SizeLimits::from_settings(settings),
                ViolationPolicy {
                    enforce: settings.enforces(GateKind::Bundle),
                },
            )
            .with_dirs(settings.dirs.clone())
            .with_history(&state);
            validators.push(Box::new(gate));
        }

        if config.gate_enabled(GateKind::Performance) {
            let settings = config.gate(GateKind::Performance);
            let gate = PerformanceGate::new(
                LighthouseProfiler::new(settings.command.as_deref()),
                BaselineStore::new(FsBackend::in_state_dir(&state)),
                PerfThresholds::from_settings(settings),
                Endpoint::from_config(settings.url.as_deref()),
            )
            .with_history(&state);
            validators.push(Box::new(gate));
        }

        let mut pipeline = Self::new(Classifier::with_rules(&config.classifier.rules), validators)
            .with_audit(decisions_path(&state), config.audit.clone());
        pipeline.enabled = config.enabled;
        pipeline
    }

    /// Run only the given gate, or all of them for `None`.
    pub fn only(mut self, gate: Option<GateKind>) -> Self {
        self.only = gate;
        self
    }

    pub fn with_audit(mut self, path: impl Into<PathBuf>, config: AuditConfig) -> Self {
        self.audit = config.log_decisions.then(|| (path.into(), config));
        self
    }

    pub fn classify(&self, event: &ExecutionEvent) -> ClassificationResult {
        self.classifier.classify(event)
    }

    /// Gates that would run for `event`.
    pub fn applicable(&self, event: &ExecutionEvent, classification: &ClassificationResult) -> Vec<GateKind> {
        self.selected(event, classification).map(|v| v.kind()).collect()
    }

    fn selected<'a>(
        &'a self,
        event: &'a ExecutionEvent,
        classification: &'a ClassificationResult,
    ) -> impl Iterator<Item = &'a dyn Validator> + 'a {
        self.validators
            .iter()
            .map(|v| &**v)
            .filter(move |v| self.only.map_or(true, |k| k == v.kind()))
            .filter(move |v| v.applies(event, classification))
    }

    /// Evaluate an event. Never fails; with nothing applicable the result is
    /// a silent allow.
    pub fn run(&self, event: &ExecutionEvent) -> Decision {
        if !self.enabled {
            debug!("tollgate disabled by config");
            return Decision::allow("");
        }

        let classification = self.classify(event);
        debug!(
            tool = %event.tool,
            domain = %classification.domain,
            rule = classification.rule_id.as_deref().unwrap_or("-"),
            "classified"
        );
        if classification.domain == Domain::None {
            return Decision::allow("");
        }

        let decisions: Vec<Decision> = self
            .selected(event, &classification)
            .map(|v| {
                let decision = v.evaluate(event, &classification);
                debug!(gate = %v.kind(), verdict = %decision.verdict, "evaluated");
                decision
            })
            .collect();
        if decisions.is_empty() {
            return Decision::allow("");
        }

        let decision = Decision::merge(decisions);
        self.record(&decision, event, classification.domain);
        decision
    }

    fn record(&self, decision: &Decision, event: &ExecutionEvent, domain: Domain) {
        let Some((path, config)) = &self.audit else {
            return;
        };
        if decision.is_allow() && !config.log_allows {
            return;
        }
        if let Err(e) = append_decision(path, decision, event, domain) {
            warn!("decision log append failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::baseline::MeasurementSnapshot;
    use tollgate_core::config::gates::GateSettings;
    use tollgate_core::errors::ToolError;
    use tollgate_core::traits::{
        CoverageRunner, CoverageSummary, PackageRef, PerformanceProfiler, ScanReport, SizeMeasurer,
        SizeReport, VulnerabilityScanner,
    };
    use tollgate_core::types::Verdict;

    use crate::baseline::MemoryBackend;
    use crate::state::audit_log::read_decisions;

    struct Unavailable;

    fn missing(tool: &str) -> ToolError {
        ToolError::unavailable(tool, "not installed")
    }

    impl VulnerabilityScanner for Unavailable {
        fn scan(&self, _: &[PackageRef], _: &Path) -> Result<ScanReport, ToolError> {
            Err(missing("osv"))
        }
    }
    impl CoverageRunner for Unavailable {
        fn run(&self, _: &Path) -> Result<CoverageSummary, ToolError> {
            Err(missing("jest"))
        }
    }
    impl SizeMeasurer for Unavailable {
        fn measure(&self, _: &[PathBuf]) -> Result<SizeReport, ToolError> {
            Err(missing("gzip"))
        }
    }
    impl PerformanceProfiler for Unavailable {
        fn profile(&self, _: &str, _: &Path) -> Result<MeasurementSnapshot, ToolError> {
            Err(missing("lighthouse"))
        }
    }

    struct Coverage(f64);

    impl CoverageRunner for Coverage {
        fn run(&self, _: &Path) -> Result<CoverageSummary, ToolError> {
            Ok(CoverageSummary {
                lines: self.0,
                statements: self.0,
                functions: self.0,
                branches: self.0,
            })
        }
    }

    fn unavailable_everywhere() -> Pipeline {
        let policy = ViolationPolicy::enforcing();
        Pipeline::new(
            Classifier::builtin(),
            vec![
                Box::new(DependencyGate::new(Unavailable, policy)),
                Box::new(CoverageGate::new(Unavailable, 80.0, policy)),
                Box::new(BundleGate::new(
                    Unavailable,
                    BaselineStore::new(MemoryBackend::new()),
                    SizeLimits::from_settings(&GateSettings::default()),
                    policy,
                )),
                Box::new(PerformanceGate::new(
                    Unavailable,
                    BaselineStore::new(MemoryBackend::new()),
                    PerfThresholds::default(),
                    Endpoint::Fixed("http://localhost:3000".into()),
                )),
            ],
        )
    }

    fn wd() -> PathBuf {
        PathBuf::from("/tmp/project")
    }

    #[test]
    fn missing_tools_allow_every_domain() {
        let pipeline = unavailable_everywhere();
        let events = [
            ExecutionEvent::shell("npm install lodash@4.17.20", wd()),
            ExecutionEvent::shell("npm run build", wd()),
            ExecutionEvent::shell("flutter build apk", wd()),
            ExecutionEvent::file_write("src/app.ts", wd()),
        ];
        for event in &events {
            let decision = pipeline.run(event);
            assert_eq!(decision.verdict, Verdict::Allow, "{event:?}");
            assert!(decision.message.contains("skipped"), "{}", decision.message);
        }
    }

    #[test]
    fn unclassified_events_are_silent() {
        let pipeline = unavailable_everywhere();
        let decision = pipeline.run(&ExecutionEvent::shell("ls -la", wd()));
        assert!(decision.is_allow());
        assert!(decision.message.is_empty());
    }

    #[test]
    fn empty_command_is_silent_allow() {
        let decision = unavailable_everywhere().run(&ExecutionEvent::shell("", wd()));
        assert!(decision.is_allow());
        assert!(decision.message.is_empty());
    }

    #[test]
    fn disabled_pipeline_allows_everything() {
        let config = TollgateConfig {
            enabled: false,
            ..TollgateConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::from_config(dir.path(), &config);
        let decision = pipeline.run(&ExecutionEvent::file_write("src/app.ts", dir.path().to_path_buf()));
        assert!(decision.is_allow());
    }

    #[test]
    fn only_restricts_to_one_gate() {
        let pipeline = unavailable_everywhere().only(Some(GateKind::Performance));
        let event = ExecutionEvent::shell("npm run build", wd());
        let c = pipeline.classify(&event);
        assert_eq!(pipeline.applicable(&event, &c), vec![GateKind::Performance]);

        let pipeline = unavailable_everywhere();
        let c = pipeline.classify(&event);
        assert_eq!(
            pipeline.applicable(&event, &c),
            vec![GateKind::Bundle, GateKind::Performance]
        );
    }

    #[test]
    fn test_files_skip_coverage() {
        let pipeline = unavailable_everywhere();
        let event = ExecutionEvent::file_write("src/app.test.ts", wd());
        let c = pipeline.classify(&event);
        assert!(pipeline.applicable(&event, &c).is_empty());
    }

    #[test]
    fn violations_are_logged_and_allows_are_not() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("decisions.jsonl");
        let pipeline = Pipeline::new(
            Classifier::builtin(),
            vec![Box::new(CoverageGate::new(Coverage(65.0), 80.0, ViolationPolicy::enforcing()))],
        )
        .with_audit(&log, AuditConfig::default());

        let denied = pipeline.run(&ExecutionEvent::file_write("src/app.ts", wd()));
        assert_eq!(denied.verdict, Verdict::Deny);

        let pipeline = Pipeline::new(
            Classifier::builtin(),
            vec![Box::new(CoverageGate::new(Coverage(95.0), 80.0, ViolationPolicy::enforcing()))],
        )
        .with_audit(&log, AuditConfig::default());
        assert!(pipeline.run(&ExecutionEvent::file_write("src/app.ts", wd())).is_allow());

        let entries = read_decisions(&log).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["verdict"], "deny");
        assert_eq!(entries[0]["gate"], "coverage");
        assert_eq!(entries[0]["domain"], "file_modification");
    }
}
