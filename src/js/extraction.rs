//! Extraction targets and the coordinator that drives one analyzer pass

use crate::error::SliceError;
use crate::js::analyzer::{Analyzer, DeclarationTable, Observed};
use crate::js::matchers::{
    MatchContext, Matcher, NTransformMatcher, PropertyMatcher, SignatureMatcher,
};
use crate::js::source::SourceModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Canonical export name of the signature decipher wrapper
pub const SIG_FUNCTION_NAME: &str = "sigFunction";
/// Canonical export name of the n-transform wrapper
pub const N_FUNCTION_NAME: &str = "nFunction";
/// Canonical raw-value name of the signature timestamp
pub const TIMESTAMP_VAR_NAME: &str = "signatureTimestampVar";

/// A capability to recover from the player script
#[derive(Clone)]
pub struct ExtractionTarget {
    name: String,
    matcher: Arc<dyn Matcher>,
    collect_dependencies: bool,
    stop_when_ready: bool,
    raw_value_only: bool,
}

impl ExtractionTarget {
    pub fn new(name: impl Into<String>, matcher: impl Matcher + 'static) -> Self {
        Self {
            name: name.into(),
            matcher: Arc::new(matcher),
            collect_dependencies: true,
            stop_when_ready: true,
            raw_value_only: false,
        }
    }

    /// Signature decipher function, exported as `sigFunction`
    pub fn signature() -> Self {
        Self::new(SIG_FUNCTION_NAME, SignatureMatcher)
    }

    /// n-parameter transform function, exported as `nFunction`
    pub fn n_transform() -> Self {
        Self::new(N_FUNCTION_NAME, NTransformMatcher)
    }

    /// Signature timestamp literal, exported as a raw value only
    pub fn signature_timestamp() -> Self {
        Self::new(TIMESTAMP_VAR_NAME, PropertyMatcher::signature_timestamp())
            .with_collect_dependencies(false)
            .with_raw_value_only(true)
    }

    pub fn with_collect_dependencies(mut self, collect: bool) -> Self {
        self.collect_dependencies = collect;
        self
    }

    pub fn with_stop_when_ready(mut self, stop: bool) -> Self {
        self.stop_when_ready = stop;
        self
    }

    pub fn with_raw_value_only(mut self, raw: bool) -> Self {
        self.raw_value_only = raw;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }

    pub fn collect_dependencies(&self) -> bool {
        self.collect_dependencies
    }

    pub fn stop_when_ready(&self) -> bool {
        self.stop_when_ready
    }

    pub fn raw_value_only(&self) -> bool {
        self.raw_value_only
    }
}

impl fmt::Debug for ExtractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionTarget")
            .field("name", &self.name)
            .field("matcher", &self.matcher.name())
            .field("collect_dependencies", &self.collect_dependencies)
            .field("stop_when_ready", &self.stop_when_ready)
            .field("raw_value_only", &self.raw_value_only)
            .finish()
    }
}

/// Signature, n-transform and timestamp targets
pub fn default_targets() -> Vec<ExtractionTarget> {
    vec![
        ExtractionTarget::signature(),
        ExtractionTarget::n_transform(),
        ExtractionTarget::signature_timestamp(),
    ]
}

/// Progress of one target through the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Unmatched,
    Matched,
    Ready,
}

/// Mutable per-target record
#[derive(Debug, Clone, Default)]
pub struct ExtractionState<'s, 'a> {
    declaration: Option<String>,
    context: Option<MatchContext<'s, 'a>>,
    ready: bool,
    blocked_on: Option<String>,
}

impl<'s, 'a> ExtractionState<'s, 'a> {
    pub fn status(&self) -> TargetStatus {
        match (&self.declaration, self.ready) {
            (None, _) => TargetStatus::Unmatched,
            (Some(_), false) => TargetStatus::Matched,
            (Some(_), true) => TargetStatus::Ready,
        }
    }

    /// Name of the matched declaration
    pub fn declaration(&self) -> Option<&str> {
        self.declaration.as_deref()
    }

    pub fn context(&self) -> Option<&MatchContext<'s, 'a>> {
        self.context.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn refresh(
        &mut self,
        target: &ExtractionTarget,
        observed: &Observed,
        table: &DeclarationTable<'s, 'a>,
        external: Option<&str>,
    ) {
        let Some(name) = &self.declaration else {
            return;
        };
        if self.ready {
            return;
        }
        if !target.collect_dependencies {
            self.ready = true;
            return;
        }

        // Only a newly declared blocker (or the object holding it) or changed
        // dependencies can unblock
        let stale = match &self.blocked_on {
            None => true,
            Some(blocker) => {
                observed.reassigned
                    || blocker == &observed.name
                    || blocker
                        .strip_prefix(observed.name.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            }
        };
        if !stale {
            return;
        }

        self.blocked_on = table.first_unresolved(name, external);
        self.ready = self.blocked_on.is_none();
        if let Some(blocker) = &self.blocked_on {
            debug!("Target {} waiting on {}", target.name, blocker);
        }
    }
}

/// Per-target outcome of a pass, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub name: String,
    pub status: TargetStatus,
    pub declaration: Option<String>,
    pub unresolved: Vec<String>,
}

/// Summary of one analyzer pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub module_found: bool,
    pub module_parameter: Option<String>,
    pub statements_scanned: usize,
    pub statements_total: usize,
    pub stopped_early: bool,
    pub declarations: usize,
    pub targets: Vec<TargetReport>,
}

impl ExtractionReport {
    pub fn target(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|target| target.name == name)
    }

    pub fn all_ready(&self) -> bool {
        self.targets
            .iter()
            .all(|target| target.status == TargetStatus::Ready)
    }
}

/// Result of a coordinated pass: the declaration table plus target states
pub struct Analysis<'s, 'a> {
    pub source: &'s SourceModel<'a>,
    pub table: DeclarationTable<'s, 'a>,
    pub external: Option<String>,
    pub targets: Vec<ExtractionTarget>,
    pub states: Vec<ExtractionState<'s, 'a>>,
    pub report: ExtractionReport,
}

impl<'s, 'a> Analysis<'s, 'a> {
    /// Targets paired with their state
    pub fn extractions(&self) -> impl Iterator<Item = (&ExtractionTarget, &ExtractionState<'s, 'a>)> {
        self.targets.iter().zip(self.states.iter())
    }
}

/// Owns the target configuration and runs one analyzer pass against it
#[derive(Debug, Clone)]
pub struct ExtractionCoordinator {
    targets: Vec<ExtractionTarget>,
}

impl ExtractionCoordinator {
    pub fn new(targets: Vec<ExtractionTarget>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[ExtractionTarget] {
        &self.targets
    }

    /// Scan the module body once, matching and tracking readiness as
    /// declarations appear. Stops after the statement that makes every
    /// stop-on-ready target ready.
    pub fn run<'s, 'a>(self, source: &'s SourceModel<'a>) -> Analysis<'s, 'a> {
        let mut analyzer = Analyzer::new(source);
        let mut states: Vec<ExtractionState<'s, 'a>> =
            vec![ExtractionState::default(); self.targets.len()];

        let module_found = analyzer.has_module();
        if !module_found {
            warn!("{}; nothing to extract", SliceError::NoModuleWrapper);
        }

        let statements = analyzer.statements();
        let mut scanned = 0;
        let mut stopped_early = false;

        for statement in statements {
            scanned += 1;
            for observed in analyzer.record_statement(statement) {
                self.observe(&mut states, &observed, &analyzer);
            }
            if self.should_stop(&states) {
                stopped_early = scanned < statements.len();
                break;
            }
        }

        let declarations = analyzer.table().len();
        let (table, external) = analyzer.into_parts();
        let report = self.report(&states, &table, external.as_deref(), |report| {
            report.module_found = module_found;
            report.statements_scanned = scanned;
            report.statements_total = statements.len();
            report.stopped_early = stopped_early;
            report.declarations = declarations;
        });

        Analysis {
            source,
            table,
            external,
            targets: self.targets,
            states,
            report,
        }
    }

    fn observe<'s, 'a>(
        &self,
        states: &mut [ExtractionState<'s, 'a>],
        observed: &Observed,
        analyzer: &Analyzer<'s, 'a>,
    ) {
        let table = analyzer.table();
        let Some(declaration) = table.get(&observed.name) else {
            return;
        };

        for (target, state) in self.targets.iter().zip(states.iter_mut()) {
            if state.declaration.is_none() {
                if let Some(context) = target.matcher.match_declaration(declaration) {
                    info!("Matched {} at {}", target.name, declaration.name);
                    state.declaration = Some(declaration.name.clone());
                    state.context = Some(context);
                }
            }
            let was_ready = state.ready;
            state.refresh(target, observed, table, analyzer.external());
            if state.ready && !was_ready {
                info!("Target {} ready", target.name);
            }
        }
    }

    fn should_stop(&self, states: &[ExtractionState<'_, '_>]) -> bool {
        let mut stopping = self
            .targets
            .iter()
            .zip(states)
            .filter(|(target, _)| target.stop_when_ready)
            .peekable();
        stopping.peek().is_some() && stopping.all(|(_, state)| state.ready)
    }

    fn report(
        &self,
        states: &[ExtractionState<'_, '_>],
        table: &DeclarationTable<'_, '_>,
        external: Option<&str>,
        fill: impl FnOnce(&mut ExtractionReport),
    ) -> ExtractionReport {
        let targets = self
            .targets
            .iter()
            .zip(states)
            .map(|(target, state)| {
                let status = state.status();
                let unresolved = match (&state.declaration, status) {
                    (Some(name), TargetStatus::Matched) => {
                        table.unresolved(name, external).into_iter().collect()
                    }
                    _ => Vec::new(),
                };
                match status {
                    TargetStatus::Unmatched => warn!("Target {} not found", target.name),
                    TargetStatus::Matched => warn!(
                        "Target {} incomplete, unresolved: {}",
                        target.name,
                        unresolved.join(", ")
                    ),
                    TargetStatus::Ready => {}
                }
                TargetReport {
                    name: target.name.clone(),
                    status,
                    declaration: state.declaration.clone(),
                    unresolved,
                }
            })
            .collect();

        let mut report = ExtractionReport {
            module_found: false,
            module_parameter: external.map(str::to_string),
            statements_scanned: 0,
            statements_total: 0,
            stopped_early: false,
            declarations: table.len(),
            targets,
        };
        fill(&mut report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::fixtures::PLAYER;
    use oxc_allocator::Allocator;

    #[test]
    fn test_all_targets_become_ready() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, PLAYER).unwrap();
        let analysis = ExtractionCoordinator::new(default_targets()).run(&model);
        let report = &analysis.report;

        assert!(report.all_ready());
        assert_eq!(report.module_parameter.as_deref(), Some("g"));
        assert_eq!(
            report.target(SIG_FUNCTION_NAME).unwrap().declaration.as_deref(),
            Some("Ab")
        );
        assert_eq!(
            report.target(N_FUNCTION_NAME).unwrap().declaration.as_deref(),
            Some("Xs")
        );
        assert_eq!(
            report.target(TIMESTAMP_VAR_NAME).unwrap().declaration.as_deref(),
            Some("Ts")
        );
    }

    #[test]
    fn test_scan_stops_once_ready() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, PLAYER).unwrap();
        let analysis = ExtractionCoordinator::new(default_targets()).run(&model);
        let report = &analysis.report;

        assert!(report.module_found);
        assert!(report.stopped_early);
        assert!(report.statements_scanned < report.statements_total);
        assert!(analysis.table.get("Kx").unwrap().dependencies.is_empty());
        assert!(analysis.table.get("g.Ud").is_none());
    }

    #[test]
    fn test_each_matcher_fires_once() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, PLAYER).unwrap();
        let targets: Vec<ExtractionTarget> = default_targets()
            .into_iter()
            .map(|target| target.with_stop_when_ready(false))
            .collect();
        let analysis = ExtractionCoordinator::new(targets).run(&model);

        assert!(!analysis.report.stopped_early);
        for target in &analysis.targets {
            let hits = analysis
                .table
                .iter()
                .filter(|declaration| target.matcher().match_declaration(declaration).is_some())
                .count();
            assert_eq!(hits, 1, "{} matched {} declarations", target.name(), hits);
        }
        assert!(analysis
            .extractions()
            .all(|(_, state)| state.status() == TargetStatus::Ready));
    }

    #[test]
    fn test_incomplete_target_reports_unresolved() {
        let text = r#"(function (g) {
            var Pn = function (a) { return Qz(a) + Rz; };
            var Xs = [Pn];
        })({});"#;
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, text).unwrap();
        let analysis = ExtractionCoordinator::new(default_targets()).run(&model);
        let report = &analysis.report;

        let n = report.target(N_FUNCTION_NAME).unwrap();
        assert_eq!(n.status, TargetStatus::Matched);
        assert_eq!(n.unresolved, vec!["Qz".to_string(), "Rz".to_string()]);
        assert_eq!(
            report.target(SIG_FUNCTION_NAME).unwrap().status,
            TargetStatus::Unmatched
        );
        assert!(!report.stopped_early);
        assert_eq!(report.statements_scanned, 2);
    }

    #[test]
    fn test_member_method_assigned_after_use_blocks_readiness() {
        let text = r#"(function (g) {
            var Hx = {};
            var Fm = function (a, b, c) { b && (b = Hx.dc(decodeURIComponent(b)), a.set(c, encodeURIComponent(b))); };
            var Mx = 1;
            Hx.dc = function (a) { return a.split("").reverse().join(""); };
            var Zz = 2;
        })({});"#;
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, text).unwrap();
        let analysis = ExtractionCoordinator::new(vec![ExtractionTarget::signature()]).run(&model);
        let report = &analysis.report;

        assert_eq!(report.targets[0].status, TargetStatus::Ready);
        assert_eq!(report.statements_scanned, 4);
        assert!(report.stopped_early);
        assert!(analysis.table.get("Fm").unwrap().dependencies.contains("Hx.dc"));
    }

    #[test]
    fn test_member_method_of_later_object_blocks_readiness() {
        let text = r#"(function (g) {
            var Fm = function (a, b, c) { b && (b = Hx.dc(decodeURIComponent(b)), a.set(c, encodeURIComponent(b))); };
            var Hx = {};
            Hx.dc = function (a) { return a; };
            var Zz = 2;
        })({});"#;
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, text).unwrap();
        let mut analyzer = Analyzer::new(&model);
        let statements = analyzer.statements();
        analyzer.record_statement(&statements[0]);
        analyzer.record_statement(&statements[1]);
        assert_eq!(
            analyzer.table().first_unresolved("Fm", Some("g")).as_deref(),
            Some("Hx.dc")
        );
        assert_eq!(
            analyzer.table().pending_dependents("Hx.dc").unwrap(),
            &std::collections::BTreeSet::from(["Fm".to_string()])
        );

        let analysis = ExtractionCoordinator::new(vec![ExtractionTarget::signature()]).run(&model);
        assert_eq!(analysis.report.targets[0].status, TargetStatus::Ready);
        assert_eq!(analysis.report.statements_scanned, 3);
        assert!(analysis.table.get("Hx.dc").unwrap().dependents.contains("Fm"));
    }

    #[test]
    fn test_missing_member_method_reported_unresolved() {
        let text = r#"(function (g) {
            var Hx = { rv: function (a) { a.reverse(); } };
            var Fm = function (a, b, c) { b && (b = Hx.dc(decodeURIComponent(b)), a.set(c, encodeURIComponent(b))); };
        })({});"#;
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, text).unwrap();
        let analysis = ExtractionCoordinator::new(vec![ExtractionTarget::signature()]).run(&model);

        let signature = &analysis.report.targets[0];
        assert_eq!(signature.status, TargetStatus::Matched);
        assert_eq!(signature.unresolved, vec!["Hx.dc".to_string()]);
    }

    #[test]
    fn test_dependency_collection_disabled() {
        let text = r#"(function (g) {
            var Pn = function (a) { return Qz(a); };
            var Xs = [Pn];
        })({});"#;
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, text).unwrap();
        let targets = vec![ExtractionTarget::n_transform().with_collect_dependencies(false)];
        let analysis = ExtractionCoordinator::new(targets).run(&model);

        assert_eq!(analysis.report.targets[0].status, TargetStatus::Ready);
        assert!(!analysis.report.stopped_early);
    }

    #[test]
    fn test_missing_module_wrapper() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, "var a = [b];").unwrap();
        let analysis = ExtractionCoordinator::new(default_targets()).run(&model);

        assert!(!analysis.report.module_found);
        assert_eq!(analysis.report.statements_total, 0);
        assert!(analysis
            .report
            .targets
            .iter()
            .all(|target| target.status == TargetStatus::Unmatched));
    }
}
