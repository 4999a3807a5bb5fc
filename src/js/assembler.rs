//! Renders matched declarations and their dependency closures into one
//! self-contained script

use crate::error::SliceError;
use crate::js::analyzer::{Declaration, DeclarationSite};
use crate::js::builtins::is_global;
use crate::js::extraction::Analysis;
use crate::js::matchers::MatchContext;
use crate::js::safety::{fallback_for, SafetyClassifier, SafetyMode};
use crate::js::scope::FreeNameWalker;
use crate::js::source::{assignment_target_object, member_path, strip_parens, SourceModel};
use crate::Result;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, Expression, UnaryOperator};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

const INDENT: &str = "  ";

/// Name the assembled script binds its export object to
pub const EXPORTS_BINDING: &str = "exportedVars";

/// Name of the raw value map inside the export object
pub const RAW_VALUES_NAME: &str = "rawValues";

/// Assembly configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyOptions {
    /// Initializer filtering, `None` to emit everything verbatim
    pub safety: Option<SafetyMode>,
    /// Declare every rendered variable upfront instead of with `var`
    pub force_var_predeclaration: bool,
    /// Export literal values captured by matchers
    pub export_raw_values: bool,
    /// Limit on how deep dependency closures are followed
    pub max_depth: Option<usize>,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            safety: Some(SafetyMode::Strict),
            force_var_predeclaration: false,
            export_raw_values: true,
            max_depth: None,
        }
    }
}

impl AssemblyOptions {
    pub fn with_safety(mut self, safety: Option<SafetyMode>) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_force_var_predeclaration(mut self, force: bool) -> Self {
        self.force_var_predeclaration = force;
        self
    }

    pub fn with_export_raw_values(mut self, export: bool) -> Self {
        self.export_raw_values = export;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// The assembled artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedScript {
    /// Complete script text; evaluating it binds `exportedVars`
    pub output: String,
    /// Rendered fragments in emission order, dependencies first
    pub fragments: Vec<String>,
    /// Names declared upfront with a single `var` line
    pub predeclared: Vec<String>,
    /// Wrapper source per canonical function name
    pub wrappers: BTreeMap<String, String>,
    /// Names exposed on the export object
    pub exported: Vec<String>,
    /// Literal values per canonical name, when raw values are exported
    pub raw_values: Option<BTreeMap<String, String>>,
}

impl GeneratedScript {
    pub fn exports(&self, name: &str) -> bool {
        self.exported.iter().any(|exported| exported == name)
    }

    pub fn raw_value(&self, name: &str) -> Option<&str> {
        self.raw_values.as_ref()?.get(name).map(String::as_str)
    }
}

/// Builds a [`GeneratedScript`] from a finished analysis pass
pub struct ScriptAssembler<'r, 's, 'a> {
    analysis: &'r Analysis<'s, 'a>,
    options: AssemblyOptions,
    classifier: Option<SafetyClassifier<'r, 's, 'a>>,
    seen: HashSet<String>,
    fragments: Vec<String>,
    predeclared: Vec<String>,
    /// Member paths used by rendered code that nothing defines
    missing: BTreeSet<String>,
}

impl<'r, 's, 'a> ScriptAssembler<'r, 's, 'a> {
    pub fn new(analysis: &'r Analysis<'s, 'a>, options: AssemblyOptions) -> Self {
        let classifier = options
            .safety
            .map(|mode| SafetyClassifier::new(mode, &analysis.table));

        Self {
            analysis,
            options,
            classifier,
            seen: HashSet::new(),
            fragments: Vec::new(),
            predeclared: Vec::new(),
            missing: BTreeSet::new(),
        }
    }

    pub fn assemble(mut self) -> Result<GeneratedScript> {
        let analysis = self.analysis;
        let table = &analysis.table;

        // Ready targets render themselves inside their own region
        for (target, state) in analysis.extractions() {
            if state.is_ready() && !target.raw_value_only() {
                if let Some(name) = state.declaration() {
                    self.seen.insert(name.to_string());
                }
            }
        }

        let mut contexts: Vec<(&str, &MatchContext<'s, 'a>, bool)> = Vec::new();
        for (target, state) in analysis.extractions() {
            if !state.is_ready() {
                continue;
            }
            let Some(declaration) = state.declaration().and_then(|name| table.get(name)) else {
                continue;
            };
            let skip = target.raw_value_only();

            if !skip {
                self.fragments
                    .push(format!("{INDENT}//#region --- start [{}] ---", target.name()));
                let predeclare = self.should_predeclare(declaration);
                if target.collect_dependencies() {
                    self.visit(declaration, 0);
                }
                let fragment = self.render(declaration, predeclare);
                self.fragments.push(fragment);
                self.fragments
                    .push(format!("{INDENT}//#endregion --- end [{}] ---\n", target.name()));
            }
            if let Some(context) = state.context() {
                contexts.push((target.name(), context, skip));
            }
        }

        let mut wrappers = BTreeMap::new();
        let mut raw_values = BTreeMap::new();
        for (name, context, raw_only) in contexts {
            if raw_only {
                raw_values.insert(name.to_string(), self.raw_value(context));
            } else if let Some(wrapper) = self.wrapper(name, context) {
                wrappers.insert(name.to_string(), wrapper);
            }
        }

        let missing = std::mem::take(&mut self.missing);
        let script = self.finish(wrappers, raw_values)?;
        check_complete(&script.output, missing)?;
        debug!(
            "Assembled {} fragments, exports: {}",
            script.fragments.len(),
            script.exported.join(", ")
        );
        Ok(script)
    }

    fn should_predeclare(&mut self, declaration: &Declaration<'s, 'a>) -> bool {
        if !declaration.is_variable() {
            return false;
        }
        let predeclare = self.options.force_var_predeclaration || declaration.predeclared;
        if predeclare && !self.predeclared.contains(&declaration.name) {
            self.predeclared.push(declaration.name.clone());
        }
        predeclare
    }

    /// Render every dependency of `declaration` before returning
    fn visit(&mut self, declaration: &Declaration<'s, 'a>, depth: usize) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }
        let analysis = self.analysis;

        for dependency in &declaration.dependencies {
            if !self.seen.insert(dependency.clone()) {
                continue;
            }
            let Some(resolved) = analysis.table.get(dependency) else {
                if dependency.contains('.') && !self.member_survives(dependency) {
                    self.missing.insert(dependency.clone());
                }
                continue;
            };
            let predeclare = self.should_predeclare(resolved);
            self.visit(resolved, depth + 1);
            let fragment = self.render(resolved, predeclare);
            self.fragments.push(fragment);
        }
    }

    fn render(&self, declaration: &Declaration<'s, 'a>, predeclare: bool) -> String {
        let source = self.analysis.source;
        if let DeclarationSite::Function(func) = declaration.site {
            return format!("{INDENT}{}", source.slice_node(func));
        }

        let init = declaration.init;
        let unsafe_init = match (&self.classifier, init) {
            (Some(classifier), Some(expr)) => !classifier.is_safe(expr),
            _ => false,
        };

        if unsafe_init {
            if let DeclarationSite::Member(assign) = declaration.site {
                if matches!(
                    assignment_target_object(&assign.left),
                    Some(Expression::Identifier(_))
                ) {
                    debug!("Skipping unsafe assignment to {}", declaration.name);
                    return format!("{INDENT}// Skipped {} assignment.", declaration.name);
                }
            }
        }

        let value = match init {
            Some(expr) if !unsafe_init => self.render_value(expr, predeclare),
            _ => fallback_for(init).to_string(),
        };

        if declaration.is_variable() && !predeclare {
            format!("{INDENT}var {} = {};", declaration.name, value)
        } else {
            format!("{INDENT}{} = {};", declaration.name, value)
        }
    }

    fn render_value(&self, expr: &Expression<'a>, predeclare: bool) -> String {
        let source = self.analysis.source;
        match strip_parens(expr) {
            Expression::Identifier(id) if !predeclare && !self.resolves(&id.name) => {
                fallback_for(Some(expr)).to_string()
            }
            Expression::SequenceExpression(_) => {
                let text = source.slice_node(expr).trim();
                if text.starts_with('(') {
                    text.to_string()
                } else {
                    format!("({})", text)
                }
            }
            _ => {
                let text = source.slice_node(expr).trim();
                text.trim_end_matches(';').trim_end().to_string()
            }
        }
    }

    fn resolves(&self, name: &str) -> bool {
        self.analysis.table.contains(name)
            || is_global(name)
            || self.analysis.external.as_deref() == Some(name)
    }

    /// An undeclared member path stays defined only when the object literal
    /// holding it is emitted as written
    fn member_survives(&self, path: &str) -> bool {
        let table = &self.analysis.table;
        if !table.is_object_member(path, self.analysis.external.as_deref()) {
            return false;
        }
        let base = path.rsplit_once('.').map(|(base, _)| base).unwrap_or_default();
        match (table.get(base).and_then(|decl| decl.init), &self.classifier) {
            (Some(init), Some(classifier)) => classifier.is_safe(init),
            _ => true,
        }
    }

    /// `function <name>(input) { return <callee>(<args>); }` for a
    /// function-shaped match
    fn wrapper(&self, name: &str, context: &MatchContext<'s, 'a>) -> Option<String> {
        let table = &self.analysis.table;
        let (callee, args) = match context {
            MatchContext::Call(call) => {
                let callee = member_path(&call.callee)?;
                if !table.contains(&callee) && !self.member_survives(&callee) {
                    warn!("Callee {} of {} is not declared", callee, name);
                    return None;
                }
                (callee, self.wrapper_arguments(&call.arguments))
            }
            MatchContext::Identifier(id) => {
                if !table.get(&id.name).is_some_and(|declaration| declaration.is_callable()) {
                    warn!("{} does not name a declared function", id.name);
                    return None;
                }
                (id.name.to_string(), "input".to_string())
            }
            MatchContext::Property { .. } => return None,
        };

        Some(format!(
            "{INDENT}function {name}(input) {{\n{INDENT}{INDENT}return {callee}({args});\n{INDENT}}}"
        ))
    }

    /// Declared identifiers and literals are kept; the first other argument
    /// becomes `input` and the rest are dropped
    fn wrapper_arguments(&self, arguments: &[Argument<'a>]) -> String {
        let source = self.analysis.source;
        let table = &self.analysis.table;
        let mut params: Vec<String> = Vec::new();

        for argument in arguments {
            let param = match argument.as_expression().map(strip_parens) {
                Some(Expression::Identifier(id)) if table.contains(&id.name) => id.name.to_string(),
                Some(Expression::Identifier(id)) if id.name == "undefined" => id.name.to_string(),
                Some(literal) if is_literal_argument(literal) => {
                    source.slice_node(literal).to_string()
                }
                _ => "input".to_string(),
            };
            if param == "input" && params.iter().any(|p| p == "input") {
                continue;
            }
            params.push(param);
        }
        params.join(", ")
    }

    fn raw_value(&self, context: &MatchContext<'s, 'a>) -> String {
        let source: &SourceModel<'a> = self.analysis.source;
        match context {
            MatchContext::Property { value, .. } => source.slice(*value).to_string(),
            MatchContext::Identifier(id) => id.name.to_string(),
            MatchContext::Call(call) => source.slice_node(*call).to_string(),
        }
    }

    fn finish(
        self,
        wrappers: BTreeMap<String, String>,
        raw_values: BTreeMap<String, String>,
    ) -> Result<GeneratedScript> {
        let external = self.analysis.external.as_deref().unwrap_or_default();
        let mut output = vec![
            "const window = Object.assign({}, globalThis);".to_string(),
            "const document = {};".to_string(),
            "const self = window;\n".to_string(),
            format!("const {EXPORTS_BINDING} = (function({external}) {{"),
        ];
        if !self.predeclared.is_empty() {
            output.push(format!("{INDENT}var {};\n", self.predeclared.join(", ")));
        }
        output.push(self.fragments.join("\n"));

        let mut exported = Vec::new();
        for (name, wrapper) in &wrappers {
            output.push(format!("{wrapper}\n"));
            exported.push(name.clone());
        }

        let raw_values = if self.options.export_raw_values {
            let json = serde_json::to_string_pretty(&raw_values)?;
            let json = json.replace('\n', &format!("\n{INDENT}"));
            output.push(format!("{INDENT}const {RAW_VALUES_NAME} = {json};\n"));
            exported.push(RAW_VALUES_NAME.to_string());
            Some(raw_values)
        } else {
            None
        };

        output.push(format!("{INDENT}return {{ {} }};", exported.join(", ")));
        output.push("})({});\n".to_string());

        Ok(GeneratedScript {
            output: output.join("\n"),
            fragments: self.fragments,
            predeclared: self.predeclared,
            wrappers,
            exported,
            raw_values,
        })
    }
}

/// Literal call arguments that are copied into a wrapper unchanged
fn is_literal_argument(expr: &Expression<'_>) -> bool {
    match expr {
        Expression::StringLiteral(_)
        | Expression::NumericLiteral(_)
        | Expression::BooleanLiteral(_)
        | Expression::NullLiteral(_) => true,
        Expression::UnaryExpression(unary) => {
            matches!(
                unary.operator,
                UnaryOperator::UnaryNegation | UnaryOperator::UnaryPlus
            ) && matches!(strip_parens(&unary.argument), Expression::NumericLiteral(_))
        }
        _ => false,
    }
}

/// Re-parse the artifact and reject it if any free name is left over.
///
/// `missing` carries member paths the assembler already found undefined;
/// the walk itself only proves bare names.
fn check_complete(output: &str, mut missing: BTreeSet<String>) -> Result<()> {
    let allocator = Allocator::default();
    let model = SourceModel::parse(&allocator, output)
        .map_err(|e| SliceError::Generic(format!("Assembled script does not parse: {}", e)))?;
    let declared: HashSet<String> = HashSet::new();
    let free = FreeNameWalker::new(&declared).walk_program(model.program());
    missing.extend(free.into_iter().filter(|name| !name.contains('.')));

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SliceError::IncompleteAssembly(missing.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::extraction::{
        default_targets, ExtractionCoordinator, ExtractionTarget, N_FUNCTION_NAME,
        SIG_FUNCTION_NAME, TIMESTAMP_VAR_NAME,
    };
    use crate::js::fixtures::{PLAYER, REVERSE};

    fn assemble(text: &str, targets: Vec<ExtractionTarget>, options: AssemblyOptions) -> Result<GeneratedScript> {
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, text)?;
        let analysis = ExtractionCoordinator::new(targets).run(&model);
        ScriptAssembler::new(&analysis, options).assemble()
    }

    #[test]
    fn test_player_exports() {
        let script = assemble(PLAYER, default_targets(), AssemblyOptions::default()).unwrap();

        assert_eq!(
            script.exported,
            vec![N_FUNCTION_NAME.to_string(), SIG_FUNCTION_NAME.to_string(), "rawValues".to_string()]
        );
        assert_eq!(script.raw_value(TIMESTAMP_VAR_NAME), Some("20123"));
        assert!(script.wrappers[SIG_FUNCTION_NAME].contains("return Yz(64, input);"));
        assert!(script.wrappers[N_FUNCTION_NAME].contains("return Pn(input);"));
        assert!(script.output.starts_with("const window = Object.assign({}, globalThis);"));
        assert!(script.output.contains("const exportedVars = (function(g) {"));
        assert!(script.output.contains("\"signatureTimestampVar\": \"20123\""));
        assert!(script.output.contains("//#region --- start [sigFunction] ---"));
        assert!(!script.output.contains("signatureTimestamp:"));
        assert!(script.output.ends_with("})({});\n"));
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let first = assemble(PLAYER, default_targets(), AssemblyOptions::default()).unwrap();
        let second = assemble(PLAYER, default_targets(), AssemblyOptions::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.output, second.output);
    }

    #[test]
    fn test_unsafe_initializers_are_neutralized() {
        let script = assemble(PLAYER, default_targets(), AssemblyOptions::default()).unwrap();

        assert!(!script.output.contains("fetch("));
        assert!(script.fragments.contains(&"  var Lk = undefined;".to_string()));
        assert!(script.fragments.contains(&"  // Skipped Wq.boot assignment.".to_string()));
        assert!(!script.output.contains("Jz()"));
    }

    #[test]
    fn test_unfiltered_output_keeps_initializers() {
        let script = assemble(
            PLAYER,
            default_targets(),
            AssemblyOptions::default().with_safety(None),
        )
        .unwrap();

        assert!(script.output.contains("var Lk = fetch(\"https://tracker.invalid/ping\");"));
        assert!(script.output.contains("Wq.boot = Jz();"));
    }

    #[test]
    fn test_forward_reference_rendered_first() {
        let script = assemble(
            REVERSE,
            vec![ExtractionTarget::signature()],
            AssemblyOptions::default(),
        )
        .unwrap();

        let position = |needle: &str| script.output.find(needle).unwrap();
        assert!(position("var Gy =") < position("var Hx ="));
        assert!(position("var Hx =") < position("var Fm ="));
        assert!(script.wrappers[SIG_FUNCTION_NAME].contains("return Hx.dc(input);"));
        assert_eq!(script.raw_values, Some(BTreeMap::new()));
    }

    #[test]
    fn test_member_method_rendered_after_its_object() {
        let text = r#"(function (g) {
            var Hx = {};
            var Fm = function (a, b, c) { b && (b = Hx.dc(decodeURIComponent(b)), a.set(c, encodeURIComponent(b))); };
            var Mx = 1;
            Hx.dc = function (a) { return a.split("").reverse().join(""); };
            var Zz = 2;
        })({});"#;
        let script = assemble(
            text,
            vec![ExtractionTarget::signature()],
            AssemblyOptions::default(),
        )
        .unwrap();

        let position = |needle: &str| script.output.find(needle).unwrap();
        assert!(position("var Hx = {};") < position("Hx.dc = function"));
        assert!(position("Hx.dc = function") < position("var Fm ="));
        assert!(script.wrappers[SIG_FUNCTION_NAME].contains("return Hx.dc(input);"));
        assert!(!script.output.contains("var Zz"));
    }

    #[test]
    fn test_member_of_neutralized_object_is_incomplete() {
        let text = r#"(function (g) {
            var Hx = { dc: function (a) { return a; }, t: Jz() };
            var Jz = function () { return 1; };
            var Fm = function (a, b, c) { b && (b = Hx.dc(decodeURIComponent(b)), a.set(c, encodeURIComponent(b))); };
        })({});"#;
        let err = assemble(
            text,
            vec![ExtractionTarget::signature()],
            AssemblyOptions::default(),
        )
        .unwrap_err();
        match err {
            SliceError::IncompleteAssembly(names) => assert_eq!(names, vec!["Hx.dc".to_string()]),
            other => panic!("unexpected error: {}", other),
        }

        let script = assemble(
            text,
            vec![ExtractionTarget::signature()],
            AssemblyOptions::default().with_safety(None),
        )
        .unwrap();
        assert!(script.output.contains("t: Jz()"));
        assert!(script.wrappers[SIG_FUNCTION_NAME].contains("return Hx.dc(input);"));
    }

    #[test]
    fn test_wrapper_keeps_literal_arguments() {
        let text = r#"(function (g) {
            var Yz = function (a, b, c, d, e) { return e; };
            var Ab = function (a, b, c) { b && (b = Yz(-1, true, null, undefined, decodeURIComponent(b)), a.set(c, encodeURIComponent(b))); };
        })({});"#;
        let script = assemble(
            text,
            vec![ExtractionTarget::signature()],
            AssemblyOptions::default(),
        )
        .unwrap();

        assert!(script.wrappers[SIG_FUNCTION_NAME]
            .contains("return Yz(-1, true, null, undefined, input);"));
    }

    #[test]
    fn test_uncallable_n_target_has_no_raw_value() {
        let text = r#"(function (g) {
            var Pn = 5;
            var Xs = [Pn];
        })({});"#;
        let script = assemble(
            text,
            vec![ExtractionTarget::n_transform()],
            AssemblyOptions::default(),
        )
        .unwrap();

        assert!(!script.exports(N_FUNCTION_NAME));
        assert!(script.wrappers.is_empty());
        assert_eq!(script.raw_values, Some(BTreeMap::new()));
        assert_eq!(script.raw_value(N_FUNCTION_NAME), None);
    }

    #[test]
    fn test_predeclared_names() {
        let text = r#"(function (g) {
            var Sv;
            var Nq = function (a) { return Sv(a); };
            Sv = function (a) { return a + "!"; };
            var Xs = [Nq];
        })({});"#;
        let script = assemble(
            text,
            vec![ExtractionTarget::n_transform()],
            AssemblyOptions::default(),
        )
        .unwrap();

        assert_eq!(script.predeclared, vec!["Sv".to_string()]);
        assert!(script.output.contains("  var Sv;\n"));
        assert!(script.output.contains("  Sv = function (a) { return a + \"!\"; };"));
        assert!(script.output.contains("  var Nq = function (a) { return Sv(a); };"));
    }

    #[test]
    fn test_forced_predeclaration() {
        let script = assemble(
            REVERSE,
            vec![ExtractionTarget::signature()],
            AssemblyOptions::default().with_force_var_predeclaration(true),
        )
        .unwrap();

        assert_eq!(script.predeclared, vec!["Fm", "Hx", "Gy"]);
        assert!(script.output.contains("  var Fm, Hx, Gy;\n"));
        assert!(script.output.contains("  Hx = {"));
    }

    #[test]
    fn test_raw_values_disabled() {
        let script = assemble(
            PLAYER,
            default_targets(),
            AssemblyOptions::default().with_export_raw_values(false),
        )
        .unwrap();

        assert_eq!(script.raw_values, None);
        assert!(!script.output.contains("rawValues"));
        assert!(!script.exports("rawValues"));
    }

    #[test]
    fn test_depth_limit_reports_incomplete_assembly() {
        let err = assemble(
            REVERSE,
            vec![ExtractionTarget::signature()],
            AssemblyOptions::default().with_max_depth(0),
        )
        .unwrap_err();

        match err {
            SliceError::IncompleteAssembly(names) => assert_eq!(names, vec!["Gy".to_string()]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unready_targets_are_not_rendered() {
        let text = r#"(function (g) {
            var Pn = function (a) { return Qz(a); };
            var Xs = [Pn];
        })({});"#;
        let script = assemble(text, default_targets(), AssemblyOptions::default()).unwrap();

        assert!(script.fragments.is_empty());
        assert!(script.wrappers.is_empty());
        assert_eq!(script.exported, vec!["rawValues".to_string()]);
    }
}
