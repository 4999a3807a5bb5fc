//! Single forward pass over the module wrapper body, recording top-level
//! declarations and their direct dependencies

use crate::js::builtins::is_global;
use crate::js::scope::{FreeNameWalker, NameLookup};
use crate::js::source::{assignment_target_path, property_key_name, strip_parens, SourceModel};
use oxc_ast::ast::*;
use oxc_ast_visit::Visit;
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Node that introduced a declaration
#[derive(Debug, Clone, Copy)]
pub enum DeclarationSite<'s, 'a> {
    /// `var name = ...` (also `let`/`const`)
    Variable(&'s VariableDeclarator<'a>),
    /// `a.b = ...`
    Member(&'s AssignmentExpression<'a>),
    /// `function name() {}`
    Function(&'s Function<'a>),
}

/// A top-level binding of the player module
#[derive(Debug, Clone)]
pub struct Declaration<'s, 'a> {
    pub name: String,
    pub site: DeclarationSite<'s, 'a>,
    /// Current initializer; a later plain assignment to a predeclared
    /// variable replaces it
    pub init: Option<&'s Expression<'a>>,
    pub dependencies: BTreeSet<String>,
    pub dependents: BTreeSet<String>,
    pub predeclared: bool,
}

impl<'s, 'a> Declaration<'s, 'a> {
    pub fn is_variable(&self) -> bool {
        matches!(self.site, DeclarationSite::Variable(_))
    }

    pub fn is_member(&self) -> bool {
        matches!(self.site, DeclarationSite::Member(_))
    }

    /// Function expression a variable is initialized with
    pub fn function_init(&self) -> Option<&'s Function<'a>> {
        if !self.is_variable() {
            return None;
        }
        match strip_parens(self.init?) {
            Expression::FunctionExpression(func) => Some(&**func),
            _ => None,
        }
    }

    /// Check if the declaration binds something callable
    pub fn is_callable(&self) -> bool {
        match self.site {
            DeclarationSite::Function(_) => true,
            _ => matches!(
                self.init.map(strip_parens),
                Some(Expression::FunctionExpression(_) | Expression::ArrowFunctionExpression(_))
            ),
        }
    }

    pub fn span(&self) -> Span {
        match self.site {
            DeclarationSite::Variable(declarator) => declarator.span,
            DeclarationSite::Member(assign) => assign.span,
            DeclarationSite::Function(func) => func.span,
        }
    }
}

/// Declarations by name plus dependents registered before their target exists
#[derive(Debug, Default)]
pub struct DeclarationTable<'s, 'a> {
    declared: HashMap<String, Declaration<'s, 'a>>,
    pending_dependents: HashMap<String, BTreeSet<String>>,
    order: Vec<String>,
}

impl<'s, 'a> DeclarationTable<'s, 'a> {
    pub fn get(&self, name: &str) -> Option<&Declaration<'s, 'a>> {
        self.declared.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    /// Declarations in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &Declaration<'s, 'a>> {
        self.order.iter().filter_map(|name| self.declared.get(name))
    }

    /// Names that reference `name` without it being declared yet
    pub fn pending_dependents(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.pending_dependents.get(name)
    }

    fn insert(&mut self, mut declaration: Declaration<'s, 'a>) {
        if let Some(pending) = self.pending_dependents.remove(&declaration.name) {
            declaration.dependents.extend(pending);
        }
        match self.declared.get_mut(&declaration.name) {
            Some(existing) => {
                declaration.dependents.append(&mut existing.dependents);
                *existing = declaration;
            }
            None => {
                self.order.push(declaration.name.clone());
                self.declared.insert(declaration.name.clone(), declaration);
            }
        }
    }

    fn register_dependents(&mut self, owner: &str, dependencies: &BTreeSet<String>) {
        for dependency in dependencies {
            let dependents = match self.declared.get_mut(dependency) {
                Some(declaration) => &mut declaration.dependents,
                None => self
                    .pending_dependents
                    .entry(dependency.clone())
                    .or_default(),
            };
            dependents.insert(owner.to_string());
        }
    }

    /// Follow the dependency closure of `name`; returns the first name that
    /// does not resolve, if any.
    ///
    /// Built-ins and the module parameter always resolve. A name already
    /// visited is not followed again, so cycles count as resolved.
    pub fn first_unresolved(&self, name: &str, external: Option<&str>) -> Option<String> {
        self.closure_gaps(name, external, true).into_iter().next()
    }

    /// Every name in the closure of `name` that does not resolve
    pub fn unresolved(&self, name: &str, external: Option<&str>) -> BTreeSet<String> {
        self.closure_gaps(name, external, false)
    }

    fn closure_gaps(&self, name: &str, external: Option<&str>, first_only: bool) -> BTreeSet<String> {
        let mut missing = BTreeSet::new();
        let Some(root) = self.declared.get(name) else {
            missing.insert(name.to_string());
            return missing;
        };
        let mut seen: HashSet<&str> = HashSet::from([name]);
        let mut stack: Vec<&str> = root.dependencies.iter().map(String::as_str).collect();

        while let Some(dependency) = stack.pop() {
            if is_global(dependency) || external == Some(dependency) || !seen.insert(dependency) {
                continue;
            }
            if let Some(declaration) = self.declared.get(dependency) {
                stack.extend(declaration.dependencies.iter().map(String::as_str));
                continue;
            }
            if self.is_object_member(dependency, external) {
                continue;
            }
            missing.insert(dependency.to_string());
            if first_only {
                break;
            }
        }
        missing
    }

    /// Check whether an undeclared path `a.b` still exists at runtime: its
    /// base is the module parameter, or `a` is initialized with an object
    /// literal that defines `b`
    pub fn is_object_member(&self, path: &str, external: Option<&str>) -> bool {
        let Some((base, key)) = path.rsplit_once('.') else {
            return false;
        };
        let root = base.split('.').next().unwrap_or_default();
        if external == Some(root) {
            return true;
        }
        let Some(Expression::ObjectExpression(object)) =
            self.declared.get(base).and_then(|decl| decl.init).map(strip_parens)
        else {
            return false;
        };
        object.properties.iter().any(|property| match property {
            ObjectPropertyKind::ObjectProperty(property) => property_key_name(property) == Some(key),
            _ => false,
        })
    }
}

impl NameLookup for DeclarationTable<'_, '_> {
    fn is_declared(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// A declaration recorded (or updated) by one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub name: String,
    /// A predeclared variable received its value
    pub reassigned: bool,
}

/// Walks the module wrapper body and maintains the declaration table
pub struct Analyzer<'s, 'a> {
    source: &'s SourceModel<'a>,
    module: Option<&'s Function<'a>>,
    external: Option<String>,
    table: DeclarationTable<'s, 'a>,
}

impl<'s, 'a> Analyzer<'s, 'a> {
    pub fn new(source: &'s SourceModel<'a>) -> Self {
        let (module, external) = match find_module_wrapper(source.program()) {
            Some((func, external)) => (Some(func), external),
            None => (None, None),
        };

        Self {
            source,
            module,
            external,
            table: DeclarationTable::default(),
        }
    }

    pub fn source(&self) -> &'s SourceModel<'a> {
        self.source
    }

    /// Whether a module wrapper was found
    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    /// Name of the module wrapper's first parameter
    pub fn external(&self) -> Option<&str> {
        self.external.as_deref()
    }

    pub fn table(&self) -> &DeclarationTable<'s, 'a> {
        &self.table
    }

    /// Direct statements of the module wrapper body
    pub fn statements(&self) -> &'s [Statement<'a>] {
        self.module
            .and_then(|func| func.body.as_ref())
            .map(|body| &body.statements[..])
            .unwrap_or_default()
    }

    pub fn into_parts(self) -> (DeclarationTable<'s, 'a>, Option<String>) {
        (self.table, self.external)
    }

    /// Record whatever `statement` declares
    pub fn record_statement(&mut self, statement: &'s Statement<'a>) -> Vec<Observed> {
        match statement {
            Statement::VariableDeclaration(decl) => decl
                .declarations
                .iter()
                .filter_map(|declarator| self.record_variable(declarator))
                .collect(),
            Statement::FunctionDeclaration(func) => self.record_function(func).into_iter().collect(),
            Statement::ExpressionStatement(stmt) => match strip_parens(&stmt.expression) {
                Expression::AssignmentExpression(assign) => {
                    self.record_assignment(assign).into_iter().collect()
                }
                Expression::SequenceExpression(sequence) => sequence
                    .expressions
                    .iter()
                    .filter_map(|expr| match strip_parens(expr) {
                        Expression::AssignmentExpression(assign) => self.record_assignment(assign),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn record_variable(&mut self, declarator: &'s VariableDeclarator<'a>) -> Option<Observed> {
        let BindingPattern::BindingIdentifier(id) = &declarator.id else {
            return None;
        };
        let name = id.name.to_string();
        let init = declarator.init.as_ref();
        let dependencies = init
            .filter(|expr| references_names(expr))
            .map(|expr| self.expression_dependencies(expr))
            .unwrap_or_default();
        let predeclared = init.is_none() && matches!(declarator.kind, VariableDeclarationKind::Var);

        self.table.register_dependents(&name, &dependencies);
        self.table.insert(Declaration {
            name: name.clone(),
            site: DeclarationSite::Variable(declarator),
            init,
            dependencies,
            dependents: BTreeSet::new(),
            predeclared,
        });

        Some(Observed {
            name,
            reassigned: false,
        })
    }

    fn record_function(&mut self, func: &'s Function<'a>) -> Option<Observed> {
        let name = func.id.as_ref()?.name.to_string();
        let mut walker = FreeNameWalker::new(&self.table);
        walker.visit_function(func, ScopeFlags::Function);
        let dependencies = walker.into_names();

        self.table.register_dependents(&name, &dependencies);
        self.table.insert(Declaration {
            name: name.clone(),
            site: DeclarationSite::Function(func),
            init: None,
            dependencies,
            dependents: BTreeSet::new(),
            predeclared: false,
        });

        Some(Observed {
            name,
            reassigned: false,
        })
    }

    fn record_assignment(&mut self, assign: &'s AssignmentExpression<'a>) -> Option<Observed> {
        if assign.operator != AssignmentOperator::Assign {
            return None;
        }

        match &assign.left {
            AssignmentTarget::AssignmentTargetIdentifier(id) => {
                let name = id.name.as_str();
                if !self.table.get(name).is_some_and(|decl| decl.predeclared) {
                    return None;
                }
                let dependencies = if references_names(&assign.right) {
                    Some(self.expression_dependencies(&assign.right))
                } else {
                    None
                };
                if let Some(dependencies) = &dependencies {
                    self.table.register_dependents(name, dependencies);
                }
                let declaration = self.table.declared.get_mut(name)?;
                declaration.init = Some(&assign.right);
                if let Some(dependencies) = dependencies {
                    declaration.dependencies = dependencies;
                }
                debug!("Predeclared {} assigned", name);

                Some(Observed {
                    name: name.to_string(),
                    reassigned: true,
                })
            }
            AssignmentTarget::StaticMemberExpression(_)
            | AssignmentTarget::ComputedMemberExpression(_) => {
                let name = assignment_target_path(&assign.left)?;
                if self.table.contains(&name) {
                    return None;
                }
                let mut dependencies = if references_names(&assign.right) {
                    self.expression_dependencies(&assign.right)
                } else {
                    BTreeSet::new()
                };
                if let Some(base) = member_base(&name) {
                    dependencies.insert(base);
                }

                self.table.register_dependents(&name, &dependencies);
                self.table.insert(Declaration {
                    name: name.clone(),
                    site: DeclarationSite::Member(assign),
                    init: Some(&assign.right),
                    dependencies,
                    dependents: BTreeSet::new(),
                    predeclared: false,
                });

                Some(Observed {
                    name,
                    reassigned: false,
                })
            }
            _ => None,
        }
    }

    fn expression_dependencies(&self, expr: &Expression<'a>) -> BTreeSet<String> {
        let mut walker = FreeNameWalker::new(&self.table);
        walker.visit_expression(expr);
        walker.into_names()
    }
}

/// Base binding a member declaration hangs off, with `.prototype` dropped
fn member_base(name: &str) -> Option<String> {
    let (base, _) = name.rsplit_once('.')?;
    if base == "this" || base.starts_with("this.") {
        return None;
    }
    Some(base.replacen(".prototype", "", 1))
}

/// Whether an initializer can reference other names at all
fn references_names(expr: &Expression<'_>) -> bool {
    !matches!(
        strip_parens(expr),
        Expression::StringLiteral(_)
            | Expression::NumericLiteral(_)
            | Expression::BooleanLiteral(_)
            | Expression::NullLiteral(_)
            | Expression::BigIntLiteral(_)
            | Expression::RegExpLiteral(_)
            | Expression::ThisExpression(_)
    )
}

/// Locate the immediately-invoked function wrapping the player module.
///
/// Accepts `(function (g) {...})(x)`, `.call(...)`/`.apply(...)` on the same
/// function and a leading unary operator (`!function(){}()`).
pub fn find_module_wrapper<'s, 'a>(
    program: &'s Program<'a>,
) -> Option<(&'s Function<'a>, Option<String>)> {
    for statement in &program.body {
        let Statement::ExpressionStatement(stmt) = statement else {
            continue;
        };
        let mut expr = strip_parens(&stmt.expression);
        if let Expression::UnaryExpression(unary) = expr {
            expr = strip_parens(&unary.argument);
        }
        let Expression::CallExpression(call) = expr else {
            continue;
        };

        let func = match strip_parens(&call.callee) {
            Expression::FunctionExpression(func) => &**func,
            Expression::StaticMemberExpression(member)
                if member.property.name == "call" || member.property.name == "apply" =>
            {
                match strip_parens(&member.object) {
                    Expression::FunctionExpression(func) => &**func,
                    _ => continue,
                }
            }
            _ => continue,
        };
        if func.body.is_none() {
            continue;
        }

        let external = func.params.items.first().and_then(|param| match &param.pattern {
            BindingPattern::BindingIdentifier(id) => Some(id.name.to_string()),
            _ => None,
        });
        debug!(
            "Module wrapper found at {} with parameter {:?}",
            func.span().start,
            external
        );
        return Some((func, external));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;

    fn analyze_all<'s, 'a>(analyzer: &mut Analyzer<'s, 'a>) -> Vec<Observed> {
        let mut observed = Vec::new();
        for statement in analyzer.statements() {
            observed.extend(analyzer.record_statement(statement));
        }
        observed
    }

    #[test]
    fn test_module_wrapper_parameter() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(
            &allocator,
            "var _yt_player = {}; (function (g) { var a = 1; }).call(this, _yt_player);",
        )
        .unwrap();
        let analyzer = Analyzer::new(&model);
        assert!(analyzer.has_module());
        assert_eq!(analyzer.external(), Some("g"));
        assert_eq!(analyzer.statements().len(), 1);
    }

    #[test]
    fn test_no_module_wrapper() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(&allocator, "var a = function () {};").unwrap();
        let mut analyzer = Analyzer::new(&model);
        assert!(!analyzer.has_module());
        assert!(analyze_all(&mut analyzer).is_empty());
    }

    #[test]
    fn test_forward_references_are_tracked() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(
            &allocator,
            "(function (g) { var a = function () { return b.c(1); }; var b = { c: function (x) { return x; } }; })({});",
        )
        .unwrap();
        let mut analyzer = Analyzer::new(&model);

        let first = analyzer.record_statement(&analyzer.statements()[0]);
        assert_eq!(first[0].name, "a");
        assert_eq!(
            analyzer.table().pending_dependents("b").unwrap(),
            &BTreeSet::from(["a".to_string()])
        );
        assert_eq!(analyzer.table().first_unresolved("a", Some("g")).as_deref(), Some("b"));

        analyzer.record_statement(&analyzer.statements()[1]);
        let b = analyzer.table().get("b").unwrap();
        assert!(b.dependents.contains("a"));
        assert!(analyzer.table().pending_dependents("b").is_none());
        assert_eq!(analyzer.table().first_unresolved("a", Some("g")), None);
    }

    #[test]
    fn test_predeclared_assignment() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(
            &allocator,
            "(function (g) { var k; var u = 2; k = function () { return z; }; u = 3; })({});",
        )
        .unwrap();
        let mut analyzer = Analyzer::new(&model);
        let observed = analyze_all(&mut analyzer);

        assert_eq!(
            observed,
            vec![
                Observed { name: "k".into(), reassigned: false },
                Observed { name: "u".into(), reassigned: false },
                Observed { name: "k".into(), reassigned: true },
            ]
        );
        let k = analyzer.table().get("k").unwrap();
        assert!(k.predeclared);
        assert!(k.is_callable());
        assert_eq!(k.dependencies, BTreeSet::from(["z".to_string()]));
    }

    #[test]
    fn test_member_declarations() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(
            &allocator,
            "(function (g) { var Q = function () {}; Q.prototype.run = function () { return this.x; }; g.Ab[\"cd\"] = 5; Q.prototype.run = null; })({});",
        )
        .unwrap();
        let mut analyzer = Analyzer::new(&model);
        analyze_all(&mut analyzer);
        let table = analyzer.table();

        let run = table.get("Q.prototype.run").unwrap();
        assert!(run.is_member());
        assert!(run.is_callable());
        assert_eq!(run.dependencies, BTreeSet::from(["Q".to_string()]));

        let cd = table.get("g.Ab.cd").unwrap();
        assert_eq!(cd.dependencies, BTreeSet::from(["g.Ab".to_string()]));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_function_declarations_and_sequences() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(
            &allocator,
            "(function (g) { function h(a) { return w(a); } g.x = 1, g.y = h; })({});",
        )
        .unwrap();
        let mut analyzer = Analyzer::new(&model);
        let names: Vec<String> = analyze_all(&mut analyzer)
            .into_iter()
            .map(|observed| observed.name)
            .collect();
        assert_eq!(names, vec!["h", "g.x", "g.y"]);

        let table = analyzer.table();
        assert_eq!(table.get("h").unwrap().dependencies, BTreeSet::from(["w".to_string()]));
        assert_eq!(
            table.unresolved("g.y", Some("g")),
            BTreeSet::from(["w".to_string()])
        );
    }

    #[test]
    fn test_member_paths_resolve_through_base() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(
            &allocator,
            "(function (g) { var o = { f: function (x) { return x; }, \"s\": 1 }; var a = function (x) { return o.f(x) + o.s + g.Kt.v; }; var h = function (x) { return o.h(x); }; var m = function () { return q.r; }; })({});",
        )
        .unwrap();
        let mut analyzer = Analyzer::new(&model);
        analyze_all(&mut analyzer);
        let table = analyzer.table();

        let a = table.get("a").unwrap();
        assert!(a.dependencies.contains("o.f"));
        assert!(a.dependencies.contains("o"));
        assert_eq!(table.first_unresolved("a", Some("g")), None);
        assert!(table.is_object_member("o.s", Some("g")));

        // The object exists but never defines `h`
        assert!(!table.is_object_member("o.h", Some("g")));
        assert_eq!(table.first_unresolved("h", Some("g")).as_deref(), Some("o.h"));
        assert_eq!(
            table.unresolved("m", Some("g")),
            BTreeSet::from(["q".to_string(), "q.r".to_string()])
        );
    }

    #[test]
    fn test_cycles_resolve() {
        let allocator = Allocator::default();
        let model = SourceModel::parse(
            &allocator,
            "(function (g) { var a = function () { return b(); }; var b = function () { return a(); }; })({});",
        )
        .unwrap();
        let mut analyzer = Analyzer::new(&model);
        analyze_all(&mut analyzer);
        assert_eq!(analyzer.table().first_unresolved("a", Some("g")), None);
        assert!(analyzer.table().get("a").unwrap().dependents.contains("b"));
    }
}
