//! Lexical scope tracking and free-name collection

use crate::js::builtins::is_global;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_syntax::scope::ScopeFlags;
use std::collections::{BTreeSet, HashSet};

/// Answers whether a name is a recorded top-level declaration
pub trait NameLookup {
    fn is_declared(&self, name: &str) -> bool;
}

impl NameLookup for HashSet<String> {
    fn is_declared(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// Names bound by a pattern, without descending into default values
#[derive(Default)]
struct BindingNames {
    names: Vec<String>,
}

impl<'a> Visit<'a> for BindingNames {
    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        self.names.push(it.name.to_string());
    }

    fn visit_expression(&mut self, _it: &Expression<'a>) {}
}

/// `var` and function-declaration names of a function body, through nested
/// blocks but not nested functions
#[derive(Default)]
struct HoistedNames {
    names: Vec<String>,
}

impl<'a> Visit<'a> for HoistedNames {
    fn visit_variable_declaration(&mut self, it: &VariableDeclaration<'a>) {
        if matches!(it.kind, VariableDeclarationKind::Var) {
            for declarator in &it.declarations {
                self.names.extend(pattern_names(&declarator.id));
            }
        }
    }

    fn visit_function(&mut self, it: &Function<'a>, _flags: ScopeFlags) {
        if matches!(it.r#type, FunctionType::FunctionDeclaration) {
            if let Some(id) = &it.id {
                self.names.push(id.name.to_string());
            }
        }
    }

    fn visit_class(&mut self, _it: &Class<'a>) {}

    fn visit_expression(&mut self, _it: &Expression<'a>) {}
}

pub fn pattern_names(pattern: &BindingPattern<'_>) -> Vec<String> {
    let mut collector = BindingNames::default();
    collector.visit_binding_pattern(pattern);
    collector.names
}

fn parameter_names(params: &FormalParameters<'_>) -> Vec<String> {
    let mut collector = BindingNames::default();
    collector.visit_formal_parameters(params);
    collector.names
}

/// Names hoisted to the top of a function or script
pub fn hoisted_names(statements: &[Statement<'_>]) -> Vec<String> {
    let mut collector = HoistedNames::default();
    for statement in statements {
        collector.visit_statement(statement);
    }
    collector.names
}

/// `let`, `const`, class and function names bound directly by a statement list
pub fn lexical_names(statements: &[Statement<'_>]) -> Vec<String> {
    let mut names = Vec::new();
    for statement in statements {
        match statement {
            Statement::VariableDeclaration(decl)
                if !matches!(decl.kind, VariableDeclarationKind::Var) =>
            {
                for declarator in &decl.declarations {
                    names.extend(pattern_names(&declarator.id));
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    names.push(id.name.to_string());
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    names.push(id.name.to_string());
                }
            }
            _ => {}
        }
    }
    names
}

fn body_names(statements: &[Statement<'_>]) -> impl Iterator<Item = String> {
    hoisted_names(statements)
        .into_iter()
        .chain(lexical_names(statements))
}

/// Collects the names a subtree references but does not bind.
///
/// Plain identifiers are reported by name. A static member chain is also
/// reported as one dotted name (`a.b`) when that path is already declared, or
/// when its base is a free identifier that is not a global.
pub struct FreeNameWalker<'t, L: NameLookup + ?Sized> {
    scopes: Vec<HashSet<String>>,
    lookup: &'t L,
    found: BTreeSet<String>,
}

impl<'t, L: NameLookup + ?Sized> FreeNameWalker<'t, L> {
    pub fn new(lookup: &'t L) -> Self {
        Self {
            scopes: vec![HashSet::new()],
            lookup,
            found: BTreeSet::new(),
        }
    }

    /// Walk a whole script, treating its own top-level bindings as bound
    pub fn walk_program(mut self, program: &Program<'_>) -> BTreeSet<String> {
        self.push_scope(body_names(&program.body));
        self.visit_program(program);
        self.found
    }

    pub fn into_names(self) -> BTreeSet<String> {
        self.found
    }

    fn push_scope(&mut self, names: impl IntoIterator<Item = String>) {
        self.scopes.push(names.into_iter().collect());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn member_dependency(&self, member: &StaticMemberExpression<'_>) -> Option<String> {
        let path = crate::js::source::member_path(&member.object)
            .map(|object| format!("{}.{}", object, member.property.name))?;
        let base = path.split('.').next().unwrap_or_default();
        if base == "this" || self.is_local(base) {
            return None;
        }
        if self.lookup.is_declared(&path) {
            return Some(path);
        }

        // Undeclared bases are kept too so the path waits for its declaration
        match crate::js::source::strip_parens(&member.object) {
            Expression::Identifier(object) => (!is_global(object.name.as_str())).then_some(path),
            _ => None,
        }
    }
}

impl<'a, L: NameLookup + ?Sized> Visit<'a> for FreeNameWalker<'_, L> {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        let name = it.name.as_str();
        if !self.is_local(name) && !is_global(name) {
            self.found.insert(name.to_string());
        }
    }

    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if let Some(path) = self.member_dependency(it) {
            self.found.insert(path);
        }
        walk::walk_static_member_expression(self, it);
    }

    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        let mut names = parameter_names(&it.params);
        if let Some(id) = &it.id {
            names.push(id.name.to_string());
        }
        if let Some(body) = &it.body {
            names.extend(body_names(&body.statements));
        }

        self.push_scope(names);
        walk::walk_function(self, it, flags);
        self.pop_scope();
    }

    fn visit_arrow_function_expression(&mut self, it: &ArrowFunctionExpression<'a>) {
        let mut names = parameter_names(&it.params);
        names.extend(body_names(&it.body.statements));

        self.push_scope(names);
        walk::walk_arrow_function_expression(self, it);
        self.pop_scope();
    }

    fn visit_block_statement(&mut self, it: &BlockStatement<'a>) {
        self.push_scope(lexical_names(&it.body));
        walk::walk_block_statement(self, it);
        self.pop_scope();
    }

    fn visit_catch_clause(&mut self, it: &CatchClause<'a>) {
        let names = it
            .param
            .as_ref()
            .map(|param| pattern_names(&param.pattern))
            .unwrap_or_default();

        self.push_scope(names);
        walk::walk_catch_clause(self, it);
        self.pop_scope();
    }

    fn visit_for_statement(&mut self, it: &ForStatement<'a>) {
        let names = match &it.init {
            Some(ForStatementInit::VariableDeclaration(decl)) => lexical_declaration_names(decl),
            _ => Vec::new(),
        };

        self.push_scope(names);
        walk::walk_for_statement(self, it);
        self.pop_scope();
    }

    fn visit_for_in_statement(&mut self, it: &ForInStatement<'a>) {
        let names = match &it.left {
            ForStatementLeft::VariableDeclaration(decl) => lexical_declaration_names(decl),
            _ => Vec::new(),
        };

        self.push_scope(names);
        walk::walk_for_in_statement(self, it);
        self.pop_scope();
    }

    fn visit_for_of_statement(&mut self, it: &ForOfStatement<'a>) {
        let names = match &it.left {
            ForStatementLeft::VariableDeclaration(decl) => lexical_declaration_names(decl),
            _ => Vec::new(),
        };

        self.push_scope(names);
        walk::walk_for_of_statement(self, it);
        self.pop_scope();
    }

    fn visit_class(&mut self, it: &Class<'a>) {
        let names = it.id.as_ref().map(|id| id.name.to_string());

        self.push_scope(names);
        walk::walk_class(self, it);
        self.pop_scope();
    }
}

fn lexical_declaration_names(decl: &VariableDeclaration<'_>) -> Vec<String> {
    if matches!(decl.kind, VariableDeclarationKind::Var) {
        return Vec::new();
    }
    decl.declarations
        .iter()
        .flat_map(|declarator| pattern_names(&declarator.id))
        .collect()
}
