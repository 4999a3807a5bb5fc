//! Structural matchers for the functions and values worth extracting.
//!
//! Player releases rename everything, so matchers only look at the shape of
//! a declaration's syntax tree, never at names chosen by the minifier.

use crate::js::analyzer::Declaration;
use crate::js::source::{member_path, property_key_name, strip_parens};
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};

/// Node captured by a matcher, used later for wrappers or raw values
#[derive(Debug, Clone)]
pub enum MatchContext<'s, 'a> {
    /// Call that performs the transform, e.g. `Yz(64, decodeURIComponent(b))`
    Call(&'s CallExpression<'a>),
    /// Reference to the transform function
    Identifier(&'s IdentifierReference<'a>),
    /// Object property holding a literal
    Property { key: String, value: Span },
}

/// Recognizes one extraction target by shape
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn match_declaration<'s, 'a>(
        &self,
        declaration: &Declaration<'s, 'a>,
    ) -> Option<MatchContext<'s, 'a>>;
}

/// Three-parameter function containing
/// `x && (x = helper(..., decodeURIComponent(x)), ...)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureMatcher;

impl Matcher for SignatureMatcher {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn match_declaration<'s, 'a>(
        &self,
        declaration: &Declaration<'s, 'a>,
    ) -> Option<MatchContext<'s, 'a>> {
        let func = declaration.function_init()?;
        if func.params.items.len() != 3 {
            return None;
        }
        let body = func.body.as_ref()?;
        body.statements
            .iter()
            .find_map(decipher_call)
            .map(MatchContext::Call)
    }
}

fn decipher_call<'s, 'a>(statement: &'s Statement<'a>) -> Option<&'s CallExpression<'a>> {
    let Statement::ExpressionStatement(stmt) = statement else {
        return None;
    };
    let Expression::LogicalExpression(logical) = strip_parens(&stmt.expression) else {
        return None;
    };
    if logical.operator != LogicalOperator::And
        || !matches!(strip_parens(&logical.left), Expression::Identifier(_))
    {
        return None;
    }
    let Expression::SequenceExpression(sequence) = strip_parens(&logical.right) else {
        return None;
    };
    let Expression::AssignmentExpression(assign) = strip_parens(sequence.expressions.first()?)
    else {
        return None;
    };
    if assign.operator != AssignmentOperator::Assign
        || !matches!(assign.left, AssignmentTarget::AssignmentTargetIdentifier(_))
    {
        return None;
    }
    let Expression::CallExpression(call) = strip_parens(&assign.right) else {
        return None;
    };
    member_path(&call.callee)?;

    call.arguments
        .iter()
        .any(|argument| argument.as_expression().is_some_and(is_decode_call))
        .then_some(&**call)
}

fn is_decode_call(expr: &Expression<'_>) -> bool {
    let Expression::CallExpression(call) = strip_parens(expr) else {
        return false;
    };
    let decodes = matches!(
        strip_parens(&call.callee),
        Expression::Identifier(id) if id.name == "decodeURIComponent" || id.name == "decodeURI"
    );
    decodes
        && call
            .arguments
            .first()
            .and_then(|argument| argument.as_expression())
            .is_some_and(|argument| matches!(strip_parens(argument), Expression::Identifier(_)))
}

/// Variable initialized with a single-element array holding one identifier
#[derive(Debug, Clone, Copy, Default)]
pub struct NTransformMatcher;

impl Matcher for NTransformMatcher {
    fn name(&self) -> &'static str {
        "n-transform"
    }

    fn match_declaration<'s, 'a>(
        &self,
        declaration: &Declaration<'s, 'a>,
    ) -> Option<MatchContext<'s, 'a>> {
        if !declaration.is_variable() {
            return None;
        }
        let Expression::ArrayExpression(array) = strip_parens(declaration.init?) else {
            return None;
        };
        if array.elements.len() != 1 {
            return None;
        }
        match array.elements[0].as_expression().map(strip_parens) {
            Some(Expression::Identifier(id)) => Some(MatchContext::Identifier(&**id)),
            _ => None,
        }
    }
}

/// Function-valued variable whose body builds an object with the given key
#[derive(Debug, Clone)]
pub struct PropertyMatcher {
    key: String,
}

impl PropertyMatcher {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Matcher for the `signatureTimestamp` literal
    pub fn signature_timestamp() -> Self {
        Self::new("signatureTimestamp")
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Matcher for PropertyMatcher {
    fn name(&self) -> &'static str {
        "property"
    }

    fn match_declaration<'s, 'a>(
        &self,
        declaration: &Declaration<'s, 'a>,
    ) -> Option<MatchContext<'s, 'a>> {
        let body = declaration.function_init()?.body.as_ref()?;
        let mut finder = PropertyFinder {
            key: &self.key,
            found: None,
        };
        finder.visit_function_body(body);

        finder.found.map(|value| MatchContext::Property {
            key: self.key.clone(),
            value,
        })
    }
}

struct PropertyFinder<'k> {
    key: &'k str,
    found: Option<Span>,
}

impl<'a> Visit<'a> for PropertyFinder<'_> {
    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        if self.found.is_some() {
            return;
        }
        if property_key_name(it) == Some(self.key) {
            self.found = Some(it.value.span());
            return;
        }
        walk::walk_object_property(self, it);
    }
}
