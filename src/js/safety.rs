//! Side-effect classification of initializers

use crate::js::analyzer::DeclarationTable;
use crate::js::builtins::{is_pure_callee, is_pure_method};
use crate::js::source::strip_parens;
use oxc_ast::ast::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How strictly initializers are filtered before being emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    /// Literals, functions, identifiers and calls to known pure built-ins
    Strict,
    /// Also member access, conditionals, sequences and calls through safe
    /// member chains
    Loose,
}

impl fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyMode::Strict => write!(f, "strict"),
            SafetyMode::Loose => write!(f, "loose"),
        }
    }
}

impl FromStr for SafetyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(SafetyMode::Strict),
            "loose" => Ok(SafetyMode::Loose),
            _ => Err(format!("Unknown safety mode: {}", s)),
        }
    }
}

/// Decides whether an initializer can be evaluated without running
/// arbitrary player logic
pub struct SafetyClassifier<'t, 's, 'a> {
    mode: SafetyMode,
    table: &'t DeclarationTable<'s, 'a>,
}

impl<'t, 's, 'a> SafetyClassifier<'t, 's, 'a> {
    pub fn new(mode: SafetyMode, table: &'t DeclarationTable<'s, 'a>) -> Self {
        Self { mode, table }
    }

    pub fn mode(&self) -> SafetyMode {
        self.mode
    }

    fn loose(&self) -> bool {
        self.mode == SafetyMode::Loose
    }

    pub fn is_safe(&self, expr: &Expression<'_>) -> bool {
        match strip_parens(expr) {
            Expression::StringLiteral(_)
            | Expression::NumericLiteral(_)
            | Expression::BooleanLiteral(_)
            | Expression::NullLiteral(_)
            | Expression::BigIntLiteral(_)
            | Expression::RegExpLiteral(_) => true,
            Expression::FunctionExpression(_)
            | Expression::ArrowFunctionExpression(_)
            | Expression::Identifier(_) => true,
            Expression::TemplateLiteral(template) => {
                template.expressions.iter().all(|e| self.is_safe(e))
            }
            Expression::ArrayExpression(array) => array.elements.iter().all(|element| match element {
                ArrayExpressionElement::SpreadElement(_) => false,
                ArrayExpressionElement::Elision(_) => true,
                other => other.as_expression().is_some_and(|e| self.is_safe(e)),
            }),
            Expression::ObjectExpression(object) => {
                object.properties.iter().all(|property| match property {
                    ObjectPropertyKind::ObjectProperty(prop) => {
                        !prop.computed
                            && prop.kind == PropertyKind::Init
                            && is_inert_value(&prop.value)
                    }
                    ObjectPropertyKind::SpreadProperty(_) => false,
                })
            }
            Expression::CallExpression(call) => self.is_safe_call(call),
            Expression::NewExpression(construct) => match strip_parens(&construct.callee) {
                Expression::Identifier(id) if is_pure_callee(&id.name) || self.loose() => {
                    self.are_safe_args(&construct.arguments)
                }
                _ => false,
            },
            Expression::UnaryExpression(unary) => self.is_safe(&unary.argument),
            Expression::StaticMemberExpression(member) => self.loose() && self.is_safe(&member.object),
            Expression::ComputedMemberExpression(member) => {
                self.loose() && self.is_safe(&member.expression) && self.is_safe(&member.object)
            }
            Expression::BinaryExpression(binary) => {
                self.is_safe(&binary.left) && self.is_safe(&binary.right)
            }
            Expression::LogicalExpression(logical) => {
                self.is_safe(&logical.left) && self.is_safe(&logical.right)
            }
            Expression::ConditionalExpression(cond) => {
                self.loose()
                    && self.is_safe(&cond.test)
                    && self.is_safe(&cond.consequent)
                    && self.is_safe(&cond.alternate)
            }
            Expression::SequenceExpression(sequence) => {
                self.loose() && sequence.expressions.iter().all(|e| self.is_safe(e))
            }
            Expression::AssignmentExpression(assign) => self.is_safe_assignment(assign),
            _ => false,
        }
    }

    fn is_safe_call(&self, call: &CallExpression<'_>) -> bool {
        match strip_parens(&call.callee) {
            Expression::Identifier(id) => {
                is_pure_callee(&id.name) && self.are_safe_args(&call.arguments)
            }
            Expression::StaticMemberExpression(member) => {
                self.is_safe(&member.object)
                    && (self.loose() || is_pure_method(&member.property.name))
                    && self.are_safe_args(&call.arguments)
            }
            Expression::ComputedMemberExpression(member) => {
                self.loose()
                    && self.is_safe(&member.object)
                    && self.is_safe(&member.expression)
                    && self.are_safe_args(&call.arguments)
            }
            _ => false,
        }
    }

    fn are_safe_args(&self, arguments: &[Argument<'_>]) -> bool {
        arguments.iter().all(|argument| match argument {
            Argument::SpreadElement(_) => false,
            other => other.as_expression().is_some_and(|e| self.is_safe(e)),
        })
    }

    /// Chained assignment inside an initializer: only into something that
    /// already exists in the table
    fn is_safe_assignment(&self, assign: &AssignmentExpression<'_>) -> bool {
        let target_known = match &assign.left {
            AssignmentTarget::AssignmentTargetIdentifier(id) => self.table.contains(&id.name),
            AssignmentTarget::StaticMemberExpression(member) => match strip_parens(&member.object) {
                Expression::Identifier(object) => self
                    .table
                    .get(&object.name)
                    .is_some_and(|declaration| declaration.init.is_some()),
                _ => false,
            },
            _ => false,
        };
        target_known && self.is_safe(&assign.right)
    }
}

fn is_inert_value(value: &Expression<'_>) -> bool {
    matches!(
        strip_parens(value),
        Expression::FunctionExpression(_)
            | Expression::ArrowFunctionExpression(_)
            | Expression::StringLiteral(_)
            | Expression::NumericLiteral(_)
            | Expression::BooleanLiteral(_)
            | Expression::NullLiteral(_)
            | Expression::BigIntLiteral(_)
            | Expression::RegExpLiteral(_)
    )
}

/// Neutral value that keeps a binding alive without running its initializer
pub fn fallback_for(init: Option<&Expression<'_>>) -> &'static str {
    match init.map(strip_parens) {
        Some(
            Expression::ObjectExpression(_)
            | Expression::NewExpression(_)
            | Expression::StaticMemberExpression(_)
            | Expression::ComputedMemberExpression(_)
            | Expression::PrivateFieldExpression(_)
            | Expression::LogicalExpression(_),
        ) => "{}",
        Some(Expression::ArrayExpression(_)) => "[]",
        _ => "undefined",
    }
}
