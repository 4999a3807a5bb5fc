//! Parsed player script plus its original text

use crate::error::SliceError;
use crate::Result;
use oxc_allocator::Allocator;
use oxc_ast::ast::{AssignmentTarget, Expression, ObjectProperty, Program, PropertyKey};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};

/// Syntax tree of a player script together with the text it was parsed from
pub struct SourceModel<'a> {
    text: &'a str,
    program: Program<'a>,
}

impl<'a> SourceModel<'a> {
    /// Parse `text` as a classic (non-module) script
    pub fn parse(allocator: &'a Allocator, text: &'a str) -> Result<Self> {
        let source_type = SourceType::default().with_module(false);
        let ret = Parser::new(allocator, text, source_type).parse();

        if let Some(first) = ret.errors.first() {
            return Err(SliceError::Parse {
                message: first.to_string(),
                count: ret.errors.len(),
            });
        }
        if ret.panicked {
            return Err(SliceError::Parse {
                message: "parser aborted".to_string(),
                count: 0,
            });
        }

        Ok(Self {
            text,
            program: ret.program,
        })
    }

    pub fn program(&self) -> &Program<'a> {
        &self.program
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Original text covered by `span`
    pub fn slice(&self, span: Span) -> &'a str {
        self.text
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default()
    }

    /// Original text of a node
    pub fn slice_node<T: GetSpan>(&self, node: &T) -> &'a str {
        self.slice(node.span())
    }
}

/// Look through any number of wrapping parentheses
pub fn strip_parens<'s, 'a>(mut expr: &'s Expression<'a>) -> &'s Expression<'a> {
    while let Expression::ParenthesizedExpression(paren) = expr {
        expr = &paren.expression;
    }
    expr
}

/// Name of a non-computed identifier or string-literal property key
pub fn property_key_name<'s>(property: &'s ObjectProperty<'_>) -> Option<&'s str> {
    if property.computed {
        return None;
    }
    match &property.key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.as_str()),
        PropertyKey::StringLiteral(lit) => Some(lit.value.as_str()),
        _ => None,
    }
}

/// Dotted path of an identifier or member chain, e.g. `a.b.c`.
///
/// Computed keys are only accepted when they are string literals that are
/// valid identifier names (`a["b"]` becomes `a.b`).
pub fn member_path(expr: &Expression<'_>) -> Option<String> {
    match strip_parens(expr) {
        Expression::Identifier(id) => Some(id.name.to_string()),
        Expression::ThisExpression(_) => Some("this".to_string()),
        Expression::StaticMemberExpression(member) => {
            Some(format!("{}.{}", member_path(&member.object)?, member.property.name))
        }
        Expression::ComputedMemberExpression(member) => {
            let key = string_key(&member.expression)?;
            Some(format!("{}.{}", member_path(&member.object)?, key))
        }
        _ => None,
    }
}

/// Dotted path of a member assignment target
pub fn assignment_target_path(target: &AssignmentTarget<'_>) -> Option<String> {
    match target {
        AssignmentTarget::StaticMemberExpression(member) => {
            Some(format!("{}.{}", member_path(&member.object)?, member.property.name))
        }
        AssignmentTarget::ComputedMemberExpression(member) => {
            let key = string_key(&member.expression)?;
            Some(format!("{}.{}", member_path(&member.object)?, key))
        }
        _ => None,
    }
}

/// Object expression of a member assignment target
pub fn assignment_target_object<'s, 'a>(
    target: &'s AssignmentTarget<'a>,
) -> Option<&'s Expression<'a>> {
    match target {
        AssignmentTarget::StaticMemberExpression(member) => Some(strip_parens(&member.object)),
        AssignmentTarget::ComputedMemberExpression(member) => Some(strip_parens(&member.object)),
        _ => None,
    }
}

fn string_key<'s>(expr: &'s Expression<'_>) -> Option<&'s str> {
    match strip_parens(expr) {
        Expression::StringLiteral(lit) if is_identifier_name(lit.value.as_str()) => {
            Some(lit.value.as_str())
        }
        _ => None,
    }
}

/// Check if `name` can be written after a dot
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
