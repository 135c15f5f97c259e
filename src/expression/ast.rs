//! Expression AST
//!
//! Immutable nodes for the dimensional expression algebra. Equality and
//! hashing are structural; pretty-printing is canonical: a composition prints
//! its first operand, a dot, then its second operand.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker rendered for an undefined expression with no source text
pub const UNDEFINED_MARKER: &str = "**undefined**";

/// Reference to a column of the current domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnReference {
    /// Column name
    pub name: String,
}

impl ColumnReference {
    /// Name used when an axis is labelled after this column
    pub fn reference_name(&self) -> &str {
        &self.name
    }
}

/// Reference to a relation (join) leaving the current domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationReference {
    /// Relation name
    pub name: String,
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    /// Column of the current domain
    Column(ColumnReference),
    /// Join to another domain
    Relation(RelationReference),
    /// Evaluate `second` in the context produced by `first`
    Compose(Box<Expression>, Box<Expression>),
    /// A failed sub-expression, kept for rendering only
    Undefined(Option<String>),
}

impl Expression {
    /// Column reference
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(ColumnReference { name: name.into() })
    }

    /// Relation reference
    pub fn relation(name: impl Into<String>) -> Self {
        Expression::Relation(RelationReference { name: name.into() })
    }

    /// Undefined placeholder wrapping the original source text
    pub fn undefined(source: Option<String>) -> Self {
        Expression::Undefined(source)
    }

    /// Compose two expressions; `second` is evaluated in the context of `first`
    pub fn compose(first: Expression, second: Expression) -> Self {
        Expression::Compose(Box::new(first), Box::new(second))
    }

    /// Canonical dotted rendering
    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out);
        out
    }

    fn write_pretty(&self, out: &mut String) {
        match self {
            Expression::Column(c) => out.push_str(&quote_name(&c.name)),
            Expression::Relation(r) => {
                out.push('[');
                out.push_str(&r.name);
                out.push(']');
            }
            Expression::Compose(first, second) => {
                first.write_pretty(out);
                out.push('.');
                second.write_pretty(out);
            }
            Expression::Undefined(Some(source)) => out.push_str(source),
            Expression::Undefined(None) => out.push_str(UNDEFINED_MARKER),
        }
    }

    /// True when this node or any operand is undefined
    pub fn is_undefined(&self) -> bool {
        match self {
            Expression::Undefined(_) => true,
            Expression::Compose(first, second) => first.is_undefined() || second.is_undefined(),
            _ => false,
        }
    }

    /// Leaves in evaluation order, compositions flattened
    pub fn segments(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.collect_segments(&mut out);
        out
    }

    fn collect_segments<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        match self {
            Expression::Compose(first, second) => {
                first.collect_segments(out);
                second.collect_segments(out);
            }
            leaf => out.push(leaf),
        }
    }

    /// Last leaf of the expression (the value being computed)
    pub fn tail(&self) -> &Expression {
        match self {
            Expression::Compose(_, second) => second.tail(),
            leaf => leaf,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_print())
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_name(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("'{}'", name)
    }
}
