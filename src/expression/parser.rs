//! Dotted expression parser
//!
//! Parses the reference syntax used in dimension definitions into the
//! expression AST.
//!
//! # Supported Syntax
//!
//! ```text
//! order_year
//! 'total sales'
//! [customer].country
//! [order].[customer].'postal code'
//! ```
//!
//! Relations may only appear before the last segment is reached; a column
//! ends the path.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::map,
    multi::separated_list1,
    sequence::delimited,
    IResult, Parser,
};

use super::ast::Expression;
use crate::engine::traits::ExpressionParser;
use crate::error::ScopeError;
use crate::model::{Dimension, Domain};

/// Parse a dotted reference into a left-folded composition
pub fn parse_expression(input: &str) -> Result<Expression, ScopeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ScopeError::Parse("empty expression".to_string()));
    }

    let segments = match parse_segments(trimmed) {
        Ok((remaining, segments)) => {
            if !remaining.trim().is_empty() {
                return Err(ScopeError::Parse(format!(
                    "unexpected trailing input: '{}'",
                    remaining.trim()
                )));
            }
            segments
        }
        Err(e) => return Err(ScopeError::Parse(format!("{}: {:?}", trimmed, e))),
    };

    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if i < last && matches!(segment, Expression::Column(_)) {
            return Err(ScopeError::Parse(format!(
                "column reference must end the path in '{}'",
                trimmed
            )));
        }
    }

    let mut iter = segments.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| ScopeError::Parse("empty expression".to_string()))?;
    Ok(iter.fold(first, Expression::compose))
}

fn parse_segments(input: &str) -> IResult<&str, Vec<Expression>> {
    separated_list1(delimited(multispace0, char('.'), multispace0), parse_segment).parse(input)
}

fn parse_segment(input: &str) -> IResult<&str, Expression> {
    alt((
        map(
            delimited(char('['), take_while1(|c: char| c != ']'), char(']')),
            |name: &str| Expression::relation(name.trim()),
        ),
        map(
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
            Expression::column,
        ),
        map(parse_identifier, Expression::column),
    ))
    .parse(input)
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_').parse(input)
}

/// Default parser for dimension definitions written as dotted references
#[derive(Debug, Clone, Copy, Default)]
pub struct DottedParser;

impl ExpressionParser for DottedParser {
    fn parse(&self, domain: &Domain, dimension: &Dimension) -> Result<Expression, ScopeError> {
        match dimension.expression.as_deref() {
            Some(text) => parse_expression(text).map_err(|e| match e {
                ScopeError::Parse(msg) => ScopeError::Parse(format!(
                    "dimension '{}' in domain '{}': {}",
                    dimension.name, domain.name, msg
                )),
                other => other,
            }),
            None => Err(ScopeError::Parse(format!(
                "dimension '{}' has no definition",
                dimension.name
            ))),
        }
    }
}
