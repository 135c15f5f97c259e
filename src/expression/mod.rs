//! Dimensional expression algebra
//!
//! - `ast`: immutable expression nodes, composition and canonical printing
//! - `parser`: dotted-reference parser used as the default definition parser

pub mod ast;
pub mod parser;

pub use ast::{ColumnReference, Expression, RelationReference, UNDEFINED_MARKER};
pub use parser::{parse_expression, DottedParser};
