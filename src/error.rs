//! Error types for the semantic layer
//!
//! Resolution and execution surfaces return these typed errors. Identity,
//! pretty-printing and estimation surfaces never return them and degrade to
//! safe defaults instead.

use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Expression or reference resolution failed
    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    /// Deriving an index, statistics or executing a job failed
    #[error("Computing error: {0}")]
    Computing(#[from] ComputingError),

    /// Cooperative cancellation, distinct from a failure
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Lazy-mode lookup found neither a cached result nor a finished job
    #[error("Not in cache: {0}")]
    NotInCache(String),

    /// Local or distributed cache backend error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True when the error is a cancellation signal rather than a failure
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted(_))
    }

    /// True when the error is a scope (resolution) error
    pub fn is_scope(&self) -> bool {
        matches!(self, Error::Scope(_))
    }
}

/// Expression and reference resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// A named sub-dimension does not exist
    #[error("dimension not found: {0}")]
    DimensionNotFound(String),

    /// Rollup directive is malformed or out of range
    ///
    /// `position` is 1-based, matching what the caller typed.
    #[error("invalid rollup expression at position {position}: {message}")]
    InvalidRollup {
        /// 1-based position of the directive in the request
        position: usize,
        /// Description of the problem
        message: String,
    },

    /// Expression text could not be parsed
    #[error("unable to parse expression: {0}")]
    Parse(String),

    /// Prune target is not an ancestor of the space
    #[error("space '{prefix}' is not a prefix of '{space}'")]
    NotAPrefix {
        /// Canonical id of the space being pruned
        space: String,
        /// Canonical id of the requested prefix
        prefix: String,
    },

    /// Axis has neither a dimension nor an inline expression
    #[error("undefined axis: {0}")]
    UndefinedAxis(String),

    /// Referenced object (project, domain, job) is unknown
    #[error("object not found: {0}")]
    NotFound(String),

    /// Request value is malformed
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Name of the offending field
        field: String,
        /// Description of the problem
        message: String,
    },
}

/// Errors raised while computing indices, statistics or analyses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputingError {
    /// Dimension index materialization failed
    #[error("Index computation failed: {0}")]
    Index(String),

    /// Statistics lookup failed
    #[error("Statistics failed: {0}")]
    Statistics(String),

    /// Analysis execution failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Hierarchy construction failed or timed out
    #[error("Hierarchy failed: {0}")]
    Hierarchy(String),
}

/// Cache backend errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Connection to the backend failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend rejected the operation
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup_message_names_position() {
        let err = ScopeError::InvalidRollup {
            position: 1,
            message: "the index specified (5) is not defined".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("position 1"));
        assert!(display.contains("(5)"));
    }

    #[test]
    fn test_kind_helpers() {
        let err: Error = ScopeError::DimensionNotFound("year".into()).into();
        assert!(err.is_scope());
        assert!(!err.is_interrupted());
        assert!(Error::Interrupted("cancelled".into()).is_interrupted());
    }

    #[test]
    fn test_dimension_not_found_display() {
        let err = ScopeError::DimensionNotFound("quarter".into());
        assert_eq!(err.to_string(), "dimension not found: quarter");
    }
}
