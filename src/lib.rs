//! Kuba OLAP - semantic query layer over relational data
//!
//! This library resolves dimensional expressions against a project's
//! metadata and runs analyses with cluster-wide caching:
//! - Expression algebra over columns and relations, with canonical printing
//! - Spaces (navigation paths over relations) and axes (dimensions in a space)
//! - Lazily built, cached dimension hierarchies
//! - Single-flight analysis execution with local and distributed result caches
//! - Job status polling filtered by project access rights

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod model;
pub mod types;

/// Dimensional expression algebra and the dotted-reference parser
pub mod expression;

/// Pluggable collaborators and their in-memory implementations
pub mod engine;

/// Universes, spaces and axes
pub mod universe;

/// Domain hierarchies and dimension indices
pub mod hierarchy;

/// Analysis requests, jobs and cached execution
pub mod analysis;

/// Local and distributed result caches
pub mod cache;

/// Redis backend for the distributed cache
pub mod redis;

/// Request-layer contracts: parameter binding, navigation, job status
pub mod api;

/// Configuration management with TOML support
pub mod config;

/// Prometheus metrics
pub mod metrics;

/// Logging setup
pub mod telemetry;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use analysis::{AnalysisOutcome, AnalysisQuery, AnalysisRequest, AnalysisService, JobStatus};
pub use error::{Error, Result};
pub use types::{CustomerId, JobId, ProjectId, UserContext};
pub use universe::{Axis, Space, Universe};
