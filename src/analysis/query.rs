//! Analysis requests and their fingerprints
//!
//! [`AnalysisQuery`] is the unresolved request as bound from request
//! parameters. [`AnalysisRequest`] is the same request resolved against a
//! universe: group-by references have become axes. The fingerprint is derived
//! from the resolved form so that two spellings of the same axis share a
//! cache entry.

use crate::api::Style;
use crate::error::{Result, ScopeError};
use crate::types::DomainId;
use crate::universe::{Axis, Space, Universe};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Rollups
// ============================================================================

/// Where a rollup subtotal is placed relative to its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Position {
    /// Subtotal before the detail rows
    #[default]
    First,
    /// Subtotal after the detail rows
    Last,
}

/// Subtotal directive on a group-by column
///
/// `col` is a zero-based index into the group-by list, or `-1` for the grand
/// total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollUp {
    /// Group-by column index, `-1` for the grand total
    pub col: i32,
    /// Placement of the subtotal
    pub position: Position,
}

impl RollUp {
    /// Rollup at a group-by column
    pub fn new(col: i32, position: Position) -> Self {
        Self { col, position }
    }

    /// True for the grand-total rollup
    pub fn is_grand_total(&self) -> bool {
        self.col == -1
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

/// Order-by clause
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    /// Expression or column to sort on
    pub expression: String,
    /// Sort direction
    pub direction: Direction,
}

// ============================================================================
// Unresolved query
// ============================================================================

/// Analysis request as bound from request parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisQuery {
    /// Domain the analysis runs on
    pub domain: DomainId,
    /// Group-by references
    pub group_by: Vec<String>,
    /// Metric expressions
    pub metrics: Vec<String>,
    /// Filter expressions
    pub filters: Vec<String>,
    /// Period dimension
    pub period: Option<String>,
    /// Time frame bounds
    pub timeframe: Vec<String>,
    /// Comparison time frame bounds
    pub compareframe: Vec<String>,
    /// Ordering
    pub order_by: Vec<OrderBy>,
    /// Subtotals
    pub rollups: Vec<RollUp>,
    /// Row limit applied by the engine
    pub limit: Option<u64>,
    /// Output format requested by the caller
    pub format: Option<String>,
    /// Maximum rows returned to the caller
    pub max_results: Option<u64>,
    /// First row returned to the caller
    pub start_index: Option<u64>,
    /// Only answer from cache or a running job
    pub lazy: bool,
    /// Reference style for rendered expressions
    pub style: Style,
}

impl AnalysisQuery {
    /// Create an empty query on a domain
    pub fn new(domain: impl Into<DomainId>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Add a group-by reference
    pub fn group_by(mut self, reference: &str) -> Self {
        self.group_by.push(reference.to_string());
        self
    }

    /// Add a metric
    pub fn metric(mut self, metric: &str) -> Self {
        self.metrics.push(metric.to_string());
        self
    }

    /// Add a filter
    pub fn filter(mut self, filter: &str) -> Self {
        self.filters.push(filter.to_string());
        self
    }

    /// Add a rollup
    pub fn rollup(mut self, rollup: RollUp) -> Self {
        self.rollups.push(rollup);
        self
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Canonical cache key of a resolved analysis
///
/// SHA-256 of the canonical JSON rendering, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Hash a canonical value
    pub fn of(canonical: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Resolved request
// ============================================================================

/// Analysis request resolved against a universe
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Tenant/project context
    pub universe: Arc<Universe>,
    /// Root space of the analysed domain
    pub space: Arc<Space>,
    /// Resolved group-by axes
    pub group_by: Vec<Axis>,
    /// The bound query
    pub query: AnalysisQuery,
}

impl AnalysisRequest {
    /// Resolve every group-by reference and validate rollups
    pub fn resolve(universe: Arc<Universe>, query: AnalysisQuery) -> Result<Self> {
        let domain = universe.domain(&query.domain)?;
        let space = universe.space(&domain);
        let group_by = query
            .group_by
            .iter()
            .map(|reference| space.resolve_axis(reference))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (i, rollup) in query.rollups.iter().enumerate() {
            if rollup.col < -1 || rollup.col >= group_by.len() as i32 {
                return Err(ScopeError::InvalidRollup {
                    position: i + 1,
                    message: format!("the index specified ({}) is not defined", rollup.col),
                }
                .into());
            }
        }

        Ok(Self {
            universe,
            space,
            group_by,
            query,
        })
    }

    /// Canonical fingerprint of this request
    ///
    /// Caller-side presentation settings (`lazy`, `format`, `style`) do not
    /// take part.
    pub fn fingerprint(&self) -> Fingerprint {
        let canonical = serde_json::json!({
            "customer": self.universe.customer_id().as_str(),
            "project": self.universe.project().id.as_str(),
            "space": self.space.id(),
            "group_by": self.group_by.iter().map(|a| a.id()).collect::<Vec<_>>(),
            "metrics": self.query.metrics,
            "filters": self.query.filters,
            "period": self.query.period,
            "timeframe": self.query.timeframe,
            "compareframe": self.query.compareframe,
            "order_by": self.query.order_by,
            "rollups": self.query.rollups,
            "limit": self.query.limit,
            "max_results": self.query.max_results,
            "start_index": self.query.start_index,
        });
        Fingerprint::of(&canonical)
    }
}
