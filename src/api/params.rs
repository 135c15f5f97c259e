//! Analysis parameter binding
//!
//! Turns flat request parameters into an [`AnalysisQuery`] and the options
//! of the execution call.

use super::Style;
use crate::analysis::{AnalysisQuery, AnalysisResult, Direction, OrderBy, Position, RollUp, RunOptions};
use crate::error::ScopeError;
use crate::types::DomainId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lazy mode requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LazyMode {
    /// Compute when missing
    #[default]
    Off,
    /// Cache only, a miss is an error
    Lazy,
    /// Cache only, a miss is an empty reply
    NoError,
}

impl LazyMode {
    /// `true` enables lazy mode, `noerror` also silences misses
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("true") => LazyMode::Lazy,
            Some("noerror") => LazyMode::NoError,
            _ => LazyMode::Off,
        }
    }
}

/// Flat analysis parameters, as received by the request layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Domain (bookmark scope) the analysis runs on
    pub domain: String,
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
    /// Order-by expressions
    pub order_by: Vec<String>,
    /// Rollup directives: `N`, `FIRST(N)` or `LAST(N)`
    pub rollups: Vec<String>,
    /// Row limit
    pub limit: Option<u64>,
    /// Output format
    pub format: Option<String>,
    /// Maximum rows returned
    pub max_results: Option<u64>,
    /// First row returned
    pub start_index: Option<u64>,
    /// `true`, `noerror` or absent
    pub lazy: Option<String>,
    /// Reference style
    pub style: Option<Style>,
    /// How long to wait for the result, in milliseconds
    pub timeout_ms: Option<u64>,
}

impl AnalysisParams {
    /// Bind into a query
    pub fn to_query(&self) -> Result<AnalysisQuery, ScopeError> {
        if self.domain.trim().is_empty() {
            return Err(ScopeError::InvalidValue {
                field: "domain".to_string(),
                message: "a domain is required".to_string(),
            });
        }

        Ok(AnalysisQuery {
            domain: DomainId::new(self.domain.trim()),
            group_by: self.group_by.clone(),
            metrics: self.metrics.clone(),
            filters: self.filters.clone(),
            period: self.period.clone(),
            timeframe: self.timeframe.clone(),
            compareframe: self.compareframe.clone(),
            order_by: self
                .order_by
                .iter()
                .map(|expression| OrderBy {
                    expression: expression.clone(),
                    direction: Direction::default(),
                })
                .collect(),
            rollups: parse_rollups(&self.rollups, self.group_by.len())?,
            limit: self.limit,
            format: self.format.clone(),
            max_results: self.max_results,
            start_index: self.start_index,
            lazy: self.lazy_mode() != LazyMode::Off,
            style: self.style.unwrap_or_default(),
        })
    }

    /// Parsed lazy mode
    pub fn lazy_mode(&self) -> LazyMode {
        LazyMode::parse(self.lazy.as_deref())
    }

    /// Options for the execution call
    pub fn run_options(&self) -> RunOptions {
        let lazy = self.lazy_mode();
        RunOptions {
            timeout: self.timeout_ms.map(Duration::from_millis),
            lazy: lazy != LazyMode::Off,
            no_error: lazy == LazyMode::NoError,
        }
    }

    /// Rows of `result` requested by `start_index` and `max_results`
    ///
    /// `default_max` applies when the caller sets no maximum.
    pub fn page<'a>(&self, result: &'a AnalysisResult, default_max: u64) -> &'a [Vec<serde_json::Value>] {
        let start = self.start_index.unwrap_or(0) as usize;
        let max = self.max_results.unwrap_or(default_max) as usize;
        result.page(start, Some(max))
    }
}

/// Parse rollup directives against `group_by_len` group-by columns
///
/// Each directive is an index (`-1` for the grand total) optionally wrapped
/// in `FIRST(...)` or `LAST(...)`. Errors name the 1-based position of the
/// offending directive.
pub fn parse_rollups(expressions: &[String], group_by_len: usize) -> Result<Vec<RollUp>, ScopeError> {
    expressions
        .iter()
        .enumerate()
        .map(|(i, expression)| parse_rollup(expression, i + 1, group_by_len))
        .collect()
}

fn parse_rollup(expression: &str, position: usize, group_by_len: usize) -> Result<RollUp, ScopeError> {
    let token = expression.trim().to_lowercase();
    let (placement, inner) = if let Some(rest) = token.strip_prefix("last(") {
        (Position::Last, rest.strip_suffix(')'))
    } else if let Some(rest) = token.strip_prefix("first(") {
        (Position::First, rest.strip_suffix(')'))
    } else {
        (Position::First, Some(token.as_str()))
    };

    let index = inner
        .and_then(|s| s.trim().parse::<i32>().ok())
        .ok_or_else(|| ScopeError::InvalidRollup {
            position,
            message: "must be a valid index N or the expression FIRST(N) or LAST(N) to set the rollup position"
                .to_string(),
        })?;

    if index < -1 || index >= group_by_len as i32 {
        return Err(ScopeError::InvalidRollup {
            position,
            message: format!("the index specified ({}) is not defined", index),
        });
    }

    Ok(RollUp::new(index, placement))
}
