//! Analysis results

use super::query::Fingerprint;
use serde::{Deserialize, Serialize};

/// Tabular result of an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Fingerprint of the request that produced it
    pub fingerprint: Fingerprint,
    /// Column labels, group-by axes first
    pub columns: Vec<String>,
    /// Row values
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Row count before paging
    pub total_rows: usize,
    /// Completion time in milliseconds since the epoch
    pub computed_at: i64,
}

impl AnalysisResult {
    /// Approximate in-memory size in bytes
    ///
    /// Capped at 1GB so a pathological result cannot overflow cache
    /// accounting.
    pub fn estimate_size(&self) -> usize {
        const MAX_ESTIMATED_SIZE: usize = 1024 * 1024 * 1024;

        let mut size = std::mem::size_of::<AnalysisResult>();
        for column in &self.columns {
            size = size.saturating_add(column.len());
        }
        for row in &self.rows {
            for value in row {
                size = size.saturating_add(value_size(value));
            }
        }
        size.min(MAX_ESTIMATED_SIZE)
    }

    /// Slice of rows starting at `start`, at most `max` long
    pub fn page(&self, start: usize, max: Option<usize>) -> &[Vec<serde_json::Value>] {
        let start = start.min(self.rows.len());
        let end = match max {
            Some(max) => start.saturating_add(max).min(self.rows.len()),
            None => self.rows.len(),
        };
        &self.rows[start..end]
    }
}

fn value_size(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::String(s) => 24 + s.len(),
        serde_json::Value::Array(items) => items.iter().map(value_size).sum::<usize>() + 24,
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| k.len() + value_size(v))
            .sum::<usize>()
            .saturating_add(48),
        _ => 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(rows: usize) -> AnalysisResult {
        AnalysisResult {
            fingerprint: Fingerprint("f".into()),
            columns: vec!["Year".into(), "count".into()],
            rows: (0..rows).map(|i| vec![json!(2000 + i), json!(i)]).collect(),
            total_rows: rows,
            computed_at: 0,
        }
    }

    #[test]
    fn test_size_grows_with_rows() {
        assert!(result(100).estimate_size() > result(1).estimate_size());
    }

    #[test]
    fn test_page_bounds() {
        let r = result(10);
        assert_eq!(r.page(0, Some(3)).len(), 3);
        assert_eq!(r.page(8, Some(5)).len(), 2);
        assert!(r.page(20, None).is_empty());
    }
}
