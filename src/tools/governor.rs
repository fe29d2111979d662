//! Result governance.
//!
//! Converts raw counts and result sets into size-bounded, paginated shapes
//! that are safe to hand back to the model. Token counts are estimated as
//! serialized length / 4, an approximation rather than a tokenizer.

use crate::models::{PaginationConfig, Record};
use serde::Serialize;

/// Records kept when a result set exceeds the token budget.
pub const TRUNCATED_ROW_COUNT: usize = 20;

pub const TRUNCATION_WARNING: &str =
    "Results truncated due to size. Consider using aggregations or exporting to Excel.";

pub mod recommendations {
    pub const LARGE: &str =
        "Dataset is large. Recommend exporting to Excel instead of displaying inline.";
    pub const MEDIUM: &str = "Dataset is medium-sized. Use pagination to display results.";
    pub const SMALL: &str = "Dataset is small enough to display directly.";
}

/// Display-or-export verdict for a counted dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountVerdict {
    pub count: u64,
    pub should_paginate: bool,
    pub should_export: bool,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u64,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_estimated: Option<u64>,
}

/// A result set after budget enforcement.
#[derive(Debug, Clone, PartialEq)]
pub struct GovernedRows {
    pub results: Vec<Record>,
    /// Length of the raw result set, before truncation
    pub row_count: usize,
    pub estimated_tokens: u64,
    pub truncated: bool,
    pub warning: Option<&'static str>,
    pub pagination: PageInfo,
}

/// Applies a [`PaginationConfig`] to query results.
#[derive(Debug, Clone, Copy)]
pub struct ResultGovernor {
    config: PaginationConfig,
}

impl ResultGovernor {
    pub fn new(config: PaginationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// Classify a count against the pagination and export thresholds.
    pub fn govern_count(&self, count: u64) -> CountVerdict {
        let should_paginate = count > u64::from(self.config.max_rows_per_page);
        let should_export = count > u64::from(self.config.max_rows_before_export);
        let recommendation = if should_export {
            recommendations::LARGE
        } else if should_paginate {
            recommendations::MEDIUM
        } else {
            recommendations::SMALL
        };
        CountVerdict {
            count,
            should_paginate,
            should_export,
            recommendation,
        }
    }

    /// Govern one page of relational rows.
    ///
    /// `has_more` uses `page * maxRowsPerPage < estimate` when an estimate is
    /// known and non-zero, otherwise whether a full page came back.
    pub fn govern_rows(&self, rows: Vec<Record>, page: u32, estimated_total: Option<u64>) -> GovernedRows {
        let page_size = u64::from(self.config.max_rows_per_page);
        let estimate = known_estimate(estimated_total);
        let has_more = match estimate {
            Some(total) => u64::from(page).saturating_mul(page_size) < total,
            None => rows.len() as u64 == page_size,
        };
        let pagination = PageInfo {
            current_page: u64::from(page),
            has_more,
            total_estimated: estimate,
        };
        self.enforce_budget(rows, pagination)
    }

    /// Govern one `find` page, addressed by skip and limit.
    ///
    /// `limit` must already be clamped to at least 1.
    pub fn govern_documents(
        &self,
        docs: Vec<Record>,
        limit: u32,
        skip: u64,
        estimated_total: Option<u64>,
    ) -> GovernedRows {
        let limit = u64::from(limit.max(1));
        let estimate = known_estimate(estimated_total);
        let has_more = match estimate {
            Some(total) => skip.saturating_add(limit) < total,
            None => docs.len() as u64 == limit,
        };
        let pagination = PageInfo {
            current_page: skip / limit + 1,
            has_more,
            total_estimated: estimate,
        };
        self.enforce_budget(docs, pagination)
    }

    fn enforce_budget(&self, mut rows: Vec<Record>, pagination: PageInfo) -> GovernedRows {
        let row_count = rows.len();
        let estimated_tokens = estimate_tokens(&rows);
        let truncated = estimated_tokens > u64::from(self.config.max_tokens_for_results);
        if truncated {
            rows.truncate(TRUNCATED_ROW_COUNT);
        }
        GovernedRows {
            results: rows,
            row_count,
            estimated_tokens,
            truncated,
            warning: truncated.then_some(TRUNCATION_WARNING),
            pagination,
        }
    }
}

/// Zero is treated as unknown.
fn known_estimate(estimate: Option<u64>) -> Option<u64> {
    estimate.filter(|&total| total > 0)
}

/// `ceil(len(json) / 4)` over the serialized result set.
pub fn estimate_tokens(rows: &[Record]) -> u64 {
    let len = serde_json::to_string(rows).map(|s| s.len()).unwrap_or(0) as u64;
    len.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn governor() -> ResultGovernor {
        ResultGovernor::new(PaginationConfig::default())
    }

    fn rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                let mut row = Record::new();
                row.insert("id".to_string(), json!(i));
                row
            })
            .collect()
    }

    fn wide_rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                let mut row = Record::new();
                row.insert("id".to_string(), json!(i));
                row.insert("payload".to_string(), json!("x".repeat(200)));
                row
            })
            .collect()
    }

    #[test]
    fn test_count_thresholds() {
        let g = governor();

        let v = g.govern_count(150);
        assert!(v.should_paginate && v.should_export);
        assert_eq!(v.recommendation, recommendations::LARGE);

        let v = g.govern_count(75);
        assert!(v.should_paginate && !v.should_export);
        assert_eq!(v.recommendation, recommendations::MEDIUM);

        let v = g.govern_count(30);
        assert!(!v.should_paginate && !v.should_export);
        assert_eq!(v.recommendation, recommendations::SMALL);
    }

    #[test]
    fn test_count_boundaries_are_strict() {
        let g = governor();
        assert!(!g.govern_count(50).should_paginate);
        assert!(g.govern_count(51).should_paginate);
        assert!(!g.govern_count(100).should_export);
        assert!(g.govern_count(101).should_export);
    }

    #[test]
    fn test_count_uses_configured_thresholds() {
        let g = ResultGovernor::new(PaginationConfig {
            max_rows_per_page: 10,
            max_rows_before_export: 20,
            max_tokens_for_results: 4000,
        });
        let v = g.govern_count(15);
        assert!(v.should_paginate && !v.should_export);
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        // [{"id":0}] is 10 bytes
        assert_eq!(estimate_tokens(&rows(1)), 3);
        assert_eq!(estimate_tokens(&[]), 1);
    }

    #[test]
    fn test_small_result_passes_through() {
        let raw = rows(10);
        let governed = governor().govern_rows(raw.clone(), 1, None);
        assert_eq!(governed.results, raw);
        assert!(!governed.truncated);
        assert_eq!(governed.warning, None);
        assert_eq!(governed.row_count, 10);
    }

    #[test]
    fn test_large_result_truncated_to_twenty() {
        let governed = governor().govern_rows(wide_rows(100), 1, None);
        assert!(governed.estimated_tokens > 4000);
        assert!(governed.truncated);
        assert_eq!(governed.results.len(), TRUNCATED_ROW_COUNT);
        assert_eq!(governed.row_count, 100);
        assert_eq!(governed.warning, Some(TRUNCATION_WARNING));
    }

    #[test]
    fn test_has_more_with_estimate() {
        let g = governor();
        assert!(g.govern_rows(rows(50), 1, Some(120)).pagination.has_more);
        assert!(g.govern_rows(rows(50), 2, Some(120)).pagination.has_more);
        assert!(!g.govern_rows(rows(20), 3, Some(120)).pagination.has_more);
    }

    #[test]
    fn test_has_more_heuristic_without_estimate() {
        let g = governor();
        assert!(g.govern_rows(rows(50), 1, None).pagination.has_more);
        assert!(!g.govern_rows(rows(49), 1, None).pagination.has_more);
    }

    #[test]
    fn test_zero_estimate_is_unknown() {
        let governed = governor().govern_rows(rows(50), 1, Some(0));
        assert!(governed.pagination.has_more);
        assert_eq!(governed.pagination.total_estimated, None);
    }

    #[test]
    fn test_documents_pagination() {
        let g = governor();
        let governed = g.govern_documents(rows(20), 20, 40, Some(100));
        assert_eq!(governed.pagination.current_page, 3);
        assert!(governed.pagination.has_more);

        let governed = g.govern_documents(rows(20), 20, 80, Some(100));
        assert!(!governed.pagination.has_more);

        let governed = g.govern_documents(rows(7), 10, 0, None);
        assert_eq!(governed.pagination.current_page, 1);
        assert!(!governed.pagination.has_more);
    }

    #[test]
    fn test_page_info_omits_unknown_total() {
        let json = serde_json::to_value(PageInfo {
            current_page: 1,
            has_more: false,
            total_estimated: None,
        })
        .unwrap();
        assert_eq!(json, json!({"currentPage": 1, "hasMore": false}));
    }
}
