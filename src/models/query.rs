use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{TableIdentifier, TableMetadata};

/// Raw filter map: `"<column>"` or `"<column>.<operator>"` to a loosely typed value.
pub type QueryFilters = BTreeMap<String, Value>;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SortState {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(flatten)]
    pub table: TableIdentifier,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub filters: QueryFilters,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<SortState>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

impl QueryRequest {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            table: TableIdentifier::new(schema, table),
            columns: None,
            filters: QueryFilters::new(),
            search: None,
            sort: None,
            page: None,
            page_size: None,
        }
    }
}

/// Clamped page window of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn clamp(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Saturates at `i64::MAX` for pages far past any real table.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn has_more(&self, returned: usize, total: i64) -> bool {
        let returned = i64::try_from(returned).unwrap_or(i64::MAX);
        self.offset().saturating_add(returned) < total
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub rows: Vec<Value>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub has_more: bool,
    pub metadata: TableMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pagination_defaults_and_clamps() {
        assert_eq!(
            Pagination::clamp(None, None),
            Pagination {
                page: 1,
                page_size: 50
            }
        );
        assert_eq!(
            Pagination::clamp(Some(0), Some(0)),
            Pagination {
                page: 1,
                page_size: 1
            }
        );
        assert_eq!(
            Pagination::clamp(Some(-3), Some(10_000)),
            Pagination {
                page: 1,
                page_size: 500
            }
        );
        assert_eq!(Pagination::clamp(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn test_has_more_matches_window() {
        // (page, page_size, returned, total, expected)
        let cases = [
            (1, 50, 0, 0, false),
            (1, 50, 37, 37, false),
            (1, 10, 10, 11, true),
            (2, 10, 1, 11, false),
            (2, 10, 10, 25, true),
            (3, 10, 5, 25, false),
            (7, 1, 1, 8, true),
            (9, 1, 0, 8, false),
            (1, 500, 500, 5000, true),
            (10, 500, 500, 5000, false),
        ];
        for (page, page_size, returned, total, expected) in cases {
            let pagination = Pagination::clamp(Some(page), Some(page_size));
            assert_eq!(
                pagination.has_more(returned, total),
                expected,
                "page {} size {} returned {} total {}",
                page,
                page_size,
                returned,
                total
            );
        }
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let pagination = Pagination::clamp(Some(i64::MAX), Some(500));
        assert_eq!(pagination.page, i64::MAX);
        assert_eq!(pagination.offset(), i64::MAX);
        assert!(!pagination.has_more(0, 1_000));
        assert!(!pagination.has_more(usize::MAX, i64::MAX));
    }

    #[test]
    fn test_request_deserializes_from_json() {
        let request: QueryRequest = serde_json::from_value(json!({
            "schema": "public",
            "table": "users",
            "filters": {"is_active.eq": false},
            "sort": {"column": "email", "direction": "desc"},
            "page": 2,
            "pageSize": 10
        }))
        .unwrap();
        assert_eq!(request.table, TableIdentifier::new("public", "users"));
        assert_eq!(request.filters["is_active.eq"], json!(false));
        assert_eq!(request.sort.unwrap().direction, SortDirection::Desc);
        assert_eq!(request.page_size, Some(10));
        assert!(request.columns.is_none());
    }

    #[test]
    fn test_sort_direction_defaults_to_asc() {
        let sort: SortState = serde_json::from_value(json!({"column": "id"})).unwrap();
        assert_eq!(sort.direction, SortDirection::Asc);
        assert_eq!(sort.direction.as_sql(), "ASC");
    }
}
