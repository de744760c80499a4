//! Turns a loosely typed filter map into typed, column-aware predicates.
//!
//! Entries for unknown columns, entries without a value and numeric entries
//! that do not parse are dropped rather than rejected: the map usually comes
//! from a UI that may be working from a stale column list.
//!
//! Entries that resolve to the same `"<column>.<operator>"` key collapse into
//! one filter; the one iterated last wins.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{
    filter::{Filter, FilterOperator, Predicate},
    query::QueryFilters,
    schema::{TableColumn, TableMetadata},
    value::SqlValue,
};

/// Filters keyed by `"<column>.<operator>"`, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedFilters {
    filters: BTreeMap<String, Filter>,
}

impl NormalizedFilters {
    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.values()
    }

    fn insert(&mut self, filter: Filter) {
        self.filters.insert(filter.key(), filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Re-emits the filters as `"<column>.<operator>"` keys.
    pub fn to_query_filters(&self) -> QueryFilters {
        self.filters
            .iter()
            .map(|(key, f)| (key.clone(), f.predicate.raw_value().to_json()))
            .collect()
    }
}

impl From<Vec<Filter>> for NormalizedFilters {
    fn from(filters: Vec<Filter>) -> Self {
        let mut normalized = Self::default();
        for filter in filters {
            normalized.insert(filter);
        }
        normalized
    }
}

pub fn normalize_filters(filters: &QueryFilters, metadata: &TableMetadata) -> NormalizedFilters {
    let mut normalized = NormalizedFilters::default();

    for (key, value) in filters {
        let (column_name, operator) = split_key(key, metadata);
        let Some(column) = metadata.column(column_name) else {
            continue;
        };
        if !has_value(value) {
            continue;
        }
        let Some(coerced) = coerce_value(value, column) else {
            continue;
        };

        normalized.insert(Filter {
            column: column.column_name.clone(),
            predicate: Predicate::build(operator, coerced),
        });
    }

    normalized
}

/// Splits `"<column>.<operator>"`. A key naming an existing column verbatim
/// is an `eq` filter even if the name contains a dot; an unknown operator
/// suffix also means `eq`.
fn split_key<'a>(key: &'a str, metadata: &TableMetadata) -> (&'a str, FilterOperator) {
    if metadata.has_column(key) {
        return (key, FilterOperator::Eq);
    }
    match key.rsplit_once('.') {
        Some((column, operator)) => (
            column,
            FilterOperator::parse(operator).unwrap_or(FilterOperator::Eq),
        ),
        None => (key, FilterOperator::Eq),
    }
}

/// `0` and `false` are values; `null` and `""` are not.
fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn coerce_value(value: &Value, column: &TableColumn) -> Option<SqlValue> {
    if column.is_numeric() {
        return coerce_number(value);
    }
    if column.is_boolean() {
        return Some(coerce_bool(value));
    }
    Some(match value {
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Number(n) => SqlValue::Text(n.to_string()),
        Value::Bool(b) => SqlValue::Text(b.to_string()),
        Value::Null => SqlValue::Null,
        other => SqlValue::Json(other.clone()),
    })
}

fn coerce_number(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Number(_) => Some(SqlValue::from_json(value)),
        Value::Bool(b) => Some(SqlValue::Int(i64::from(*b))),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<SqlValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(SqlValue::Int(0));
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(SqlValue::Int(i));
    }
    if let Some(i) = parse_radix(trimmed) {
        return Some(SqlValue::Int(i));
    }
    // infinities are dropped along with NaN
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(SqlValue::Float(f)),
        _ => None,
    }
}

/// Unsigned `0x`, `0o` and `0b` literals.
fn parse_radix(raw: &str) -> Option<i64> {
    let (prefix, digits) = (raw.get(..2)?, raw.get(2..)?);
    let radix = match prefix.to_ascii_lowercase().as_str() {
        "0x" => 16,
        "0o" => 8,
        "0b" => 2,
        _ => return None,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    i64::from_str_radix(digits, radix).ok()
}

fn coerce_bool(value: &Value) -> SqlValue {
    match value {
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::String(s) => SqlValue::Bool(s.eq_ignore_ascii_case("true")),
        other => SqlValue::Bool(other.to_string().eq_ignore_ascii_case("true")),
    }
}
