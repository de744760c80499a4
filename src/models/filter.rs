use serde::{Deserialize, Serialize};

use super::value::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    IsNull,
    NotNull,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "startsWith",
            FilterOperator::EndsWith => "endsWith",
            FilterOperator::IsNull => "isNull",
            FilterOperator::NotNull => "notNull",
        }
    }

    pub fn parse(s: &str) -> Option<FilterOperator> {
        Self::all().into_iter().find(|op| op.as_str() == s)
    }

    pub fn all() -> Vec<FilterOperator> {
        vec![
            FilterOperator::Eq,
            FilterOperator::Neq,
            FilterOperator::Gt,
            FilterOperator::Gte,
            FilterOperator::Lt,
            FilterOperator::Lte,
            FilterOperator::Contains,
            FilterOperator::StartsWith,
            FilterOperator::EndsWith,
            FilterOperator::IsNull,
            FilterOperator::NotNull,
        ]
    }
}

/// A typed condition on one column, produced by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(SqlValue),
    Neq(SqlValue),
    Gt(SqlValue),
    Gte(SqlValue),
    Lt(SqlValue),
    Lte(SqlValue),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    IsNull,
    NotNull,
}

impl Predicate {
    pub fn build(operator: FilterOperator, value: SqlValue) -> Self {
        match operator {
            FilterOperator::Eq => Predicate::Eq(value),
            FilterOperator::Neq => Predicate::Neq(value),
            FilterOperator::Gt => Predicate::Gt(value),
            FilterOperator::Gte => Predicate::Gte(value),
            FilterOperator::Lt => Predicate::Lt(value),
            FilterOperator::Lte => Predicate::Lte(value),
            FilterOperator::Contains => Predicate::Contains(value.as_text()),
            FilterOperator::StartsWith => Predicate::StartsWith(value.as_text()),
            FilterOperator::EndsWith => Predicate::EndsWith(value.as_text()),
            FilterOperator::IsNull => Predicate::IsNull,
            FilterOperator::NotNull => Predicate::NotNull,
        }
    }

    pub fn operator(&self) -> FilterOperator {
        match self {
            Predicate::Eq(_) => FilterOperator::Eq,
            Predicate::Neq(_) => FilterOperator::Neq,
            Predicate::Gt(_) => FilterOperator::Gt,
            Predicate::Gte(_) => FilterOperator::Gte,
            Predicate::Lt(_) => FilterOperator::Lt,
            Predicate::Lte(_) => FilterOperator::Lte,
            Predicate::Contains(_) => FilterOperator::Contains,
            Predicate::StartsWith(_) => FilterOperator::StartsWith,
            Predicate::EndsWith(_) => FilterOperator::EndsWith,
            Predicate::IsNull => FilterOperator::IsNull,
            Predicate::NotNull => FilterOperator::NotNull,
        }
    }

    /// Value as it would appear in a raw filter map. Null checks keep `true`.
    pub fn raw_value(&self) -> SqlValue {
        match self {
            Predicate::Eq(v)
            | Predicate::Neq(v)
            | Predicate::Gt(v)
            | Predicate::Gte(v)
            | Predicate::Lt(v)
            | Predicate::Lte(v) => v.clone(),
            Predicate::Contains(s) | Predicate::StartsWith(s) | Predicate::EndsWith(s) => {
                SqlValue::Text(s.clone())
            }
            Predicate::IsNull | Predicate::NotNull => SqlValue::Bool(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub predicate: Predicate,
}

impl Filter {
    /// `"<column>.<operator>"`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.column, self.predicate.operator().as_str())
    }
}
