//! Parameterized SQL for the read path.

use log::warn;
use serde_json::Value;

use super::{
    filters::NormalizedFilters,
    ident::{qualified_table, quote_identifier},
};
use crate::models::{
    filter::Predicate,
    query::{Pagination, SortState},
    schema::{TableColumn, TableMetadata},
    value::{array_literal, SqlValue},
};

/// SQL text plus the values for its `$n` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereClause {
    /// Either empty or starts with `WHERE `.
    pub clause: String,
    pub values: Vec<SqlValue>,
}

/// Positional parameter list; `push` returns the placeholder index.
#[derive(Debug, Default)]
pub(crate) struct Params {
    values: Vec<SqlValue>,
}

impl Params {
    pub(crate) fn push(&mut self, value: SqlValue) -> usize {
        self.values.push(value);
        self.values.len()
    }

    /// Pushes `value` and returns a placeholder typed for `column`. JSON arrays
    /// aimed at array columns travel as array literals.
    pub(crate) fn push_for(&mut self, value: SqlValue, column: &TableColumn) -> String {
        let value = match value {
            SqlValue::Json(json @ Value::Array(_)) if column.is_array() => {
                SqlValue::Text(array_literal(&json))
            }
            other => other,
        };
        let placeholder = typed_placeholder(self.values.len() + 1, &value, column);
        self.values.push(value);
        placeholder
    }

    pub(crate) fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// `$n`, or `CAST($n AS "schema"."type")` when the bound value's wire type
/// would not compare or assign against the column's type on its own.
pub fn typed_placeholder(index: usize, value: &SqlValue, column: &TableColumn) -> String {
    let needs_cast = match value {
        SqlValue::Bool(_) | SqlValue::Int(_) | SqlValue::Float(_) => false,
        SqlValue::Text(_) | SqlValue::Null => {
            !matches!(column.udt_name.as_str(), "text" | "varchar")
        }
        SqlValue::Json(_) => column.udt_name != "jsonb",
    };

    if needs_cast && !column.udt_name.is_empty() {
        format!(
            "CAST(${} AS {}.{})",
            index,
            quote_identifier(&column.udt_schema),
            quote_identifier(&column.udt_name)
        )
    } else {
        format!("${}", index)
    }
}

fn predicate_sql(
    column: &TableColumn,
    predicate: &Predicate,
    params: &mut Params,
) -> String {
    let col = quote_identifier(&column.column_name);
    let compare = |op: &str, value: &SqlValue, params: &mut Params| {
        let placeholder = params.push_for(value.clone(), column);
        format!("{} {} {}", col, op, placeholder)
    };
    let ilike = |pattern: String, params: &mut Params| {
        let index = params.push(SqlValue::Text(pattern));
        format!("{}::text ILIKE ${}", col, index)
    };

    match predicate {
        Predicate::Eq(v) => compare("=", v, params),
        Predicate::Neq(v) => compare("<>", v, params),
        Predicate::Gt(v) => compare(">", v, params),
        Predicate::Gte(v) => compare(">=", v, params),
        Predicate::Lt(v) => compare("<", v, params),
        Predicate::Lte(v) => compare("<=", v, params),
        Predicate::Contains(s) => ilike(format!("%{}%", s), params),
        Predicate::StartsWith(s) => ilike(format!("{}%", s), params),
        Predicate::EndsWith(s) => ilike(format!("%{}", s), params),
        Predicate::IsNull => format!("{} IS NULL", col),
        Predicate::NotNull => format!("{} IS NOT NULL", col),
    }
}

fn build_conditions(
    filters: &NormalizedFilters,
    metadata: &TableMetadata,
    search: Option<&str>,
    params: &mut Params,
) -> Vec<String> {
    let mut conditions = Vec::new();

    for filter in filters.iter() {
        // normalized filters only name known columns
        if let Some(column) = metadata.column(&filter.column) {
            conditions.push(predicate_sql(column, &filter.predicate, params));
        }
    }

    if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let searchable: Vec<&TableColumn> =
            metadata.columns.iter().filter(|c| c.is_text_like()).collect();
        if !searchable.is_empty() {
            let index = params.push(SqlValue::Text(format!("%{}%", term)));
            let ors: Vec<String> = searchable
                .iter()
                .map(|c| format!("{}::text ILIKE ${}", quote_identifier(&c.column_name), index))
                .collect();
            conditions.push(format!("({})", ors.join(" OR ")));
        }
    }

    conditions
}

/// AND-ed filter predicates plus an optional OR-group over text-like columns.
pub fn build_where_clause(
    filters: &NormalizedFilters,
    metadata: &TableMetadata,
    search: Option<&str>,
) -> WhereClause {
    let mut params = Params::default();
    let conditions = build_conditions(filters, metadata, search, &mut params);
    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    WhereClause {
        clause,
        values: params.into_values(),
    }
}

/// Requested columns that exist, in request order; `*` when none survive.
pub fn build_projection(columns: Option<&[String]>, metadata: &TableMetadata) -> String {
    let mut selected: Vec<&str> = Vec::new();
    for name in columns.unwrap_or_default() {
        if metadata.has_column(name) && !selected.contains(&name.as_str()) {
            selected.push(name);
        }
    }

    if selected.is_empty() {
        "*".to_string()
    } else {
        selected
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn build_order_by(sort: Option<&SortState>, metadata: &TableMetadata) -> String {
    match sort {
        Some(sort) if metadata.has_column(&sort.column) => format!(
            "ORDER BY {} {}",
            quote_identifier(&sort.column),
            sort.direction.as_sql()
        ),
        Some(sort) => {
            warn!("ignoring sort on unknown column {}", sort.column);
            String::new()
        }
        None => String::new(),
    }
}

fn join_sql(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The paged data query and its matching count query.
///
/// Both share the WHERE parameters; the data query appends LIMIT and OFFSET
/// as the last two parameters.
pub fn build_select(
    metadata: &TableMetadata,
    where_clause: &WhereClause,
    projection: &str,
    order_by: &str,
    pagination: Pagination,
) -> (SqlStatement, SqlStatement) {
    let table = qualified_table(&metadata.table);

    let limit_index = where_clause.values.len() + 1;
    let mut data_params = where_clause.values.clone();
    data_params.push(SqlValue::Int(pagination.page_size));
    data_params.push(SqlValue::Int(pagination.offset()));

    let limit = format!("LIMIT ${} OFFSET ${}", limit_index, limit_index + 1);
    let data = SqlStatement {
        sql: join_sql(&[
            format!("SELECT {} FROM {}", projection, table).as_str(),
            where_clause.clause.as_str(),
            order_by,
            limit.as_str(),
        ]),
        params: data_params,
    };

    let count = SqlStatement {
        sql: join_sql(&[
            format!("SELECT COUNT(*) AS count FROM {}", table).as_str(),
            where_clause.clause.as_str(),
        ]),
        params: where_clause.values.clone(),
    };

    (data, count)
}
