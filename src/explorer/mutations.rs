//! Primary-key addressed INSERT / UPDATE / DELETE statements.
//!
//! These builders do no authorization; callers are expected to have checked
//! permissions before reaching them.

use serde_json::{Map, Value};

use super::{
    builder::{Params, SqlStatement},
    ident::{qualified_table, quote_identifier},
};
use crate::{
    errors::DbError,
    models::{
        schema::{TableColumn, TableMetadata},
        value::SqlValue,
    },
};

/// Payload entries whose key names a known column, in payload order.
fn known_columns<'a>(
    values: &'a Map<String, Value>,
    metadata: &'a TableMetadata,
) -> Vec<(&'a TableColumn, &'a Value)> {
    values
        .iter()
        .filter_map(|(name, value)| metadata.column(name).map(|column| (column, value)))
        .collect()
}

/// `"pk1" = $n AND "pk2" = $m`, requiring a value for every key column.
fn primary_key_condition(
    metadata: &TableMetadata,
    primary_key: &Map<String, Value>,
    params: &mut Params,
) -> Result<String, DbError> {
    if metadata.primary_key.is_empty() {
        return Err(DbError::NoPrimaryKey);
    }

    let mut conditions = Vec::with_capacity(metadata.primary_key.len());
    for key in &metadata.primary_key {
        let value = match primary_key.get(key) {
            Some(value) if !value.is_null() => value,
            _ => return Err(DbError::MissingPrimaryKey(key.clone())),
        };
        let column = metadata
            .column(key)
            .ok_or_else(|| DbError::MissingPrimaryKey(key.clone()))?;
        let placeholder = params.push_for(SqlValue::from_json(value), column);
        conditions.push(format!("{} = {}", quote_identifier(key), placeholder));
    }

    Ok(conditions.join(" AND "))
}

pub fn build_insert(
    metadata: &TableMetadata,
    values: &Map<String, Value>,
) -> Result<SqlStatement, DbError> {
    let entries = known_columns(values, metadata);
    if entries.is_empty() {
        return Err(DbError::NoValidColumns);
    }

    let mut params = Params::default();
    let mut columns = Vec::with_capacity(entries.len());
    let mut placeholders = Vec::with_capacity(entries.len());
    for (column, value) in entries {
        columns.push(quote_identifier(&column.column_name));
        placeholders.push(params.push_for(SqlValue::from_json(value), column));
    }

    Ok(SqlStatement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            qualified_table(&metadata.table),
            columns.join(", "),
            placeholders.join(", ")
        ),
        params: params.into_values(),
    })
}

pub fn build_update(
    metadata: &TableMetadata,
    primary_key: &Map<String, Value>,
    values: &Map<String, Value>,
) -> Result<SqlStatement, DbError> {
    if metadata.primary_key.is_empty() {
        return Err(DbError::NoPrimaryKey);
    }
    let entries = known_columns(values, metadata);
    if entries.is_empty() {
        return Err(DbError::NoValidColumns);
    }

    let mut params = Params::default();
    let assignments: Vec<String> = entries
        .into_iter()
        .map(|(column, value)| {
            let placeholder = params.push_for(SqlValue::from_json(value), column);
            format!("{} = {}", quote_identifier(&column.column_name), placeholder)
        })
        .collect();
    let condition = primary_key_condition(metadata, primary_key, &mut params)?;

    Ok(SqlStatement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            qualified_table(&metadata.table),
            assignments.join(", "),
            condition
        ),
        params: params.into_values(),
    })
}

pub fn build_delete(
    metadata: &TableMetadata,
    primary_key: &Map<String, Value>,
) -> Result<SqlStatement, DbError> {
    let mut params = Params::default();
    let condition = primary_key_condition(metadata, primary_key, &mut params)?;

    Ok(SqlStatement {
        sql: format!(
            "DELETE FROM {} WHERE {}",
            qualified_table(&metadata.table),
            condition
        ),
        params: params.into_values(),
    })
}
