//! Catalog introspection for a single relation.

use log::debug;
use serde::Deserialize;

use crate::{
    db::{DbClient, Transaction},
    errors::DbError,
    models::{
        schema::{ForeignKey, TableColumn, TableIdentifier, TableMetadata},
        value::SqlValue,
    },
};

const COLUMNS_QUERY: &str = r#"
    SELECT c.column_name,
           c.data_type,
           c.is_nullable = 'YES' AS is_nullable,
           c.character_maximum_length,
           c.column_default,
           c.udt_schema,
           c.udt_name
    FROM information_schema.columns c
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT kcu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
        AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = $1
        AND tc.table_name = $2
    ORDER BY kcu.ordinal_position
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT kcu.column_name,
           ccu.table_schema AS foreign_table_schema,
           ccu.table_name AS foreign_table_name,
           ccu.column_name AS foreign_column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
        AND tc.table_name = kcu.table_name
    JOIN information_schema.constraint_column_usage ccu
        ON ccu.constraint_name = tc.constraint_name
        AND ccu.constraint_schema = tc.constraint_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_schema = $1
        AND tc.table_name = $2
    ORDER BY kcu.column_name
"#;

const TABLES_QUERY: &str = r#"
    SELECT table_name
    FROM information_schema.tables
    WHERE table_schema = $1
        AND table_type IN ('BASE TABLE', 'VIEW')
    ORDER BY table_name
"#;

#[derive(Deserialize)]
struct ColumnNameRow {
    column_name: String,
}

#[derive(Deserialize)]
struct TableNameRow {
    table_name: String,
}

fn decode<T: for<'de> Deserialize<'de>>(rows: Vec<serde_json::Value>) -> Result<Vec<T>, DbError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(DbError::from))
        .collect()
}

async fn introspect(
    tx: &mut dyn Transaction,
    table: &TableIdentifier,
) -> Result<TableMetadata, DbError> {
    let params = [
        SqlValue::Text(table.schema.clone()),
        SqlValue::Text(table.table.clone()),
    ];

    let columns: Vec<TableColumn> = decode(tx.query(COLUMNS_QUERY, &params).await?)?;
    let primary_key: Vec<ColumnNameRow> = decode(tx.query(PRIMARY_KEY_QUERY, &params).await?)?;
    let foreign_keys: Vec<ForeignKey> = decode(tx.query(FOREIGN_KEYS_QUERY, &params).await?)?;

    Ok(TableMetadata {
        table: table.clone(),
        columns,
        primary_key: primary_key.into_iter().map(|r| r.column_name).collect(),
        foreign_keys,
    })
}

/// Reads columns, primary key and foreign keys on one checked-out connection.
///
/// A relation that does not exist comes back with no columns; callers decide
/// whether that is an error.
pub async fn get_table_metadata(
    client: &dyn DbClient,
    table: &TableIdentifier,
) -> Result<TableMetadata, DbError> {
    let mut tx = client.begin_transaction().await?;
    match introspect(tx.as_mut(), table).await {
        Ok(metadata) => {
            tx.commit().await?;
            debug!(
                "introspected {}.{}: {} columns, pk {:?}",
                table.schema,
                table.table,
                metadata.columns.len(),
                metadata.primary_key
            );
            Ok(metadata)
        }
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        }
    }
}

pub async fn list_tables(client: &dyn DbClient, schema: &str) -> Result<Vec<String>, DbError> {
    let rows: Vec<TableNameRow> = decode(
        client
            .query(TABLES_QUERY, &[SqlValue::Text(schema.to_string())])
            .await?,
    )?;
    Ok(rows.into_iter().map(|r| r.table_name).collect())
}
