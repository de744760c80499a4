//! Identifier quoting and schema gating.
//!
//! Every identifier that reaches generated SQL goes through
//! [`quote_identifier`]; values never do, they are bound as parameters.

use crate::{errors::DbError, models::schema::TableIdentifier};

/// Double-quotes an identifier, doubling any embedded quote.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`.
pub fn qualified_table(table: &TableIdentifier) -> String {
    format!(
        "{}.{}",
        quote_identifier(&table.schema),
        quote_identifier(&table.table)
    )
}

pub fn ensure_schema_allowed(schema: &str, allowed: &[String]) -> Result<(), DbError> {
    if allowed.iter().any(|s| s == schema) {
        Ok(())
    } else {
        Err(DbError::SchemaNotAllowed(schema.to_string()))
    }
}
