use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use sqlx::{
    postgres::{PgArguments, PgPoolOptions},
    query::Query,
    PgPool, Postgres, Row,
};

use crate::{
    errors::DbError,
    models::{connections::ConnectionConfig, value::SqlValue},
};

use super::{DbClient, Transaction};

pub struct PostgresClient {
    pub pool: PgPool,
}

impl PostgresClient {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }
}

/// Wraps a row-producing statement so the server renders each row as JSON.
/// Data-modifying statements with `RETURNING` are valid inside the CTE.
fn json_rows_sql(query: &str) -> String {
    let statement = query.trim().trim_end_matches(';');
    format!(
        "WITH result AS ({}) SELECT row_to_json(result) AS \"row\" FROM result",
        statement
    )
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
        };
    }
    query
}

fn rows_to_json(rows: &[sqlx::postgres::PgRow]) -> Result<Vec<Value>, DbError> {
    rows.iter()
        .map(|row| row.try_get::<Value, _>("row").map_err(DbError::Sqlx))
        .collect()
}

#[async_trait]
impl DbClient for PostgresClient {
    async fn query(&self, query: &str, params: &[SqlValue]) -> Result<Vec<Value>, DbError> {
        let sql = json_rows_sql(query);
        debug!("query: {} ({} params)", query, params.len());
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        rows_to_json(&rows)
    }

    async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        debug!("execute: {} ({} params)", query, params.len());
        let result = bind_params(sqlx::query(query), params)
            .execute(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;
        Ok(result.rows_affected())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, DbError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn query(&mut self, query: &str, params: &[SqlValue]) -> Result<Vec<Value>, DbError> {
        let sql = json_rows_sql(query);
        debug!("tx query: {} ({} params)", query, params.len());
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(DbError::Sqlx)?;

        rows_to_json(&rows)
    }

    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        debug!("tx execute: {} ({} params)", query, params.len());
        let result = bind_params(sqlx::query(query), params)
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::Sqlx)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))
    }
}
