use crate::{errors::DbError, models::value::SqlValue};
use async_trait::async_trait;

pub mod postgres;

/// Connection pool abstraction the engine talks to.
///
/// Statements use positional `$n` placeholders; `params[0]` binds `$1`.
#[async_trait]
pub trait DbClient: Send + Sync {
    /// Runs a statement that produces rows, one JSON object per row.
    async fn query(
        &self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Vec<serde_json::Value>, DbError>;
    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, query: &str, params: &[SqlValue]) -> Result<u64, DbError>;
    /// Checks out a single connection for a multi-statement sequence.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, DbError>;
}

#[async_trait]
pub trait Transaction: Send {
    async fn query(
        &mut self,
        query: &str,
        params: &[SqlValue],
    ) -> Result<Vec<serde_json::Value>, DbError>;
    async fn execute(&mut self, query: &str, params: &[SqlValue]) -> Result<u64, DbError>;
    async fn commit(self: Box<Self>) -> Result<(), DbError>;
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}
