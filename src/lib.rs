use db::postgres::PostgresClient;
use errors::DbError;
use models::connections::ConnectionConfig;
use std::sync::Arc;

pub mod client;
pub mod db;
pub mod errors;
pub mod explorer;
pub mod models;

pub use explorer::DataExplorer;

/// Opens a Postgres pool and wraps it in a [`DataExplorer`].
pub async fn connect(config: &ConnectionConfig) -> Result<DataExplorer, DbError> {
    let client = PostgresClient::connect(config).await?;
    Ok(DataExplorer::new(Arc::new(client), config))
}
