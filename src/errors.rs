use thiserror::Error;

/// Custom error type for table query operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// Error that occurs during database interactions (e.g., SQL query failure).
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Export error: {0}")]
    Export(String),
    /// Configuration error (e.g., invalid database URL or missing parameters).
    #[error("Configuration error: {0}")]
    Config(String),
    /// Transaction error (e.g., failed to commit or rollback a transaction).
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// Connection error (e.g., issues with network or database connection).
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Schema '{0}' is not available")]
    SchemaNotAllowed(String),
    /// Introspection found no columns for the requested relation.
    #[error("Table metadata could not be resolved for {schema}.{table}")]
    TableNotFound { schema: String, table: String },
    #[error("No valid columns provided")]
    NoValidColumns,
    #[error("Table does not have a primary key definition")]
    NoPrimaryKey,
    #[error("Missing primary key value for column {0}")]
    MissingPrimaryKey(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// General error with a custom message.
    #[error("Error: {0}")]
    General(String),
}
