use std::env;

use serde::{Deserialize, Serialize};

use crate::errors::DbError;

pub const DEFAULT_SCHEMAS: [&str; 4] = ["public", "admin", "cms", "dashboards"];

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Schemas a request may address; anything else is refused before SQL is built.
    pub allowed_schemas: Vec<String>,
    /// Run data and count queries in one REPEATABLE READ snapshot.
    pub consistent_counts: bool,
}

impl ConnectionConfig {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            max_connections: 5,
            allowed_schemas: DEFAULT_SCHEMAS.iter().map(|s| s.to_string()).collect(),
            consistent_counts: false,
        }
    }

    /// Reads `DATABASE_URL`, `DB_MAX_CONNECTIONS`, `EXPLORER_SCHEMAS` and
    /// `EXPLORER_CONSISTENT_COUNTS`.
    pub fn from_env() -> Result<Self, DbError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| DbError::Config("DATABASE_URL must be set".to_string()))?;
        Self::from_vars(
            &database_url,
            env::var("DB_MAX_CONNECTIONS").ok().as_deref(),
            env::var("EXPLORER_SCHEMAS").ok().as_deref(),
            env::var("EXPLORER_CONSISTENT_COUNTS").ok().as_deref(),
        )
    }

    fn from_vars(
        database_url: &str,
        max_connections: Option<&str>,
        schemas: Option<&str>,
        consistent_counts: Option<&str>,
    ) -> Result<Self, DbError> {
        let mut config = Self::new(database_url);

        if let Some(raw) = max_connections {
            config.max_connections = raw
                .trim()
                .parse()
                .map_err(|_| DbError::Config(format!("invalid DB_MAX_CONNECTIONS: {}", raw)))?;
        }

        if let Some(raw) = schemas {
            let schemas: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if schemas.is_empty() {
                return Err(DbError::Config("EXPLORER_SCHEMAS is empty".to_string()));
            }
            config.allowed_schemas = schemas;
        }

        if let Some(raw) = consistent_counts {
            config.consistent_counts = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        Ok(config)
    }
}
