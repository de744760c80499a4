use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    errors::DbError,
    models::{query::QueryRequest, schema::TableIdentifier},
    DataExplorer,
};

pub const USAGE: &str = "usage:
  tablequery tables <schema>
  tablequery describe <schema> <table>
  tablequery query                    < request.json
  tablequery export <file.csv>        < request.json
  tablequery insert <schema> <table>  < values.json
  tablequery update <schema> <table>  < {\"primaryKey\": {..}, \"values\": {..}}
  tablequery delete <schema> <table>  < primary_key.json";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tables { schema: String },
    Describe { table: TableIdentifier },
    Query,
    Export { path: PathBuf },
    Insert { table: TableIdentifier },
    Update { table: TableIdentifier },
    Delete { table: TableIdentifier },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePayload {
    primary_key: Map<String, Value>,
    values: Map<String, Value>,
}

impl Command {
    /// Parses the arguments following the program name.
    pub fn parse(args: &[String]) -> Result<Self, DbError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match args.as_slice() {
            ["tables", schema] => Ok(Command::Tables {
                schema: schema.to_string(),
            }),
            ["describe", schema, name] => Ok(Command::Describe {
                table: TableIdentifier::new(*schema, *name),
            }),
            ["query"] => Ok(Command::Query),
            ["export", path] => Ok(Command::Export {
                path: PathBuf::from(*path),
            }),
            ["insert", schema, name] => Ok(Command::Insert {
                table: TableIdentifier::new(*schema, *name),
            }),
            ["update", schema, name] => Ok(Command::Update {
                table: TableIdentifier::new(*schema, *name),
            }),
            ["delete", schema, name] => Ok(Command::Delete {
                table: TableIdentifier::new(*schema, *name),
            }),
            _ => Err(DbError::InvalidRequest(USAGE.to_string())),
        }
    }

    /// Whether the command reads a JSON document from stdin.
    pub fn reads_input(&self) -> bool {
        !matches!(self, Command::Tables { .. } | Command::Describe { .. })
    }
}

fn parse_object(input: &str) -> Result<Map<String, Value>, DbError> {
    match serde_json::from_str(input)? {
        Value::Object(map) => Ok(map),
        _ => Err(DbError::InvalidRequest(
            "expected a JSON object".to_string(),
        )),
    }
}

/// Runs one command and returns what should be printed.
pub async fn run(explorer: &DataExplorer, command: Command, input: &str) -> Result<Value, DbError> {
    match command {
        Command::Tables { schema } => Ok(json!(explorer.list_tables(&schema).await?)),
        Command::Describe { table } => {
            let metadata = explorer.get_table_metadata(&table).await?;
            Ok(serde_json::to_value(metadata)?)
        }
        Command::Query => {
            let request: QueryRequest = serde_json::from_str(input)?;
            Ok(serde_json::to_value(explorer.query_table_data(&request).await?)?)
        }
        Command::Export { path } => {
            let request: QueryRequest = serde_json::from_str(input)?;
            let written = explorer.export_table_csv(&request, &path).await?;
            Ok(json!({ "rows": written, "path": path.display().to_string() }))
        }
        Command::Insert { table } => explorer.insert_record(&table, &parse_object(input)?).await,
        Command::Update { table } => {
            let payload: UpdatePayload = serde_json::from_str(input)?;
            let row = explorer
                .update_record(&table, &payload.primary_key, &payload.values)
                .await?;
            Ok(row.unwrap_or(Value::Null))
        }
        Command::Delete { table } => {
            explorer.delete_record(&table, &parse_object(input)?).await?;
            Ok(json!({ "deleted": true }))
        }
    }
}
