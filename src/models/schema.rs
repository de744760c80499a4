use serde::{Deserialize, Serialize};

/// Schema-qualified relation name supplied by the caller.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    pub schema: String,
    pub table: String,
}

impl TableIdentifier {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

/// One row of `information_schema.columns`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableColumn {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub character_maximum_length: Option<i64>,
    pub column_default: Option<String>,
    #[serde(default = "default_udt_schema")]
    pub udt_schema: String,
    #[serde(default)]
    pub udt_name: String,
}

fn default_udt_schema() -> String {
    "pg_catalog".to_string()
}

impl TableColumn {
    /// Nullable column without default, living in `pg_catalog`.
    pub fn new(name: &str, data_type: &str, udt_name: &str) -> Self {
        Self {
            column_name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            character_maximum_length: None,
            column_default: None,
            udt_schema: default_udt_schema(),
            udt_name: udt_name.to_string(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "integer" | "bigint" | "numeric" | "smallint" | "double precision" | "real"
        )
    }

    pub fn is_boolean(&self) -> bool {
        self.data_type == "boolean"
    }

    /// Postgres array columns; their udt is the element type prefixed by `_`.
    pub fn is_array(&self) -> bool {
        self.data_type == "ARRAY"
    }

    /// Columns taking part in free-text search.
    pub fn is_text_like(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "text" | "character varying" | "varchar" | "citext" | "uuid" | "json" | "jsonb"
        )
    }
}

/// Single-column foreign key edge.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForeignKey {
    pub column_name: String,
    pub foreign_table_schema: String,
    pub foreign_table_name: String,
    pub foreign_column_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    #[serde(flatten)]
    pub table: TableIdentifier,
    pub columns: Vec<TableColumn>,
    /// Ordered by key position; empty when the table has no primary key.
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableMetadata {
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}
