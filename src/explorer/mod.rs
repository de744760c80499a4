use std::{fs::File, path::Path, sync::Arc};

use log::{debug, info};
use serde_json::{Map, Value};

use crate::{
    db::DbClient,
    errors::DbError,
    models::{
        connections::ConnectionConfig,
        query::{Pagination, QueryRequest, QueryResponse},
        schema::{TableIdentifier, TableMetadata},
    },
};

use self::{
    builder::{build_order_by, build_projection, build_select, build_where_clause, SqlStatement},
    export::CsvExporter,
    filters::normalize_filters,
};

pub mod builder;
pub mod export;
pub mod filters;
pub mod ident;
pub mod metadata;
pub mod mutations;

const REPEATABLE_READ: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY";

/// Generic table query engine over an injected connection pool.
///
/// Authorization is the caller's job; every public method assumes the
/// request has already been cleared to touch the table.
pub struct DataExplorer {
    client: Arc<dyn DbClient>,
    allowed_schemas: Vec<String>,
    consistent_counts: bool,
}

impl DataExplorer {
    pub fn new(client: Arc<dyn DbClient>, config: &ConnectionConfig) -> Self {
        Self {
            client,
            allowed_schemas: config.allowed_schemas.clone(),
            consistent_counts: config.consistent_counts,
        }
    }

    pub async fn list_tables(&self, schema: &str) -> Result<Vec<String>, DbError> {
        ident::ensure_schema_allowed(schema, &self.allowed_schemas)?;
        metadata::list_tables(self.client.as_ref(), schema).await
    }

    pub async fn get_table_metadata(
        &self,
        table: &TableIdentifier,
    ) -> Result<TableMetadata, DbError> {
        ident::ensure_schema_allowed(&table.schema, &self.allowed_schemas)?;
        metadata::get_table_metadata(self.client.as_ref(), table).await
    }

    /// Like [`Self::get_table_metadata`], but a relation without columns is
    /// an error.
    async fn resolve_table(&self, table: &TableIdentifier) -> Result<TableMetadata, DbError> {
        let metadata = self.get_table_metadata(table).await?;
        if metadata.columns.is_empty() {
            return Err(DbError::TableNotFound {
                schema: table.schema.clone(),
                table: table.table.clone(),
            });
        }
        Ok(metadata)
    }

    pub async fn query_table_data(&self, request: &QueryRequest) -> Result<QueryResponse, DbError> {
        let metadata = self.resolve_table(&request.table).await?;

        let filters = normalize_filters(&request.filters, &metadata);
        let where_clause = build_where_clause(&filters, &metadata, request.search.as_deref());
        let projection = build_projection(request.columns.as_deref(), &metadata);
        let order_by = build_order_by(request.sort.as_ref(), &metadata);
        let pagination = Pagination::clamp(request.page, request.page_size);

        let (data, count) = build_select(&metadata, &where_clause, &projection, &order_by, pagination);
        debug!(
            "query {}.{}: {} filters, page {} size {}",
            metadata.table.schema,
            metadata.table.table,
            filters.len(),
            pagination.page,
            pagination.page_size
        );

        let (rows, count_rows) = if self.consistent_counts {
            self.run_in_snapshot(&data, &count).await?
        } else {
            tokio::try_join!(
                self.client.query(&data.sql, &data.params),
                self.client.query(&count.sql, &count.params)
            )?
        };

        let total = count_rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let has_more = pagination.has_more(rows.len(), total);

        Ok(QueryResponse {
            rows,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            has_more,
            metadata,
        })
    }

    async fn run_in_snapshot(
        &self,
        data: &SqlStatement,
        count: &SqlStatement,
    ) -> Result<(Vec<Value>, Vec<Value>), DbError> {
        let mut tx = self.client.begin_transaction().await?;
        let result = async {
            tx.execute(REPEATABLE_READ, &[]).await?;
            let rows = tx.query(&data.sql, &data.params).await?;
            let count_rows = tx.query(&count.sql, &count.params).await?;
            Ok::<_, DbError>((rows, count_rows))
        }
        .await;

        match result {
            Ok(pair) => {
                tx.commit().await?;
                Ok(pair)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Inserts the known columns of `values` and returns the stored row.
    pub async fn insert_record(
        &self,
        table: &TableIdentifier,
        values: &Map<String, Value>,
    ) -> Result<Value, DbError> {
        let metadata = self.resolve_table(table).await?;
        let statement = mutations::build_insert(&metadata, values)?;
        let row = self.returning_row(&statement).await?;
        info!("inserted into {}.{}", table.schema, table.table);
        // INSERT .. RETURNING always yields the row
        row.ok_or_else(|| DbError::General("insert returned no row".to_string()))
    }

    /// Updates the row addressed by `primary_key`; `None` when no row matched.
    pub async fn update_record(
        &self,
        table: &TableIdentifier,
        primary_key: &Map<String, Value>,
        values: &Map<String, Value>,
    ) -> Result<Option<Value>, DbError> {
        let metadata = self.resolve_table(table).await?;
        let statement = mutations::build_update(&metadata, primary_key, values)?;
        let row = self.returning_row(&statement).await?;
        info!(
            "updated {}.{} ({} row)",
            table.schema,
            table.table,
            if row.is_some() { 1 } else { 0 }
        );
        Ok(row)
    }

    pub async fn delete_record(
        &self,
        table: &TableIdentifier,
        primary_key: &Map<String, Value>,
    ) -> Result<(), DbError> {
        let metadata = self.resolve_table(table).await?;
        let statement = mutations::build_delete(&metadata, primary_key)?;
        let affected = self.client.execute(&statement.sql, &statement.params).await?;
        info!(
            "deleted from {}.{} ({} rows)",
            table.schema, table.table, affected
        );
        Ok(())
    }

    async fn returning_row(&self, statement: &SqlStatement) -> Result<Option<Value>, DbError> {
        let rows = self.client.query(&statement.sql, &statement.params).await?;
        Ok(rows.into_iter().next())
    }

    /// Walks every page of `request` into a CSV file. Returns the number of rows written.
    pub async fn export_table_csv(
        &self,
        request: &QueryRequest,
        path: &Path,
    ) -> Result<u64, DbError> {
        let file = File::create(path).map_err(|e| DbError::Export(e.to_string()))?;
        let mut exporter = CsvExporter::new(file);
        let mut page_request = request.clone();
        page_request.page = Some(1);
        let mut written = 0_u64;

        loop {
            let response = self.query_table_data(&page_request).await?;
            exporter.write_page(&response.rows, &response.metadata)?;
            written += response.rows.len() as u64;
            if !response.has_more || response.rows.is_empty() {
                break;
            }
            page_request.page = Some(response.page + 1);
        }

        exporter.finish()?;
        info!("exported {} rows to {}", written, path.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        mock::{MockClient, MockTransaction},
        Transaction,
    };
    use crate::models::{
        query::{SortDirection, SortState},
        value::SqlValue,
    };
    use metadata::tests::{catalog_transaction, column_row, users_catalog, Catalog};
    use serde_json::json;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("postgres://localhost/test")
    }

    fn explorer(client: MockClient) -> DataExplorer {
        DataExplorer::new(Arc::new(client), &config())
    }

    fn expect_introspection(client: &mut MockClient, catalog: Catalog) {
        let tx = catalog_transaction(catalog);
        client
            .expect_begin_transaction()
            .times(1)
            .return_once(move || Ok(Box::new(tx) as Box<dyn Transaction>));
    }

    fn users_request() -> QueryRequest {
        QueryRequest::new("public", "users")
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    #[tokio::test]
    async fn test_query_false_boolean_filter() {
        let mut client = MockClient::new();
        expect_introspection(&mut client, users_catalog());
        client
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT *"))
            .times(1)
            .returning(|sql, params| {
                assert_eq!(
                    sql,
                    "SELECT * FROM \"public\".\"users\" WHERE \"is_active\" = $1 LIMIT $2 OFFSET $3"
                );
                assert_eq!(
                    params.to_vec(),
                    vec![SqlValue::Bool(false), SqlValue::Int(10), SqlValue::Int(0)]
                );
                Ok(vec![json!({"id": 3, "email": "c@example.com", "is_active": false})])
            });
        client
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT COUNT(*)"))
            .times(1)
            .returning(|sql, params| {
                assert!(sql.ends_with("WHERE \"is_active\" = $1"));
                assert_eq!(params.to_vec(), vec![SqlValue::Bool(false)]);
                Ok(vec![json!({"count": 1})])
            });

        let mut request = users_request();
        request.filters.insert("is_active.eq".to_string(), json!(false));
        request.page = Some(1);
        request.page_size = Some(10);

        let response = explorer(client).query_table_data(&request).await.unwrap();
        assert_eq!(response.rows.len(), 1);
        assert_eq!(response.total, 1);
        assert_eq!(response.page, 1);
        assert_eq!(response.page_size, 10);
        assert!(!response.has_more);
        assert_eq!(response.metadata.primary_key, vec!["id"]);
    }

    #[tokio::test]
    async fn test_query_search_and_sort() {
        let mut client = MockClient::new();
        expect_introspection(&mut client, users_catalog());
        client
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT \"email\""))
            .times(1)
            .returning(|sql, params| {
                assert_eq!(
                    sql,
                    "SELECT \"email\", \"id\" FROM \"public\".\"users\" \
                     WHERE (\"email\"::text ILIKE $1) ORDER BY \"email\" DESC LIMIT $2 OFFSET $3"
                );
                assert_eq!(params[0], SqlValue::Text("%alice%".to_string()));
                Ok(Vec::new())
            });
        client
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT COUNT(*)"))
            .times(1)
            .returning(|_, _| Ok(vec![json!({"count": 0})]));

        let mut request = users_request();
        request.search = Some("alice".to_string());
        request.columns = Some(vec!["email".into(), "ghost".into(), "id".into()]);
        request.sort = Some(SortState {
            column: "email".into(),
            direction: SortDirection::Desc,
        });

        let response = explorer(client).query_table_data(&request).await.unwrap();
        assert!(response.rows.is_empty());
        assert_eq!(response.total, 0);
        assert_eq!(response.page_size, 50);
        assert!(!response.has_more);
    }

    #[tokio::test]
    async fn test_full_page_under_total() {
        let mut client = MockClient::new();
        expect_introspection(&mut client, users_catalog());
        client
            .expect_query()
            .withf(|sql, _| !sql.starts_with("SELECT COUNT(*)"))
            .returning(|_, params| {
                assert_eq!(params.to_vec(), vec![SqlValue::Int(50), SqlValue::Int(0)]);
                Ok((0..37).map(|i| json!({"id": i})).collect())
            });
        client
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT COUNT(*)"))
            .returning(|_, _| Ok(vec![json!({"count": 37})]));

        let mut request = users_request();
        request.page = Some(1);
        request.page_size = Some(50);

        let response = explorer(client).query_table_data(&request).await.unwrap();
        assert_eq!(response.rows.len(), 37);
        assert_eq!(response.total, 37);
        assert!(!response.has_more);
    }

    #[tokio::test]
    async fn test_has_more_on_middle_page() {
        let mut client = MockClient::new();
        expect_introspection(&mut client, users_catalog());
        client
            .expect_query()
            .withf(|sql, _| !sql.starts_with("SELECT COUNT(*)"))
            .returning(|_, params| {
                assert_eq!(params.to_vec(), vec![SqlValue::Int(10), SqlValue::Int(10)]);
                Ok((0..10).map(|i| json!({"id": i})).collect())
            });
        client
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT COUNT(*)"))
            .returning(|_, _| Ok(vec![json!({"count": 25})]));

        let mut request = users_request();
        request.page = Some(2);
        request.page_size = Some(10);

        let response = explorer(client).query_table_data(&request).await.unwrap();
        assert!(response.has_more);
    }

    #[tokio::test]
    async fn test_unknown_table_fails() {
        let mut client = MockClient::new();
        expect_introspection(
            &mut client,
            Catalog {
                columns: Vec::new(),
                primary_key: Vec::new(),
                foreign_keys: Vec::new(),
            },
        );
        client.expect_query().never();

        let result = explorer(client)
            .query_table_data(&QueryRequest::new("public", "missing"))
            .await;
        assert!(matches!(result, Err(DbError::TableNotFound { .. })));
    }

    #[tokio::test]
    async fn test_disallowed_schema_issues_no_sql() {
        let mut client = MockClient::new();
        client.expect_begin_transaction().never();
        client.expect_query().never();

        let result = explorer(client)
            .query_table_data(&QueryRequest::new("pg_catalog", "pg_authid"))
            .await;
        assert!(matches!(result, Err(DbError::SchemaNotAllowed(_))));
    }

    #[tokio::test]
    async fn test_query_errors_propagate() {
        let mut client = MockClient::new();
        expect_introspection(&mut client, users_catalog());
        client
            .expect_query()
            .returning(|_, _| Err(DbError::Connection("reset by peer".to_string())));

        let result = explorer(client).query_table_data(&users_request()).await;
        assert!(matches!(result, Err(DbError::Connection(_))));
    }

    #[tokio::test]
    async fn test_consistent_counts_share_a_snapshot() {
        let mut client = MockClient::new();
        let introspection = catalog_transaction(users_catalog());
        let mut snapshot = MockTransaction::new();
        snapshot
            .expect_execute()
            .withf(|sql, _| sql.contains("REPEATABLE READ"))
            .times(1)
            .returning(|_, _| Ok(0));
        snapshot
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT COUNT(*)"))
            .times(1)
            .returning(|_, _| Ok(vec![json!({"count": 2})]));
        snapshot
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT *"))
            .times(1)
            .returning(|_, _| Ok(vec![json!({"id": 1}), json!({"id": 2})]));
        snapshot.expect_commit().times(1).returning(|| Ok(()));

        let mut transactions = vec![
            Box::new(snapshot) as Box<dyn Transaction>,
            Box::new(introspection) as Box<dyn Transaction>,
        ];
        client
            .expect_begin_transaction()
            .times(2)
            .returning(move || Ok(transactions.pop().expect("transaction")));
        client.expect_query().never();

        let mut config = config();
        config.consistent_counts = true;
        let explorer = DataExplorer::new(Arc::new(client), &config);

        let response = explorer.query_table_data(&users_request()).await.unwrap();
        assert_eq!(response.total, 2);
        assert_eq!(response.rows.len(), 2);
        assert!(!response.has_more);
    }

    #[tokio::test]
    async fn test_insert_keeps_known_columns() {
        let mut client = MockClient::new();
        expect_introspection(
            &mut client,
            Catalog {
                columns: vec![column_row("name", "text", "text")],
                primary_key: Vec::new(),
                foreign_keys: Vec::new(),
            },
        );
        client
            .expect_query()
            .times(1)
            .returning(|sql, params| {
                assert_eq!(
                    sql,
                    "INSERT INTO \"public\".\"widgets\" (\"name\") VALUES ($1) RETURNING *"
                );
                assert_eq!(params.to_vec(), vec![SqlValue::Text("x".to_string())]);
                Ok(vec![json!({"name": "x"})])
            });

        let row = explorer(client)
            .insert_record(
                &TableIdentifier::new("public", "widgets"),
                &map(json!({"unknownCol": 1, "name": "x"})),
            )
            .await
            .unwrap();
        assert_eq!(row, json!({"name": "x"}));
    }

    #[tokio::test]
    async fn test_update_without_primary_key_issues_no_statement() {
        let mut client = MockClient::new();
        expect_introspection(
            &mut client,
            Catalog {
                columns: vec![column_row("message", "text", "text")],
                primary_key: Vec::new(),
                foreign_keys: Vec::new(),
            },
        );
        client.expect_query().never();
        client.expect_execute().never();

        let result = explorer(client)
            .update_record(
                &TableIdentifier::new("admin", "audit_log"),
                &map(json!({"message": "a"})),
                &map(json!({"message": "b"})),
            )
            .await;
        assert!(matches!(result, Err(DbError::NoPrimaryKey)));
    }

    #[tokio::test]
    async fn test_update_returns_row() {
        let mut client = MockClient::new();
        expect_introspection(&mut client, users_catalog());
        client
            .expect_query()
            .times(1)
            .returning(|sql, params| {
                assert_eq!(
                    sql,
                    "UPDATE \"public\".\"users\" SET \"is_active\" = $1 WHERE \"id\" = $2 RETURNING *"
                );
                assert_eq!(params.to_vec(), vec![SqlValue::Bool(true), SqlValue::Int(4)]);
                Ok(vec![json!({"id": 4, "email": "d@example.com", "is_active": true})])
            });

        let row = explorer(client)
            .update_record(
                &TableIdentifier::new("public", "users"),
                &map(json!({"id": 4})),
                &map(json!({"is_active": true})),
            )
            .await
            .unwrap();
        assert_eq!(row.unwrap()["is_active"], json!(true));
    }

    #[tokio::test]
    async fn test_delete_by_primary_key() {
        let mut client = MockClient::new();
        expect_introspection(&mut client, users_catalog());
        client
            .expect_execute()
            .withf(|sql, params| {
                sql == "DELETE FROM \"public\".\"users\" WHERE \"id\" = $1"
                    && params.len() == 1
                    && params[0] == SqlValue::Int(9)
            })
            .times(1)
            .returning(|_, _| Ok(1));
        client.expect_query().never();

        explorer(client)
            .delete_record(&TableIdentifier::new("public", "users"), &map(json!({"id": 9})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_key_value() {
        let mut client = MockClient::new();
        expect_introspection(&mut client, users_catalog());
        client.expect_execute().never();

        let result = explorer(client)
            .delete_record(&TableIdentifier::new("public", "users"), &map(json!({})))
            .await;
        assert!(matches!(result, Err(DbError::MissingPrimaryKey(c)) if c == "id"));
    }

    #[tokio::test]
    async fn test_export_walks_every_page() {
        let mut client = MockClient::new();
        client.expect_begin_transaction().times(2).returning(|| {
            Ok(Box::new(catalog_transaction(users_catalog())) as Box<dyn Transaction>)
        });
        client
            .expect_query()
            .withf(|sql, _| !sql.starts_with("SELECT COUNT(*)"))
            .times(2)
            .returning(|_, params| match params[1] {
                SqlValue::Int(0) => Ok(vec![
                    json!({"id": 1, "email": "a@example.com", "is_active": true}),
                    json!({"id": 2, "email": null, "is_active": false}),
                ]),
                _ => Ok(vec![json!({"id": 3, "email": "c@example.com", "is_active": true})]),
            });
        client
            .expect_query()
            .withf(|sql, _| sql.starts_with("SELECT COUNT(*)"))
            .times(2)
            .returning(|_, _| Ok(vec![json!({"count": 3})]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        let mut request = users_request();
        request.page = Some(4);
        request.page_size = Some(2);

        let written = explorer(client)
            .export_table_csv(&request, &path)
            .await
            .unwrap();
        assert_eq!(written, 3);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "id,email,is_active\n1,a@example.com,true\n2,NULL,false\n3,c@example.com,true\n"
        );
    }
}
