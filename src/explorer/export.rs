//! CSV export of query results.

use std::io::Write;

use csv::Writer;
use serde_json::Value;

use crate::{
    errors::DbError,
    models::{query::QueryResponse, schema::TableMetadata},
};

/// Streams result pages into one CSV document; the header is written with
/// the first page.
pub struct CsvExporter<W: Write> {
    wtr: Writer<W>,
    columns: Option<Vec<String>>,
}

impl<W: Write> CsvExporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            wtr: Writer::from_writer(writer),
            columns: None,
        }
    }

    pub fn write_page(&mut self, rows: &[Value], metadata: &TableMetadata) -> Result<(), DbError> {
        if self.columns.is_none() {
            let columns = header(rows, metadata);
            self.wtr
                .write_record(&columns)
                .map_err(|e| DbError::Export(e.to_string()))?;
            self.columns = Some(columns);
        }
        let columns = self.columns.as_deref().unwrap_or_default();

        for row in rows {
            let record: Vec<String> = columns.iter().map(|c| cell(row.get(c))).collect();
            self.wtr
                .write_record(&record)
                .map_err(|e| DbError::Export(e.to_string()))?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W, DbError> {
        self.wtr.flush().map_err(|e| DbError::Export(e.to_string()))?;
        self.wtr
            .into_inner()
            .map_err(|e| DbError::Export(e.to_string()))
    }
}

/// Column order of the rows themselves, or every table column when there are none.
fn header(rows: &[Value], metadata: &TableMetadata) -> Vec<String> {
    match rows.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => metadata
            .columns
            .iter()
            .map(|c| c.column_name.clone())
            .collect(),
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Writes a single response page.
pub fn write_csv<W: Write>(response: &QueryResponse, writer: W) -> Result<W, DbError> {
    let mut exporter = CsvExporter::new(writer);
    exporter.write_page(&response.rows, &response.metadata)?;
    exporter.finish()
}
