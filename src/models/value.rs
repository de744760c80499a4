use serde::{Serialize, Serializer};
use serde_json::Value;

/// A value bound to a positional `$n` parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(Value),
}

impl SqlValue {
    /// Maps a raw JSON value onto the closest bindable type without looking at
    /// the target column.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Json(other.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Json(v) => v.clone(),
        }
    }

    /// Textual rendering used for ILIKE patterns.
    pub fn as_text(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Json(v) => v.to_string(),
        }
    }
}

/// Renders a JSON array as a Postgres array literal, e.g. `{"a","b",NULL}`.
/// Strings and objects are always quoted so `NULL` or `,` inside them stay text.
pub fn array_literal(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let elements: Vec<String> = items.iter().map(array_element).collect();
            format!("{{{}}}", elements.join(","))
        }
        other => array_element(other),
    }
}

fn array_element(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_element(s),
        Value::Array(_) => array_literal(value),
        Value::Object(_) => quote_element(&value.to_string()),
    }
}

fn quote_element(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
