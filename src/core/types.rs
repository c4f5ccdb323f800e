use super::{RepoError, Result};
use serde_json::{Map, Value};

/// A storage row: column name to JSON cell, as returned by the backend.
pub type Row = Map<String, Value>;

/// Converts an arbitrary JSON value into a row, rejecting non-objects.
pub fn into_row(value: Value) -> Result<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(RepoError::Transform(format!(
            "expected a JSON object for a row, got {}",
            super::value::type_name(&other)
        ))),
    }
}

/// Builds a row from `(column, value)` pairs.
pub fn row_from<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Current timestamp in the RFC 3339 form the backend stores.
pub fn now_timestamp() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}
