//! Database result-row abstraction.
//!
//! Rows are produced by an external SQL execution layer and consumed by the
//! row transformers. The mapping engine never builds SQL; it only reads
//! values back out of rows keyed by column name (possibly through an alias).

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows of a result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Whether a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// All column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single result row.
///
/// Values are stored in column order; the shared `ColumnInfo` provides name
/// lookup. Rows from the same result set should share the column metadata
/// through `with_columns`.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given column names and values.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a row from (name, value) pairs.
    ///
    /// Convenience for tests and round-trip helpers.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        let (names, values) = pairs.into_iter().unzip();
        Self::new(names, values)
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Whether a column exists by name.
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Get a typed value by column name.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| TypeError {
            expected: std::any::type_name::<T>(),
            actual: format!("column '{}' not found", name),
            column: Some(name.to_string()),
        })?;
        T::from_value(value).map_err(|mut te| {
            te.column = Some(name.to_string());
            Error::from(te)
        })
    }

    /// Iterate over (column name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Conversion from a `Value` to a concrete property type.
pub trait FromValue: Sized {
    /// Convert from a value, or describe the mismatch.
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError>;
}

fn mismatch<T>(value: &Value) -> TypeError {
    TypeError {
        expected: std::any::type_name::<T>(),
        actual: value.type_name().to_string(),
        column: None,
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        value.as_bool().ok_or_else(|| mismatch::<bool>(value))
    }
}

impl FromValue for i16 {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        match value {
            Value::SmallInt(v) => Ok(*v),
            _ => Err(mismatch::<i16>(value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        match value {
            Value::SmallInt(v) => Ok(i32::from(*v)),
            Value::Int(v) => Ok(*v),
            Value::Date(v) => Ok(*v),
            _ => Err(mismatch::<i32>(value)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        value.as_i64().ok_or_else(|| mismatch::<i64>(value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        value.as_f64().ok_or_else(|| mismatch::<f64>(value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(mismatch::<String>(value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            _ => Err(mismatch::<Vec<u8>>(value)),
        }
    }
}

impl FromValue for [u8; 16] {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        match value {
            Value::Uuid(v) => Ok(*v),
            _ => Err(mismatch::<[u8; 16]>(value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            _ => Err(mismatch::<serde_json::Value>(value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> std::result::Result<Self, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row::from_pairs(vec![
            ("id".to_string(), Value::BigInt(1)),
            ("name".to_string(), Value::Text("Ada".to_string())),
            ("age".to_string(), Value::Null),
        ])
    }

    #[test]
    fn test_access_by_name_and_index() {
        let row = sample_row();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(0), Some(&Value::BigInt(1)));
        assert_eq!(row.get_by_name("name"), Some(&Value::Text("Ada".to_string())));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_typed_access() {
        let row = sample_row();
        assert_eq!(row.get_named::<i64>("id").unwrap(), 1);
        assert_eq!(row.get_named::<String>("name").unwrap(), "Ada");
        assert_eq!(row.get_named::<Option<i32>>("age").unwrap(), None);
    }

    #[test]
    fn test_type_error_carries_column() {
        let row = sample_row();
        let err = row.get_named::<i64>("name").unwrap_err();
        assert_eq!(err.column.as_deref(), Some("name"));
    }

    #[test]
    fn test_null_into_non_optional_fails() {
        let row = sample_row();
        assert!(row.get_named::<i32>("age").is_err());
    }

    #[test]
    fn test_shared_column_info() {
        let columns = Arc::new(ColumnInfo::new(vec!["a".to_string(), "b".to_string()]));
        let r1 = Row::with_columns(Arc::clone(&columns), vec![Value::Int(1), Value::Int(2)]);
        let r2 = Row::with_columns(Arc::clone(&columns), vec![Value::Int(3), Value::Int(4)]);
        assert!(Arc::ptr_eq(&r1.column_info(), &r2.column_info()));
        assert_eq!(r2.get_named::<i32>("b").unwrap(), 4);
    }

    #[test]
    fn test_iter_pairs() {
        let row = Row::from_pairs(vec![
            ("x".to_string(), Value::Int(1)),
            ("y".to_string(), Value::Int(2)),
        ]);
        let pairs: Vec<_> = row.iter().collect();
        assert_eq!(pairs, vec![("x", &Value::Int(1)), ("y", &Value::Int(2))]);
    }
}
