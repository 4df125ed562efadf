//! Raw record representation.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows of one result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping for O(1) lookup
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

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A raw record emitted by a connector.
///
/// Rows carry no identity: a connector hands each one over exactly once and
/// the instantiation stage consumes it.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(names, values)
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Get the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row is empty.
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

    /// Check if a column exists by name.
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.index_of(name).is_some()
    }

    /// Get a typed value by column name.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            other => other,
        })
    }

    /// Get an optional typed value: missing columns and NULL read as `None`.
    #[allow(clippy::result_large_err)]
    pub fn get_opt<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
        match self.get_by_name(name) {
            None => Ok(None),
            Some(_) => self.get_named::<Option<T>>(name),
        }
    }

    /// Keep only the named columns, in the order given.
    ///
    /// Unknown names are skipped. An empty selection keeps every column.
    pub fn project(self, fields: &[String]) -> Row {
        if fields.is_empty() {
            return self;
        }
        let (names, values): (Vec<String>, Vec<Value>) = fields
            .iter()
            .filter_map(|f| {
                self.get_by_name(f)
                    .map(|value| (f.clone(), value.clone()))
            })
            .unzip();
        Row::new(names, values)
    }

    /// Iterate over column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names().zip(self.values.iter())
    }

    /// Render this row as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(name, value)| {
                let json = serde_json::to_value(value).unwrap_or_else(|e| {
                    tracing::warn!(column = name, error = %e, "value not representable as JSON");
                    serde_json::Value::Null
                });
                (name.to_string(), json)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Conversion from a borrowed [`Value`] into a Rust type.
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

macro_rules! from_value_via_try_from {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    <$ty>::try_from(value.clone())
                }
            }
        )*
    };
}

from_value_via_try_from!(bool, i64, f64, String);

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

/// NULL reads as `None`.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
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

    fn user_row() -> Row {
        Row::from_pairs([
            ("firstName", Value::from("Guillaume")),
            ("lastName", Value::from("Daix")),
            ("age", Value::BigInt(30)),
        ])
    }

    #[test]
    fn named_access() {
        let row = user_row();
        assert_eq!(row.get_named::<String>("firstName").unwrap(), "Guillaume");
        assert_eq!(row.get_named::<i64>("age").unwrap(), 30);
        assert!(row.contains_column("lastName"));
        assert!(!row.contains_column("createdAt"));
    }

    #[test]
    fn named_access_reports_column_on_type_error() {
        let row = user_row();
        let err = row.get_named::<i64>("firstName").unwrap_err();
        match err {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("firstName")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn optional_access() {
        let row = Row::from_pairs([("age", Value::Null)]);
        assert_eq!(row.get_opt::<i64>("age").unwrap(), None);
        assert_eq!(row.get_opt::<i64>("missing").unwrap(), None);
        assert_eq!(user_row().get_opt::<i64>("age").unwrap(), Some(30));
    }

    #[test]
    fn project_narrows_columns() {
        let row = user_row().project(&["age".to_string(), "nope".to_string()]);
        assert_eq!(row.len(), 1);
        assert_eq!(row.get_by_name("age"), Some(&Value::BigInt(30)));

        let full = user_row().project(&[]);
        assert_eq!(full.len(), 3);
    }

    #[test]
    fn to_json_object() {
        let json = user_row().to_json();
        assert!(json.get("firstName").is_some());
        assert_eq!(json.as_object().map(|o| o.len()), Some(3));
    }
}
