//! Column-keyed row payloads.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A mapping from column name to [`Value`].
///
/// Used both as the write payload handed to the engine and as the row shape
/// returned from queries. Keys are unique; iteration order is the sorted
/// column name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMap {
    entries: BTreeMap<String, Value>,
}

impl ColumnMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value, replacing any previous value.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(column.into(), value.into());
    }

    /// Builder-style [`put`](Self::put).
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(column, value);
        self
    }

    /// Returns the value stored under a column, if any.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries.get(column)
    }

    /// Returns a column coerced to an integer.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::coerce_i64)
    }

    /// Returns a column coerced to a float.
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::coerce_f64)
    }

    /// Returns a column as a string slice, if it holds text.
    pub fn get_text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_text)
    }

    /// Returns a column coerced to an owned string.
    pub fn get_string(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Value::coerce_string)
    }

    /// Returns a column as bytes, if it holds a blob.
    pub fn get_blob(&self, column: &str) -> Option<&[u8]> {
        self.get(column).and_then(Value::as_blob)
    }

    /// Checks whether a column is present (even if null).
    pub fn contains(&self, column: &str) -> bool {
        self.entries.contains_key(column)
    }

    /// Removes a column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.entries.remove(column)
    }

    /// Number of columns in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the map has no columns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(column, value)` pairs in sorted column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over column names in sorted order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Copies every entry of `other` into this map, replacing collisions.
    pub fn merge(&mut self, other: &ColumnMap) {
        for (column, value) in &other.entries {
            self.entries.insert(column.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ColumnMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ColumnMap::new();
        for (k, v) in iter {
            map.put(k, v);
        }
        map
    }
}
