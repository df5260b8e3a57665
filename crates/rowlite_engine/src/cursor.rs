//! Materialized query results.

use crate::row::ColumnMap;

/// The materialized result of a query.
///
/// Rows are keyed by the projection text they were requested under, so an
/// aggregate projection like `COUNT(1)` is read back under that exact name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    columns: Vec<String>,
    rows: Vec<ColumnMap>,
}

impl Rows {
    /// Creates a result set from projection names and rows.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<ColumnMap>) -> Self {
        Self { columns, rows }
    }

    /// The projection names, in request order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Checks whether the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the first row, if any.
    pub fn first(&self) -> Option<&ColumnMap> {
        self.rows.first()
    }

    /// Returns a row by position.
    pub fn get(&self, index: usize) -> Option<&ColumnMap> {
        self.rows.get(index)
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, ColumnMap> {
        self.rows.iter()
    }

    /// First row's value under a projection, coerced to an integer.
    pub fn scalar_i64(&self, column: &str) -> Option<i64> {
        self.first().and_then(|row| row.get_i64(column))
    }

    /// First row's value under a projection, coerced to a string.
    pub fn scalar_string(&self, column: &str) -> Option<String> {
        self.first().and_then(|row| row.get_string(column))
    }

    /// Collects one projection across all rows, coerced to integers.
    ///
    /// Rows where the value is null or non-numeric are skipped.
    pub fn column_i64s(&self, column: &str) -> Vec<i64> {
        self.rows.iter().filter_map(|r| r.get_i64(column)).collect()
    }

    /// Collects one projection across all rows, coerced to strings.
    pub fn column_strings(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.get_string(column))
            .collect()
    }

    /// Consumes the result and returns the row list.
    #[must_use]
    pub fn into_rows(self) -> Vec<ColumnMap> {
        self.rows
    }
}

impl IntoIterator for Rows {
    type Item = ColumnMap;
    type IntoIter = std::vec::IntoIter<ColumnMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a ColumnMap;
    type IntoIter = std::slice::Iter<'a, ColumnMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Rows {
        Rows::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                ColumnMap::new().with("id", 1).with("name", "a"),
                ColumnMap::new().with("id", 2).with("name", "b"),
            ],
        )
    }

    #[test]
    fn first_and_get() {
        let rows = sample();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.first().unwrap().get_i64("id"), Some(1));
        assert_eq!(rows.get(1).unwrap().get_text("name"), Some("b"));
        assert!(rows.get(2).is_none());
    }

    #[test]
    fn scalar_helpers() {
        let rows = sample();
        assert_eq!(rows.scalar_i64("id"), Some(1));
        assert_eq!(rows.scalar_string("name"), Some("a".to_string()));
        assert_eq!(rows.column_i64s("id"), vec![1, 2]);
        assert_eq!(rows.column_strings("name"), vec!["a", "b"]);
    }

    #[test]
    fn empty_result() {
        let rows = Rows::default();
        assert!(rows.is_empty());
        assert_eq!(rows.scalar_i64("x"), None);
        assert!(rows.column_i64s("x").is_empty());
    }
}
