//! Table storage: declared columns, stored rows, constraint checks.

use crate::error::{EngineError, EngineResult};
use crate::predicate::Predicate;
use crate::row::ColumnMap;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Declared shape of one stored column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Reject null values.
    pub not_null: bool,
    /// Reject duplicate non-null values.
    pub unique: bool,
    /// This column is the table's primary key.
    pub primary_key: bool,
    /// Assign the key from the table's monotonic counter when absent.
    /// Only valid together with `primary_key`.
    pub auto_increment: bool,
    /// Value filled in when an insert omits the column.
    pub default: Option<Value>,
}

impl ColumnDef {
    /// Creates a plain column with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            not_null: false,
            unique: false,
            primary_key: false,
            auto_increment: false,
            default: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as an auto-incrementing primary key.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.primary_key = true;
        self.auto_increment = true;
        self
    }

    /// Sets the default value filled in when inserts omit the column.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// One stored row with its stable rowid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredRow {
    pub(crate) rowid: i64,
    pub(crate) values: ColumnMap,
}

/// One table: declared columns plus stored rows.
///
/// Statements are atomic: a multi-row update that fails validation part way
/// through leaves the table untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Table {
    pub(crate) name: String,
    pub(crate) columns: Vec<ColumnDef>,
    pub(crate) rows: Vec<StoredRow>,
    next_rowid: i64,
    next_key: i64,
}

impl Table {
    pub(crate) fn new(name: &str, columns: &[ColumnDef]) -> EngineResult<Self> {
        let mut pk_count = 0;
        for (i, def) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == def.name) {
                return Err(EngineError::duplicate_column(name, &def.name));
            }
            if def.auto_increment && !def.primary_key {
                return Err(EngineError::constraint(format!(
                    "column '{}' on table {name}: auto increment requires a primary key",
                    def.name
                )));
            }
            if def.primary_key {
                pk_count += 1;
            }
        }
        if pk_count > 1 {
            return Err(EngineError::constraint(format!(
                "table {name} declares {pk_count} primary key columns"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            columns: columns.to_vec(),
            rows: Vec::new(),
            next_rowid: 1,
            next_key: 1,
        })
    }

    pub(crate) fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub(crate) fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub(crate) fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub(crate) fn row_values(&self) -> impl Iterator<Item = &ColumnMap> {
        self.rows.iter().map(|r| &r.values)
    }

    /// Adds a column to the live table.
    ///
    /// Existing rows get the default when one is declared; otherwise the
    /// column reads as null. A NOT NULL column without a default cannot be
    /// added to a non-empty table.
    pub(crate) fn add_column(&mut self, def: ColumnDef) -> EngineResult<()> {
        if self.has_column(&def.name) {
            return Err(EngineError::duplicate_column(&self.name, &def.name));
        }
        if def.primary_key && self.primary_key().is_some() {
            return Err(EngineError::constraint(format!(
                "table {} already has a primary key",
                self.name
            )));
        }
        if def.not_null && def.default.is_none() && !self.rows.is_empty() {
            return Err(EngineError::constraint(format!(
                "cannot add NOT NULL column '{}' without a default to non-empty table {}",
                def.name, self.name
            )));
        }
        if let Some(default) = &def.default {
            for row in &mut self.rows {
                row.values.put(def.name.clone(), default.clone());
            }
        }
        self.columns.push(def);
        Ok(())
    }

    /// Inserts one row, returning the assigned key.
    ///
    /// The key is the auto-increment value when the table has an auto
    /// primary key, the supplied primary key when it coerces to an integer,
    /// and the internal rowid otherwise.
    pub(crate) fn insert(&mut self, payload: &ColumnMap) -> EngineResult<i64> {
        for column in payload.columns() {
            if !self.has_column(column) {
                return Err(EngineError::column_not_found(&self.name, column));
            }
        }

        let mut full = ColumnMap::new();
        for def in &self.columns {
            let value = match payload.get(&def.name) {
                Some(v) => v.clone(),
                None => def.default.clone().unwrap_or(Value::Null),
            };
            full.put(def.name.clone(), value);
        }

        let rowid = self.next_rowid;
        let mut assigned = rowid;

        if let Some(pk) = self.primary_key().cloned() {
            let supplied = full.get(&pk.name).cloned().unwrap_or(Value::Null);
            if pk.auto_increment {
                if supplied.is_null() {
                    assigned = self.next_key;
                    self.next_key += 1;
                    full.put(pk.name.clone(), assigned);
                } else {
                    let key = supplied.coerce_i64().ok_or_else(|| {
                        EngineError::constraint(format!(
                            "auto increment key on {} must be an integer, got {}",
                            self.name,
                            supplied.storage_class()
                        ))
                    })?;
                    // Explicit keys advance the counter so later assignments
                    // never collide or reuse a value.
                    self.next_key = self.next_key.max(key + 1);
                    full.put(pk.name.clone(), key);
                    assigned = key;
                }
            } else {
                if supplied.is_null() {
                    return Err(EngineError::constraint(format!(
                        "primary key '{}' on table {} requires a value",
                        pk.name, self.name
                    )));
                }
                if let Some(key) = supplied.coerce_i64() {
                    assigned = key;
                }
            }
        }

        for def in &self.columns {
            let value = full.get(&def.name).unwrap_or(&Value::Null);
            if def.not_null && value.is_null() {
                return Err(EngineError::constraint(format!(
                    "NOT NULL constraint failed: {}.{}",
                    self.name, def.name
                )));
            }
            if (def.unique || def.primary_key)
                && !value.is_null()
                && unique_conflict(&self.rows, &def.name, value, None)
            {
                return Err(EngineError::constraint(format!(
                    "UNIQUE constraint failed: {}.{}",
                    self.name, def.name
                )));
            }
        }

        self.next_rowid += 1;
        self.rows.push(StoredRow {
            rowid,
            values: full,
        });
        Ok(assigned)
    }

    /// Applies `changes` to every row matching the predicate.
    pub(crate) fn update(
        &mut self,
        predicate: &Predicate,
        args: &[Value],
        changes: &ColumnMap,
    ) -> EngineResult<usize> {
        for column in changes.columns() {
            if !self.has_column(column) {
                return Err(EngineError::column_not_found(&self.name, column));
            }
        }

        let mut working = self.rows.clone();
        let mut matched = 0;
        for index in 0..working.len() {
            if !predicate.matches(&working[index].values, args)? {
                continue;
            }
            let mut merged = working[index].values.clone();
            merged.merge(changes);

            for def in &self.columns {
                let value = merged.get(&def.name).unwrap_or(&Value::Null);
                if def.not_null && value.is_null() {
                    return Err(EngineError::constraint(format!(
                        "NOT NULL constraint failed: {}.{}",
                        self.name, def.name
                    )));
                }
                if (def.unique || def.primary_key)
                    && !value.is_null()
                    && unique_conflict(&working, &def.name, value, Some(working[index].rowid))
                {
                    return Err(EngineError::constraint(format!(
                        "UNIQUE constraint failed: {}.{}",
                        self.name, def.name
                    )));
                }
            }

            working[index].values = merged;
            matched += 1;
        }

        self.rows = working;
        Ok(matched)
    }

    /// Deletes every row matching the predicate, returning the count.
    pub(crate) fn delete(&mut self, predicate: &Predicate, args: &[Value]) -> EngineResult<usize> {
        let mut keep = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            keep.push(!predicate.matches(&row.values, args)?);
        }
        let before = self.rows.len();
        let mut keep_iter = keep.into_iter();
        self.rows.retain(|_| keep_iter.next().unwrap_or(true));
        Ok(before - self.rows.len())
    }
}

fn unique_conflict(
    rows: &[StoredRow],
    column: &str,
    value: &Value,
    exclude_rowid: Option<i64>,
) -> bool {
    rows.iter().any(|row| {
        Some(row.rowid) != exclude_rowid
            && row
                .values
                .get(column)
                .map_or(false, |stored| stored.loose_eq(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id").auto_increment(),
            ColumnDef::new("name").not_null(),
            ColumnDef::new("age"),
        ]
    }

    fn pred(clause: &str) -> Predicate {
        Predicate::parse(Some(clause)).unwrap()
    }

    #[test]
    fn rejects_duplicate_columns() {
        let columns = vec![ColumnDef::new("a"), ColumnDef::new("a")];
        assert!(matches!(
            Table::new("t", &columns),
            Err(EngineError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn rejects_multiple_primary_keys() {
        let columns = vec![
            ColumnDef::new("a").primary_key(),
            ColumnDef::new("b").primary_key(),
        ];
        assert!(Table::new("t", &columns).is_err());
    }

    #[test]
    fn rejects_auto_increment_without_primary_key() {
        let mut def = ColumnDef::new("n");
        def.auto_increment = true;
        assert!(Table::new("t", &[def]).is_err());
    }

    #[test]
    fn insert_assigns_monotonic_keys() {
        let mut table = Table::new("users", &user_columns()).unwrap();
        let a = table
            .insert(&ColumnMap::new().with("name", "Ann"))
            .unwrap();
        let b = table
            .insert(&ColumnMap::new().with("name", "Bob"))
            .unwrap();
        assert_eq!((a, b), (1, 2));

        // Deleting does not recycle keys.
        table.delete(&pred("id = 2"), &[]).unwrap();
        let c = table
            .insert(&ColumnMap::new().with("name", "Cay"))
            .unwrap();
        assert_eq!(c, 3);
    }

    #[test]
    fn explicit_auto_key_advances_counter() {
        let mut table = Table::new("users", &user_columns()).unwrap();
        let k = table
            .insert(&ColumnMap::new().with("id", 10).with("name", "Ann"))
            .unwrap();
        assert_eq!(k, 10);
        let next = table
            .insert(&ColumnMap::new().with("name", "Bob"))
            .unwrap();
        assert_eq!(next, 11);
    }

    #[test]
    fn insert_fills_defaults_and_nulls() {
        let columns = vec![
            ColumnDef::new("id").auto_increment(),
            ColumnDef::new("status").default_value("new"),
            ColumnDef::new("note"),
        ];
        let mut table = Table::new("jobs", &columns).unwrap();
        table.insert(&ColumnMap::new()).unwrap();

        let row = table.row_values().next().unwrap();
        assert_eq!(row.get_text("status"), Some("new"));
        assert!(row.get("note").unwrap().is_null());
    }

    #[test]
    fn not_null_and_unique_enforced() {
        let columns = vec![
            ColumnDef::new("id").auto_increment(),
            ColumnDef::new("email").not_null().unique(),
        ];
        let mut table = Table::new("accounts", &columns).unwrap();
        table
            .insert(&ColumnMap::new().with("email", "a@x"))
            .unwrap();

        assert!(table.insert(&ColumnMap::new()).is_err());
        assert!(table
            .insert(&ColumnMap::new().with("email", "a@x"))
            .is_err());
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn unknown_payload_column_rejected() {
        let mut table = Table::new("users", &user_columns()).unwrap();
        let result = table.insert(&ColumnMap::new().with("name", "A").with("ghost", 1));
        assert!(matches!(result, Err(EngineError::ColumnNotFound { .. })));
    }

    #[test]
    fn update_matches_and_applies() {
        let mut table = Table::new("users", &user_columns()).unwrap();
        table
            .insert(&ColumnMap::new().with("name", "Ann").with("age", 30))
            .unwrap();
        table
            .insert(&ColumnMap::new().with("name", "Bob").with("age", 40))
            .unwrap();

        let changed = table
            .update(
                &pred("age > ?"),
                &[35.into()],
                &ColumnMap::new().with("age", 41),
            )
            .unwrap();
        assert_eq!(changed, 1);
        let ages: Vec<_> = table.row_values().map(|r| r.get_i64("age")).collect();
        assert_eq!(ages, vec![Some(30), Some(41)]);
    }

    #[test]
    fn update_is_statement_atomic() {
        let columns = vec![
            ColumnDef::new("id").auto_increment(),
            ColumnDef::new("slot").unique(),
            ColumnDef::new("kind"),
        ];
        let mut table = Table::new("bookings", &columns).unwrap();
        table
            .insert(&ColumnMap::new().with("slot", 1).with("kind", "a"))
            .unwrap();
        table
            .insert(&ColumnMap::new().with("slot", 2).with("kind", "a"))
            .unwrap();

        // Both rows match; moving every 'a' to slot 9 collides on the second.
        let before = table.rows.clone();
        let result = table.update(
            &pred("kind = 'a'"),
            &[],
            &ColumnMap::new().with("slot", 9),
        );
        assert!(result.is_err());
        assert_eq!(table.rows, before);
    }

    #[test]
    fn update_unique_check_excludes_self() {
        let columns = vec![
            ColumnDef::new("id").auto_increment(),
            ColumnDef::new("email").unique(),
        ];
        let mut table = Table::new("accounts", &columns).unwrap();
        table
            .insert(&ColumnMap::new().with("email", "a@x"))
            .unwrap();

        // Re-writing the same value onto the same row is not a conflict.
        let changed = table
            .update(
                &pred("id = 1"),
                &[],
                &ColumnMap::new().with("email", "a@x"),
            )
            .unwrap();
        assert_eq!(changed, 1);
    }

    #[test]
    fn delete_by_predicate() {
        let mut table = Table::new("users", &user_columns()).unwrap();
        for (name, age) in [("Ann", 30), ("Bob", 40), ("Cay", 50)] {
            table
                .insert(&ColumnMap::new().with("name", name).with("age", age))
                .unwrap();
        }
        let removed = table.delete(&pred("age >= ?"), &[40.into()]).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn add_column_backfills_default() {
        let mut table = Table::new("users", &user_columns()).unwrap();
        table
            .insert(&ColumnMap::new().with("name", "Ann"))
            .unwrap();

        table
            .add_column(ColumnDef::new("active").default_value(1))
            .unwrap();
        assert_eq!(table.row_values().next().unwrap().get_i64("active"), Some(1));

        // Without a default the old row reads as null.
        table.add_column(ColumnDef::new("bio")).unwrap();
        assert!(table
            .row_values()
            .next()
            .unwrap()
            .get("bio")
            .is_none());

        assert!(table.add_column(ColumnDef::new("name")).is_err());
        assert!(table
            .add_column(ColumnDef::new("x").not_null())
            .is_err());
    }
}
