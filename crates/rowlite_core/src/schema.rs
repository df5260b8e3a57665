//! Logical schema descriptions for mapped record types.
//!
//! A [`SchemaDescriptor`] is derived from a mapper's declared columns and
//! drives table creation, additive reconciliation, and the canonical
//! primary-key predicate. The rendered DDL strings are diagnostic output;
//! the engine consumes the structural [`ColumnDef`] form.

use rowlite_engine::{ColumnDef, Value};

use crate::error::{StoreError, StoreResult};

/// Logical type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
    /// Raw bytes.
    Blob,
}

impl LogicalType {
    fn render(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Blob => "BLOB",
        }
    }
}

/// Constraint attached to a mapped column.
///
/// A column carries at most one constraint. Foreign-key and check
/// constraints are rendered into the diagnostic DDL but are not enforced
/// by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// No constraint.
    None,
    /// Reject null values.
    NotNull,
    /// Reject duplicate non-null values.
    Unique,
    /// Single primary key.
    PrimaryKey,
    /// Integer primary key assigned by the store.
    PrimaryKeyAutoIncrement,
    /// Fill missing values with a default.
    Default(Value),
    /// Reference to another table, unenforced.
    ForeignKey(String),
    /// Arbitrary check expression, unenforced.
    Check(String),
}

/// A mapped column: name, logical type, optional size hint, constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    name: String,
    logical_type: LogicalType,
    size: Option<u32>,
    constraint: Constraint,
}

impl ColumnSpec {
    /// Creates an unconstrained column.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            size: None,
            constraint: Constraint::None,
        }
    }

    /// Sets a size hint, rendered into the DDL but not enforced.
    #[must_use]
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.constraint = Constraint::NotNull;
        self
    }

    /// Marks the column UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.constraint = Constraint::Unique;
        self
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.constraint = Constraint::PrimaryKey;
        self
    }

    /// Marks the column as the store-assigned integer primary key.
    #[must_use]
    pub fn auto_primary_key(mut self) -> Self {
        self.constraint = Constraint::PrimaryKeyAutoIncrement;
        self
    }

    /// Sets a default value for missing inserts.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.constraint = Constraint::Default(value);
        self
    }

    /// Sets an unenforced foreign-key reference.
    #[must_use]
    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.constraint = Constraint::ForeignKey(target.into());
        self
    }

    /// Sets an unenforced check expression.
    #[must_use]
    pub fn check(mut self, expression: impl Into<String>) -> Self {
        self.constraint = Constraint::Check(expression.into());
        self
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical type.
    #[must_use]
    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }

    /// The column's constraint.
    #[must_use]
    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    fn is_primary_key(&self) -> bool {
        matches!(
            self.constraint,
            Constraint::PrimaryKey | Constraint::PrimaryKeyAutoIncrement
        )
    }

    fn render(&self) -> String {
        let mut out = format!("{} {}", self.name, self.logical_type.render());
        if let Some(size) = self.size {
            out.push_str(&format!("({size})"));
        }
        match &self.constraint {
            Constraint::None => {}
            Constraint::NotNull => out.push_str(" NOT NULL"),
            Constraint::Unique => out.push_str(" UNIQUE"),
            Constraint::PrimaryKey => out.push_str(" PRIMARY KEY"),
            Constraint::PrimaryKeyAutoIncrement => {
                out.push_str(" PRIMARY KEY AUTOINCREMENT");
            }
            Constraint::Default(value) => out.push_str(&format!(" DEFAULT {value}")),
            Constraint::ForeignKey(target) => {
                out.push_str(&format!(" REFERENCES {target}"));
            }
            Constraint::Check(expression) => {
                out.push_str(&format!(" CHECK ({expression})"));
            }
        }
        out
    }

    /// Converts to the engine's structural column form.
    ///
    /// Foreign-key and check constraints become plain columns; the engine
    /// does not enforce them.
    #[must_use]
    pub fn to_column_def(&self) -> ColumnDef {
        let def = ColumnDef::new(&self.name);
        match &self.constraint {
            Constraint::None | Constraint::ForeignKey(_) | Constraint::Check(_) => def,
            Constraint::NotNull => def.not_null(),
            Constraint::Unique => def.unique(),
            Constraint::PrimaryKey => def.primary_key(),
            Constraint::PrimaryKeyAutoIncrement => def.auto_increment(),
            Constraint::Default(value) => def.default_value(value.clone()),
        }
    }
}

/// Validated schema for one mapped table.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    table: String,
    columns: Vec<ColumnSpec>,
}

impl SchemaDescriptor {
    /// Validates column declarations and builds a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Misuse`] when the table name or column list is
    /// empty, a column name repeats, or more than one column is declared as
    /// the primary key.
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> StoreResult<Self> {
        let table = table.into();
        if table.is_empty() {
            return Err(StoreError::misuse("table name must not be empty"));
        }
        if columns.is_empty() {
            return Err(StoreError::misuse(format!(
                "table {table} declares no columns"
            )));
        }
        let mut primary = None;
        for (index, column) in columns.iter().enumerate() {
            if columns[..index].iter().any(|c| c.name == column.name) {
                return Err(StoreError::misuse(format!(
                    "table {table} declares column {} twice",
                    column.name
                )));
            }
            if column.is_primary_key() {
                if primary.is_some() {
                    return Err(StoreError::misuse(format!(
                        "table {table} declares more than one primary key"
                    )));
                }
                primary = Some(index);
            }
        }
        Ok(Self { table, columns })
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// The primary-key column, if one is declared.
    #[must_use]
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.is_primary_key())
    }

    /// Whether the primary key is assigned by the store.
    #[must_use]
    pub fn auto_increments(&self) -> bool {
        self.primary_key().is_some_and(|c| {
            matches!(c.constraint, Constraint::PrimaryKeyAutoIncrement)
        })
    }

    /// Canonical key predicate, `<pk> = ?`.
    #[must_use]
    pub fn key_clause(&self) -> Option<String> {
        self.primary_key().map(|c| format!("{} = ?", c.name))
    }

    /// Structural column definitions for the engine.
    #[must_use]
    pub fn engine_columns(&self) -> Vec<ColumnDef> {
        self.columns.iter().map(ColumnSpec::to_column_def).collect()
    }

    /// Renders the create statement, for diagnostics.
    #[must_use]
    pub fn create_statement(&self) -> String {
        let rendered: Vec<String> = self.columns.iter().map(ColumnSpec::render).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            rendered.join(", ")
        )
    }

    /// Renders an add-column statement, for diagnostics.
    #[must_use]
    pub fn add_column_statement(&self, column: &ColumnSpec) -> String {
        format!("ALTER TABLE {} ADD COLUMN {}", self.table, column.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", LogicalType::Integer).auto_primary_key(),
            ColumnSpec::new("name", LogicalType::Text).not_null(),
            ColumnSpec::new("age", LogicalType::Integer),
        ]
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = SchemaDescriptor::new(
            "users",
            vec![
                ColumnSpec::new("name", LogicalType::Text),
                ColumnSpec::new("name", LogicalType::Integer),
            ],
        )
        .unwrap_err();
        assert!(err.is_misuse());
    }

    #[test]
    fn rejects_multiple_primary_keys() {
        let err = SchemaDescriptor::new(
            "users",
            vec![
                ColumnSpec::new("id", LogicalType::Integer).primary_key(),
                ColumnSpec::new("uid", LogicalType::Integer).primary_key(),
            ],
        )
        .unwrap_err();
        assert!(err.is_misuse());
    }

    #[test]
    fn rejects_empty_declarations() {
        assert!(SchemaDescriptor::new("users", Vec::new()).is_err());
        assert!(SchemaDescriptor::new("", user_columns()).is_err());
    }

    #[test]
    fn key_clause_names_the_primary_key() {
        let descriptor = SchemaDescriptor::new("users", user_columns()).unwrap();
        assert_eq!(descriptor.key_clause().as_deref(), Some("id = ?"));
        assert!(descriptor.auto_increments());
    }

    #[test]
    fn no_primary_key_means_no_clause() {
        let descriptor = SchemaDescriptor::new(
            "notes",
            vec![ColumnSpec::new("body", LogicalType::Text)],
        )
        .unwrap();
        assert!(descriptor.key_clause().is_none());
        assert!(!descriptor.auto_increments());
    }

    #[test]
    fn renders_create_statement() {
        let descriptor = SchemaDescriptor::new("users", user_columns()).unwrap();
        assert_eq!(
            descriptor.create_statement(),
            "CREATE TABLE IF NOT EXISTS users \
             (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, age INTEGER)"
        );
    }

    #[test]
    fn renders_constraint_variants() {
        let sized = ColumnSpec::new("code", LogicalType::Text)
            .size(8)
            .unique();
        assert_eq!(sized.render(), "code TEXT(8) UNIQUE");

        let defaulted =
            ColumnSpec::new("role", LogicalType::Text).default_value(Value::from("member"));
        assert_eq!(defaulted.render(), "role TEXT DEFAULT 'member'");

        let referencing =
            ColumnSpec::new("user_id", LogicalType::Integer).references("users(id)");
        assert_eq!(referencing.render(), "user_id INTEGER REFERENCES users(id)");

        let checked = ColumnSpec::new("age", LogicalType::Integer).check("age >= 0");
        assert_eq!(checked.render(), "age INTEGER CHECK (age >= 0)");
    }

    #[test]
    fn engine_columns_drop_unenforced_constraints() {
        let descriptor = SchemaDescriptor::new(
            "posts",
            vec![
                ColumnSpec::new("id", LogicalType::Integer).auto_primary_key(),
                ColumnSpec::new("user_id", LogicalType::Integer).references("users(id)"),
            ],
        )
        .unwrap();
        let defs = descriptor.engine_columns();
        assert_eq!(defs.len(), 2);
        assert!(defs[0].auto_increment);
        assert!(!defs[1].not_null && !defs[1].unique);
    }
}
