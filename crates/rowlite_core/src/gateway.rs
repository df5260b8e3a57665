//! The gateway seam for stores that live behind a broker.
//!
//! A [`StorageGateway`] is a row-level transport: it moves rows and
//! predicates to wherever the data actually lives, typically another
//! process that owns the store file. The gateway host owns the schema;
//! clients on this side of the seam neither create tables nor run raw
//! statements.

use rowlite_engine::{ColumnMap, Engine, Rows, Value};

use crate::error::{StoreError, StoreResult};

/// One write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Insert one row.
    Insert {
        /// Target table.
        table: String,
        /// Row payload.
        row: ColumnMap,
    },
    /// Update matching rows.
    Update {
        /// Target table.
        table: String,
        /// Columns to change.
        changes: ColumnMap,
        /// Match predicate; `None` matches every row.
        clause: Option<String>,
        /// Bound predicate arguments.
        args: Vec<Value>,
    },
    /// Delete matching rows.
    Delete {
        /// Target table.
        table: String,
        /// Match predicate; `None` matches every row.
        clause: Option<String>,
        /// Bound predicate arguments.
        args: Vec<Value>,
    },
}

/// Row transport to a store owned elsewhere.
///
/// Implementations answer [`ping`](Self::ping) cheaply; executors probe it
/// before every operation and fail closed when the host is gone.
/// [`apply_batch`](Self::apply_batch) is all-or-nothing: either every op in
/// the batch takes effect or none does.
pub trait StorageGateway: Send + Sync {
    /// Whether the gateway host is reachable.
    fn ping(&self) -> bool;

    /// Inserts one row, returning the assigned key.
    fn insert(&self, table: &str, row: &ColumnMap) -> StoreResult<i64>;

    /// Updates matching rows, returning the count.
    fn update(
        &self,
        table: &str,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<usize>;

    /// Deletes matching rows, returning the count.
    fn delete(&self, table: &str, clause: Option<&str>, args: &[Value]) -> StoreResult<usize>;

    /// Selects rows under a clause.
    fn query(
        &self,
        table: &str,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Rows>;

    /// Applies a batch of writes atomically.
    fn apply_batch(&self, ops: &[BatchOp]) -> StoreResult<()>;
}

/// In-process gateway host over an [`Engine`].
///
/// Useful in tests and for processes that host the store for others; the
/// batch contract is kept by running each batch in one engine transaction.
#[derive(Debug, Clone)]
pub struct LocalGateway {
    engine: Engine,
}

impl LocalGateway {
    /// Wraps an engine as a gateway host.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// The hosted engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl StorageGateway for LocalGateway {
    fn ping(&self) -> bool {
        true
    }

    fn insert(&self, table: &str, row: &ColumnMap) -> StoreResult<i64> {
        Ok(self.engine.insert(table, row)?)
    }

    fn update(
        &self,
        table: &str,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<usize> {
        Ok(self.engine.update(table, changes, clause, args)?)
    }

    fn delete(&self, table: &str, clause: Option<&str>, args: &[Value]) -> StoreResult<usize> {
        Ok(self.engine.delete(table, clause, args)?)
    }

    fn query(
        &self,
        table: &str,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Rows> {
        Ok(self.engine.select(table, projections, clause, args)?)
    }

    fn apply_batch(&self, ops: &[BatchOp]) -> StoreResult<()> {
        self.engine
            .transaction(|engine| {
                for op in ops {
                    match op {
                        BatchOp::Insert { table, row } => {
                            engine.insert(table, row)?;
                        }
                        BatchOp::Update {
                            table,
                            changes,
                            clause,
                            args,
                        } => {
                            engine.update(table, changes, clause.as_deref(), args)?;
                        }
                        BatchOp::Delete {
                            table,
                            clause,
                            args,
                        } => {
                            engine.delete(table, clause.as_deref(), args)?;
                        }
                    }
                }
                Ok(())
            })
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowlite_engine::ColumnDef;

    fn notes_engine() -> Engine {
        let engine = Engine::in_memory();
        engine
            .create_table(
                "notes",
                &[
                    ColumnDef::new("id").auto_increment(),
                    ColumnDef::new("body").not_null(),
                ],
            )
            .unwrap();
        engine
    }

    #[test]
    fn local_gateway_round_trips_rows() {
        let gateway = LocalGateway::new(notes_engine());
        let key = gateway
            .insert("notes", &ColumnMap::new().with("body", "first"))
            .unwrap();
        assert_eq!(key, 1);

        let rows = gateway
            .query("notes", &["body"], Some("id = ?"), &[Value::Integer(key)])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.scalar_string("body").as_deref(), Some("first"));
    }

    #[test]
    fn batch_failure_rolls_back_everything() {
        let gateway = LocalGateway::new(notes_engine());
        let ops = vec![
            BatchOp::Insert {
                table: "notes".into(),
                row: ColumnMap::new().with("body", "kept?"),
            },
            BatchOp::Insert {
                table: "notes".into(),
                // Null body violates NOT NULL.
                row: ColumnMap::new().with("body", Value::Null),
            },
        ];
        assert!(gateway.apply_batch(&ops).is_err());
        let rows = gateway.query("notes", &["*"], None, &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn batch_applies_mixed_writes() {
        let gateway = LocalGateway::new(notes_engine());
        gateway
            .insert("notes", &ColumnMap::new().with("body", "old"))
            .unwrap();
        let ops = vec![
            BatchOp::Update {
                table: "notes".into(),
                changes: ColumnMap::new().with("body", "new"),
                clause: Some("id = ?".into()),
                args: vec![Value::Integer(1)],
            },
            BatchOp::Insert {
                table: "notes".into(),
                row: ColumnMap::new().with("body", "second"),
            },
        ];
        gateway.apply_batch(&ops).unwrap();
        let rows = gateway.query("notes", &["body"], None, &[]).unwrap();
        assert_eq!(rows.column_strings("body"), vec!["new", "second"]);
    }
}
