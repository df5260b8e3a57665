//! Typed record controllers.

use std::collections::HashSet;
use std::sync::Arc;

use rowlite_engine::{ColumnMap, Rows, Value};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::executor::{BatchUpdate, RecordExecutor};
use crate::mapper::RecordMapper;
use crate::schema::SchemaDescriptor;

/// Store operations a [`TransactionPolicy`] can mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Single-record insert.
    Insert,
    /// Single-record update.
    Update,
    /// Delete, by key or predicate.
    Delete,
    /// Insert-or-update upsert.
    InsertOrUpdate,
    /// Multi-record insert.
    BatchInsert,
    /// Multi-record update.
    BatchUpdate,
}

/// Which operations run inside a transaction scope.
///
/// Marked operations on a direct backend open a scope before the first
/// write and commit after the last, so a mid-operation failure rolls the
/// whole operation back. Gateway backends ignore the policy; their batches
/// are atomic on the host side. The default marks the batch family.
#[derive(Debug, Clone)]
pub struct TransactionPolicy {
    ops: HashSet<Operation>,
}

impl TransactionPolicy {
    /// No operation opens a scope.
    #[must_use]
    pub fn none() -> Self {
        Self {
            ops: HashSet::new(),
        }
    }

    /// Batch inserts and batch updates open scopes.
    #[must_use]
    pub fn batches() -> Self {
        Self::none()
            .with(Operation::BatchInsert)
            .with(Operation::BatchUpdate)
    }

    /// Every markable operation opens a scope.
    #[must_use]
    pub fn all() -> Self {
        Self::batches()
            .with(Operation::Insert)
            .with(Operation::Update)
            .with(Operation::Delete)
            .with(Operation::InsertOrUpdate)
    }

    /// Marks one more operation.
    #[must_use]
    pub fn with(mut self, op: Operation) -> Self {
        self.ops.insert(op);
        self
    }

    /// Whether the policy marks an operation.
    #[must_use]
    pub fn covers(&self, op: Operation) -> bool {
        self.ops.contains(&op)
    }
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self::batches()
    }
}

/// Typed operations for one record type over one executor.
///
/// A controller pairs a [`RecordMapper`] with a [`RecordExecutor`]: records
/// go in through the mapper, rows come back out through it, and the
/// executor decides which backend actually stores them. Controllers are
/// usually created by the registry, one per registered mapper.
///
/// Write payloads never change a stored primary key; key columns are
/// stripped before updates reach the backend.
pub struct RecordController<R> {
    mapper: Box<dyn RecordMapper<Record = R>>,
    descriptor: Arc<SchemaDescriptor>,
    executor: Box<dyn RecordExecutor>,
    policy: TransactionPolicy,
    label: String,
}

impl<R: Send + 'static> RecordController<R> {
    /// Creates a controller from its parts.
    pub fn new(
        mapper: Box<dyn RecordMapper<Record = R>>,
        descriptor: Arc<SchemaDescriptor>,
        executor: Box<dyn RecordExecutor>,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            mapper,
            descriptor,
            executor,
            policy,
            label: short_type_name::<R>().to_string(),
        }
    }

    /// The table this controller writes to.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.descriptor.table()
    }

    /// The controller's schema descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    fn label(&self) -> Option<&str> {
        Some(&self.label)
    }

    fn key_clause(&self) -> StoreResult<String> {
        self.descriptor.key_clause().ok_or_else(|| {
            StoreError::misuse(format!(
                "table {} has no primary key to match on",
                self.table_name()
            ))
        })
    }

    /// Non-null key value carried by a row payload, if any.
    fn row_key(&self, row: &ColumnMap) -> Option<Value> {
        let key = self.descriptor.primary_key()?;
        row.get(key.name()).filter(|v| !v.is_null()).cloned()
    }

    /// Runs `f`, inside a transaction scope when the policy marks `op` and
    /// the backend is direct. Joins a scope the calling thread already
    /// holds instead of opening a second one.
    fn dispatch<T>(&self, op: Operation, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        if self.policy.covers(op) {
            if let Some(engine) = self.executor.engine() {
                if !engine.owns_scope() {
                    debug!("scoping {op:?} on {}", self.table_name());
                    let scope = engine.begin().map_err(StoreError::from)?;
                    let value = f()?;
                    scope.commit().map_err(StoreError::from)?;
                    return Ok(value);
                }
            }
        }
        f()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Whether a record with the given key exists.
    pub fn has_key(&self, key: &Value) -> StoreResult<bool> {
        let clause = self.key_clause()?;
        self.executor
            .exists(Some(&clause), &[key.clone()], self.label())
    }

    /// Whether any record matches the clause.
    pub fn has_where(&self, clause: &str, args: &[Value]) -> StoreResult<bool> {
        self.executor.exists(Some(clause), args, self.label())
    }

    /// Number of records matching the clause; `None` counts everything.
    pub fn count(&self, clause: Option<&str>, args: &[Value]) -> StoreResult<i64> {
        Ok(self
            .executor
            .scalar_i64("COUNT(1)", clause, args, self.label())?
            .unwrap_or(0))
    }

    /// The record with the given key, if present.
    pub fn find(&self, key: &Value) -> StoreResult<Option<R>> {
        let clause = self.key_clause()?;
        let row = self
            .executor
            .query_one(Some(&clause), &[key.clone()], self.label())?;
        row.map(|row| self.mapper.from_row(&row)).transpose()
    }

    /// The first record matching the clause, if any.
    pub fn find_first(&self, clause: &str, args: &[Value]) -> StoreResult<Option<R>> {
        let row = self.executor.query_one(Some(clause), args, self.label())?;
        row.map(|row| self.mapper.from_row(&row)).transpose()
    }

    /// Every record matching the clause.
    pub fn find_where(&self, clause: &str, args: &[Value]) -> StoreResult<Vec<R>> {
        let rows = self.executor.query_many(Some(clause), args, self.label())?;
        rows.iter().map(|row| self.mapper.from_row(row)).collect()
    }

    /// Every record in the table.
    pub fn find_all(&self) -> StoreResult<Vec<R>> {
        let rows = self.executor.query_many(None, &[], self.label())?;
        rows.iter().map(|row| self.mapper.from_row(row)).collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Inserts a record, returning the assigned key.
    pub fn insert(&self, record: &R) -> StoreResult<i64> {
        let row = self.mapper.to_row(record);
        self.dispatch(Operation::Insert, || {
            self.executor.insert(&row, self.label())
        })
    }

    /// Updates the stored record with the same key.
    ///
    /// Returns `false` when the record carries no key or nothing matches.
    pub fn update(&self, record: &R) -> StoreResult<bool> {
        let clause = self.key_clause()?;
        let row = self.mapper.to_row(record);
        let Some(key) = self.row_key(&row) else {
            return Ok(false);
        };
        self.dispatch(Operation::Update, || {
            self.executor
                .update(&row, Some(&clause), &[key.clone()], self.label())
        })
    }

    /// Updates the rows matching an explicit clause with a record's values.
    pub fn update_where(&self, record: &R, clause: &str, args: &[Value]) -> StoreResult<bool> {
        let row = self.mapper.to_row(record);
        self.dispatch(Operation::Update, || {
            self.executor.update(&row, Some(clause), args, self.label())
        })
    }

    /// Updates matching rows with an explicit change set.
    pub fn update_values(
        &self,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<bool> {
        self.dispatch(Operation::Update, || {
            self.executor.update(changes, clause, args, self.label())
        })
    }

    /// Applies one change set to every record whose key is in `keys`.
    pub fn update_keys(&self, keys: &[Value], changes: &ColumnMap) -> StoreResult<bool> {
        self.dispatch(Operation::Update, || {
            self.executor.update_keys(keys, changes, self.label())
        })
    }

    /// Inserts the record, or updates it when its key already exists.
    ///
    /// Records without a key value always insert.
    pub fn insert_or_update(&self, record: &R) -> StoreResult<bool> {
        let clause = self.key_clause()?;
        let row = self.mapper.to_row(record);
        self.dispatch(Operation::InsertOrUpdate, || {
            let existing = match self.row_key(&row) {
                Some(key) => {
                    let args = [key];
                    if self.executor.exists(Some(&clause), &args, self.label())? {
                        Some(args)
                    } else {
                        None
                    }
                }
                None => None,
            };
            match existing {
                Some(args) => self
                    .executor
                    .update(&row, Some(&clause), &args, self.label()),
                None => {
                    self.executor.insert(&row, self.label())?;
                    Ok(true)
                }
            }
        })
    }

    /// Inserts the record, or updates the rows an explicit predicate
    /// matches when any exist.
    pub fn insert_or_update_where(
        &self,
        record: &R,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool> {
        let row = self.mapper.to_row(record);
        self.dispatch(Operation::InsertOrUpdate, || {
            if self.executor.exists(Some(clause), args, self.label())? {
                self.executor.update(&row, Some(clause), args, self.label())
            } else {
                self.executor.insert(&row, self.label())?;
                Ok(true)
            }
        })
    }

    /// Deletes the record with the given key.
    pub fn delete_key(&self, key: &Value) -> StoreResult<bool> {
        let clause = self.key_clause()?;
        self.dispatch(Operation::Delete, || {
            self.executor
                .delete(Some(&clause), &[key.clone()], self.label())
        })
    }

    /// Deletes every record whose key is in `keys`.
    pub fn delete_keys(&self, keys: &[Value]) -> StoreResult<bool> {
        let clause = crate::executor::keys_clause(&self.descriptor, keys.len())?;
        self.dispatch(Operation::Delete, || {
            self.executor.delete(Some(&clause), keys, self.label())
        })
    }

    /// Deletes the stored record with this record's key.
    pub fn delete_record(&self, record: &R) -> StoreResult<bool> {
        let row = self.mapper.to_row(record);
        match self.row_key(&row) {
            Some(key) => self.delete_key(&key),
            None => Ok(false),
        }
    }

    /// Deletes matching records; `None` clears the table.
    pub fn delete_where(&self, clause: Option<&str>, args: &[Value]) -> StoreResult<bool> {
        self.dispatch(Operation::Delete, || {
            self.executor.delete(clause, args, self.label())
        })
    }

    /// Inserts every record.
    pub fn batch_insert(&self, records: &[R]) -> StoreResult<()> {
        if records.is_empty() {
            return Err(StoreError::misuse("batch insert of zero records"));
        }
        let rows: Vec<ColumnMap> = records.iter().map(|r| self.mapper.to_row(r)).collect();
        self.dispatch(Operation::BatchInsert, || {
            self.executor.batch_insert(&rows, self.label())
        })
    }

    /// Updates every record, matched by its key.
    pub fn batch_update(&self, records: &[R]) -> StoreResult<()> {
        self.batch_update_with(records, &BatchUpdate::ByKey)
    }

    /// Updates every record, matched by the named column.
    pub fn batch_update_by(&self, records: &[R], column: &str) -> StoreResult<()> {
        self.batch_update_with(records, &BatchUpdate::ByColumn(column.to_string()))
    }

    /// Updates every record under one shared clause.
    pub fn batch_update_where(
        &self,
        records: &[R],
        clause: &str,
        args: &[Value],
    ) -> StoreResult<()> {
        self.batch_update_with(
            records,
            &BatchUpdate::ByClause {
                clause: clause.to_string(),
                args: args.to_vec(),
            },
        )
    }

    fn batch_update_with(&self, records: &[R], mode: &BatchUpdate) -> StoreResult<()> {
        let rows: Vec<ColumnMap> = records.iter().map(|r| self.mapper.to_row(r)).collect();
        self.dispatch(Operation::BatchUpdate, || {
            self.executor.batch_update(&rows, mode, self.label())
        })
    }

    // ========================================================================
    // Projections and raw statements
    // ========================================================================

    /// First value of a projection, coerced to an integer.
    pub fn scalar_i64(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Option<i64>> {
        self.executor.scalar_i64(projection, clause, args, self.label())
    }

    /// First value of a projection, coerced to a string.
    pub fn scalar_string(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Option<String>> {
        self.executor
            .scalar_string(projection, clause, args, self.label())
    }

    /// Every value of a projection, coerced to integers.
    pub fn column_i64s(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Vec<i64>> {
        self.executor
            .column_i64s(projection, clause, args, self.label())
    }

    /// Every value of a projection, coerced to strings.
    pub fn column_strings(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Vec<String>> {
        self.executor
            .column_strings(projection, clause, args, self.label())
    }

    /// Multi-column projection query.
    pub fn rows(
        &self,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Rows> {
        self.executor
            .row_projection(projections, clause, args, self.label())
    }

    /// Raw select statement against the backend.
    pub fn raw_query(&self, statement: &str, args: &[Value]) -> StoreResult<Rows> {
        self.executor.raw_query(statement, args, self.label())
    }

    // ========================================================================
    // Schema lifecycle
    // ========================================================================

    /// Brings the live table up to the descriptor, additively.
    ///
    /// Creates the table when missing; otherwise adds declared columns the
    /// live table lacks. Never drops or alters existing columns.
    pub fn reconcile(&self) -> StoreResult<()> {
        if !self.executor.table_exists()? {
            self.executor.create_table()?;
            return Ok(());
        }
        let live = self.executor.live_columns()?;
        for column in self.descriptor.columns() {
            if !live.iter().any(|name| name == column.name()) {
                debug!("adding {} to {}", column.name(), self.table_name());
                self.executor.add_column(column)?;
            }
        }
        Ok(())
    }

    /// Creates the table from its descriptor. No-op when present.
    pub fn create_table(&self) -> StoreResult<()> {
        self.executor.create_table()
    }

    /// Drops the table. No-op when absent.
    pub fn drop_table(&self) -> StoreResult<()> {
        self.executor.drop_table()
    }
}

impl<R> std::fmt::Debug for RecordController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordController")
            .field("table", &self.descriptor.table())
            .field("record", &self.label)
            .finish_non_exhaustive()
    }
}

/// Last path segment of a type name, for log labels.
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
