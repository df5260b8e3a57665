//! Record executors: the backend seam below controllers.
//!
//! An executor runs row-level operations for exactly one mapped table.
//! [`EngineExecutor`] talks to an in-process [`Engine`];
//! [`GatewayExecutor`] forwards rows through a
//! [`StorageGateway`](crate::StorageGateway) and probes its liveness before
//! every call. Controllers hold executors as trait objects and never know
//! which backend they run on.

mod direct;
mod gateway;

pub use direct::EngineExecutor;
pub use gateway::GatewayExecutor;

use rowlite_engine::{ColumnMap, Engine, Rows, Value};

use crate::error::{StoreError, StoreResult};
use crate::schema::{ColumnSpec, SchemaDescriptor};

/// How a batch update matches each row.
#[derive(Debug, Clone)]
pub enum BatchUpdate {
    /// Match each row by its primary-key value.
    ByKey,
    /// Match each row by the named column's value. The column is removed
    /// from the written payload.
    ByColumn(String),
    /// Apply one shared clause and argument list to every row.
    ByClause {
        /// Match predicate applied per row.
        clause: String,
        /// Bound predicate arguments, shared by every row.
        args: Vec<Value>,
    },
}

/// Row-level operations against one mapped table.
///
/// Write payloads never change a stored primary key: `update`,
/// `update_keys` and `batch_update` strip the key column before writing,
/// and `insert` strips an auto-increment key so the store assigns it.
/// The optional `label` on each operation is a caller-supplied tag that
/// only shows up in logs.
pub trait RecordExecutor: Send + Sync {
    /// Whether any row matches the clause.
    fn exists(&self, clause: Option<&str>, args: &[Value], label: Option<&str>)
        -> StoreResult<bool>;

    /// Inserts one row, returning the assigned key.
    ///
    /// An auto-increment key in the payload is ignored; the store always
    /// assigns its own.
    fn insert(&self, row: &ColumnMap, label: Option<&str>) -> StoreResult<i64>;

    /// Returns the first matching row, if any.
    fn query_one(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Option<ColumnMap>>;

    /// Returns every matching row.
    fn query_many(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Vec<ColumnMap>>;

    /// Updates matching rows. Returns whether anything matched.
    fn update(
        &self,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<bool>;

    /// Applies one change set to every row whose key is in `keys`.
    /// Returns whether anything matched.
    fn update_keys(
        &self,
        keys: &[Value],
        changes: &ColumnMap,
        label: Option<&str>,
    ) -> StoreResult<bool>;

    /// Deletes matching rows. Returns whether anything matched.
    fn delete(&self, clause: Option<&str>, args: &[Value], label: Option<&str>)
        -> StoreResult<bool>;

    /// Inserts every row.
    fn batch_insert(&self, rows: &[ColumnMap], label: Option<&str>) -> StoreResult<()>;

    /// Updates every row under the given match mode.
    fn batch_update(
        &self,
        rows: &[ColumnMap],
        mode: &BatchUpdate,
        label: Option<&str>,
    ) -> StoreResult<()>;

    /// Runs a projection query over the table.
    fn row_projection(
        &self,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Rows>;

    /// Runs a raw select statement.
    fn raw_query(&self, statement: &str, args: &[Value], label: Option<&str>)
        -> StoreResult<Rows>;

    /// Whether the table exists in the backend.
    fn table_exists(&self) -> StoreResult<bool>;

    /// Column names the backend currently stores for the table.
    fn live_columns(&self) -> StoreResult<Vec<String>>;

    /// Creates the table from its descriptor. No-op when present.
    fn create_table(&self) -> StoreResult<()>;

    /// Adds a declared column to the live table.
    fn add_column(&self, column: &ColumnSpec) -> StoreResult<()>;

    /// Drops the table. No-op when absent.
    fn drop_table(&self) -> StoreResult<()>;

    /// The underlying engine, when this executor runs in process.
    ///
    /// Controllers use it to bracket flagged operations in a transaction
    /// scope; gateway executors return `None` because their batches are
    /// atomic on the host side.
    fn engine(&self) -> Option<&Engine>;

    /// First value of a single-column projection, coerced to an integer.
    fn scalar_i64(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Option<i64>> {
        Ok(self
            .row_projection(&[projection], clause, args, label)?
            .scalar_i64(projection))
    }

    /// First value of a single-column projection, coerced to a string.
    fn scalar_string(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Option<String>> {
        Ok(self
            .row_projection(&[projection], clause, args, label)?
            .scalar_string(projection))
    }

    /// Every value of a single-column projection, coerced to integers.
    fn column_i64s(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Vec<i64>> {
        Ok(self
            .row_projection(&[projection], clause, args, label)?
            .column_i64s(projection))
    }

    /// Every value of a single-column projection, coerced to strings.
    fn column_strings(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .row_projection(&[projection], clause, args, label)?
            .column_strings(projection))
    }
}

/// One planned row write inside a batch update.
#[derive(Debug)]
pub(crate) struct UpdatePlan {
    pub(crate) changes: ColumnMap,
    pub(crate) clause: Option<String>,
    pub(crate) args: Vec<Value>,
}

/// Turns a batch-update request into per-row write plans.
///
/// All argument validation happens here, before the first write, so a
/// misuse error never leaves a batch half applied.
pub(crate) fn plan_batch_update(
    descriptor: &SchemaDescriptor,
    rows: &[ColumnMap],
    mode: &BatchUpdate,
) -> StoreResult<Vec<UpdatePlan>> {
    if rows.is_empty() {
        return Err(StoreError::misuse("batch update of zero rows"));
    }
    let key_column = descriptor.primary_key().map(|c| c.name().to_string());

    match mode {
        BatchUpdate::ByKey => {
            let key_column = key_column.ok_or_else(|| {
                StoreError::misuse(format!(
                    "table {} has no primary key to match on",
                    descriptor.table()
                ))
            })?;
            let clause = format!("{key_column} = ?");
            rows.iter()
                .map(|row| {
                    let key = row
                        .get(&key_column)
                        .filter(|v| !v.is_null())
                        .cloned()
                        .ok_or_else(|| {
                            StoreError::misuse(format!(
                                "batch row for {} is missing its {key_column} key",
                                descriptor.table()
                            ))
                        })?;
                    Ok(UpdatePlan {
                        changes: without_columns(row, &[&key_column]),
                        clause: Some(clause.clone()),
                        args: vec![key],
                    })
                })
                .collect()
        }
        BatchUpdate::ByColumn(column) => {
            for row in rows {
                if !row.contains(column) {
                    return Err(StoreError::misuse(format!(
                        "batch row for {} is missing match column {column}",
                        descriptor.table()
                    )));
                }
            }
            let clause = format!("{column} = ?");
            Ok(rows
                .iter()
                .map(|row| {
                    let matched = row.get(column).cloned().unwrap_or(Value::Null);
                    let mut drop = vec![column.as_str()];
                    if let Some(key) = &key_column {
                        drop.push(key.as_str());
                    }
                    UpdatePlan {
                        changes: without_columns(row, &drop),
                        clause: Some(clause.clone()),
                        args: vec![matched],
                    }
                })
                .collect())
        }
        BatchUpdate::ByClause { clause, args } => Ok(rows
            .iter()
            .map(|row| {
                let drop: Vec<&str> = key_column.as_deref().into_iter().collect();
                UpdatePlan {
                    changes: without_columns(row, &drop),
                    clause: Some(clause.clone()),
                    args: args.clone(),
                }
            })
            .collect()),
    }
}

/// Copy of `row` without the named columns.
pub(crate) fn without_columns(row: &ColumnMap, drop: &[&str]) -> ColumnMap {
    let mut out = row.clone();
    for column in drop {
        out.remove(column);
    }
    out
}

/// Strips the descriptor's primary key from a change set.
pub(crate) fn without_key(descriptor: &SchemaDescriptor, changes: &ColumnMap) -> ColumnMap {
    match descriptor.primary_key() {
        Some(key) => without_columns(changes, &[key.name()]),
        None => changes.clone(),
    }
}

/// Insert payload for a row: an auto-increment key is stripped so the
/// store assigns it, a caller-managed key stays.
pub(crate) fn insert_payload(descriptor: &SchemaDescriptor, row: &ColumnMap) -> ColumnMap {
    if descriptor.auto_increments() {
        without_key(descriptor, row)
    } else {
        row.clone()
    }
}

/// `<pk> IN (?, ...)` for a non-empty key set.
pub(crate) fn keys_clause(descriptor: &SchemaDescriptor, count: usize) -> StoreResult<String> {
    let key = descriptor.primary_key().ok_or_else(|| {
        StoreError::misuse(format!(
            "table {} has no primary key to match on",
            descriptor.table()
        ))
    })?;
    if count == 0 {
        return Err(StoreError::misuse("empty key set"));
    }
    Ok(crate::clause::in_params(key.name(), count))
}
