//! Executor over an in-process engine.

use std::sync::Arc;

use rowlite_engine::{ColumnMap, Engine, Rows, Value};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::executor::{
    insert_payload, keys_clause, plan_batch_update, without_key, BatchUpdate, RecordExecutor,
};
use crate::schema::{ColumnSpec, SchemaDescriptor};

/// Runs record operations directly against an [`Engine`].
///
/// Statement atomicity comes from the engine; multi-statement atomicity is
/// the controller's job, which brackets flagged operations in a
/// transaction scope through [`RecordExecutor::engine`].
#[derive(Debug, Clone)]
pub struct EngineExecutor {
    engine: Engine,
    descriptor: Arc<SchemaDescriptor>,
}

impl EngineExecutor {
    /// Creates an executor for one mapped table.
    #[must_use]
    pub fn new(engine: Engine, descriptor: Arc<SchemaDescriptor>) -> Self {
        Self { engine, descriptor }
    }

    fn table(&self) -> &str {
        self.descriptor.table()
    }

    fn trace(&self, op: &str, label: Option<&str>) {
        match label {
            Some(label) => debug!("{op} {} [{label}]", self.table()),
            None => debug!("{op} {}", self.table()),
        }
    }
}

impl RecordExecutor for EngineExecutor {
    fn exists(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<bool> {
        self.trace("exists", label);
        let rows = self
            .engine
            .select(self.table(), &["COUNT(1)"], clause, args)?;
        Ok(rows.scalar_i64("COUNT(1)").unwrap_or(0) > 0)
    }

    fn insert(&self, row: &ColumnMap, label: Option<&str>) -> StoreResult<i64> {
        self.trace("insert", label);
        let row = insert_payload(&self.descriptor, row);
        Ok(self.engine.insert(self.table(), &row)?)
    }

    fn query_one(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Option<ColumnMap>> {
        self.trace("query_one", label);
        let rows = self.engine.select(self.table(), &["*"], clause, args)?;
        Ok(rows.into_rows().into_iter().next())
    }

    fn query_many(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Vec<ColumnMap>> {
        self.trace("query_many", label);
        let rows = self.engine.select(self.table(), &["*"], clause, args)?;
        Ok(rows.into_rows())
    }

    fn update(
        &self,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<bool> {
        self.trace("update", label);
        let changes = without_key(&self.descriptor, changes);
        let count = self.engine.update(self.table(), &changes, clause, args)?;
        Ok(count > 0)
    }

    fn update_keys(
        &self,
        keys: &[Value],
        changes: &ColumnMap,
        label: Option<&str>,
    ) -> StoreResult<bool> {
        self.trace("update_keys", label);
        let clause = keys_clause(&self.descriptor, keys.len())?;
        let changes = without_key(&self.descriptor, changes);
        let count = self
            .engine
            .update(self.table(), &changes, Some(&clause), keys)?;
        Ok(count > 0)
    }

    fn delete(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<bool> {
        self.trace("delete", label);
        let count = self.engine.delete(self.table(), clause, args)?;
        Ok(count > 0)
    }

    fn batch_insert(&self, rows: &[ColumnMap], label: Option<&str>) -> StoreResult<()> {
        self.trace("batch_insert", label);
        if rows.is_empty() {
            return Err(StoreError::misuse("batch insert of zero rows"));
        }
        for row in rows {
            let row = insert_payload(&self.descriptor, row);
            self.engine.insert(self.table(), &row)?;
        }
        Ok(())
    }

    fn batch_update(
        &self,
        rows: &[ColumnMap],
        mode: &BatchUpdate,
        label: Option<&str>,
    ) -> StoreResult<()> {
        self.trace("batch_update", label);
        let plans = plan_batch_update(&self.descriptor, rows, mode)?;
        for plan in plans {
            self.engine
                .update(self.table(), &plan.changes, plan.clause.as_deref(), &plan.args)?;
        }
        Ok(())
    }

    fn row_projection(
        &self,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Rows> {
        self.trace("projection", label);
        Ok(self.engine.select(self.table(), projections, clause, args)?)
    }

    fn raw_query(
        &self,
        statement: &str,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Rows> {
        self.trace("raw_query", label);
        Ok(self.engine.raw_query(statement, args)?)
    }

    fn table_exists(&self) -> StoreResult<bool> {
        Ok(self.engine.table_exists(self.table()))
    }

    fn live_columns(&self) -> StoreResult<Vec<String>> {
        let columns = self.engine.table_columns(self.table())?;
        Ok(columns.into_iter().map(|c| c.name).collect())
    }

    fn create_table(&self) -> StoreResult<()> {
        debug!("ensuring table: {}", self.descriptor.create_statement());
        self.engine
            .create_table(self.table(), &self.descriptor.engine_columns())?;
        Ok(())
    }

    fn add_column(&self, column: &ColumnSpec) -> StoreResult<()> {
        debug!("{}", self.descriptor.add_column_statement(column));
        self.engine
            .add_column(self.table(), column.to_column_def())?;
        Ok(())
    }

    fn drop_table(&self) -> StoreResult<()> {
        debug!("dropping table {}", self.table());
        self.engine.drop_table(self.table())?;
        Ok(())
    }

    fn engine(&self) -> Option<&Engine> {
        Some(&self.engine)
    }
}
