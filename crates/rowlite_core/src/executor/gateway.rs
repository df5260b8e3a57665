//! Executor over a storage gateway.

use std::sync::Arc;

use rowlite_engine::{ColumnMap, Engine, Rows, Value};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::executor::{
    insert_payload, keys_clause, plan_batch_update, without_key, BatchUpdate, RecordExecutor,
};
use crate::gateway::{BatchOp, StorageGateway};
use crate::schema::{ColumnSpec, SchemaDescriptor};

/// Runs record operations through a [`StorageGateway`].
///
/// Every operation starts with a liveness probe and fails closed with
/// [`StoreError::GatewayUnavailable`] when the host is gone; nothing is
/// queued for later. Batches are sent as one unit so the host can apply
/// them atomically. Schema management and raw statements stay with the
/// host and are [`StoreError::Unsupported`] here.
pub struct GatewayExecutor {
    gateway: Arc<dyn StorageGateway>,
    descriptor: Arc<SchemaDescriptor>,
}

impl GatewayExecutor {
    /// Creates an executor for one mapped table.
    #[must_use]
    pub fn new(gateway: Arc<dyn StorageGateway>, descriptor: Arc<SchemaDescriptor>) -> Self {
        Self {
            gateway,
            descriptor,
        }
    }

    fn table(&self) -> &str {
        self.descriptor.table()
    }

    fn probe(&self, op: &str, label: Option<&str>) -> StoreResult<()> {
        if !self.gateway.ping() {
            warn!("gateway down, dropping {op} on {}", self.table());
            return Err(StoreError::GatewayUnavailable);
        }
        match label {
            Some(label) => debug!("{op} {} via gateway [{label}]", self.table()),
            None => debug!("{op} {} via gateway", self.table()),
        }
        Ok(())
    }

    fn unsupported(what: &str) -> StoreError {
        StoreError::unsupported(format!("{what} is owned by the gateway host"))
    }
}

impl RecordExecutor for GatewayExecutor {
    fn exists(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<bool> {
        self.probe("exists", label)?;
        let rows = self
            .gateway
            .query(self.table(), &["COUNT(1)"], clause, args)?;
        Ok(rows.scalar_i64("COUNT(1)").unwrap_or(0) > 0)
    }

    fn insert(&self, row: &ColumnMap, label: Option<&str>) -> StoreResult<i64> {
        self.probe("insert", label)?;
        let row = insert_payload(&self.descriptor, row);
        self.gateway.insert(self.table(), &row)
    }

    fn query_one(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Option<ColumnMap>> {
        self.probe("query_one", label)?;
        let rows = self.gateway.query(self.table(), &["*"], clause, args)?;
        Ok(rows.into_rows().into_iter().next())
    }

    fn query_many(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Vec<ColumnMap>> {
        self.probe("query_many", label)?;
        let rows = self.gateway.query(self.table(), &["*"], clause, args)?;
        Ok(rows.into_rows())
    }

    fn update(
        &self,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<bool> {
        self.probe("update", label)?;
        let changes = without_key(&self.descriptor, changes);
        let count = self.gateway.update(self.table(), &changes, clause, args)?;
        Ok(count > 0)
    }

    fn update_keys(
        &self,
        keys: &[Value],
        changes: &ColumnMap,
        label: Option<&str>,
    ) -> StoreResult<bool> {
        self.probe("update_keys", label)?;
        let clause = keys_clause(&self.descriptor, keys.len())?;
        let changes = without_key(&self.descriptor, changes);
        let count = self
            .gateway
            .update(self.table(), &changes, Some(&clause), keys)?;
        Ok(count > 0)
    }

    fn delete(
        &self,
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<bool> {
        self.probe("delete", label)?;
        let count = self.gateway.delete(self.table(), clause, args)?;
        Ok(count > 0)
    }

    fn batch_insert(&self, rows: &[ColumnMap], label: Option<&str>) -> StoreResult<()> {
        self.probe("batch_insert", label)?;
        if rows.is_empty() {
            return Err(StoreError::misuse("batch insert of zero rows"));
        }
        let ops: Vec<BatchOp> = rows
            .iter()
            .map(|row| BatchOp::Insert {
                table: self.table().to_string(),
                row: insert_payload(&self.descriptor, row),
            })
            .collect();
        self.gateway.apply_batch(&ops)
    }

    fn batch_update(
        &self,
        rows: &[ColumnMap],
        mode: &BatchUpdate,
        label: Option<&str>,
    ) -> StoreResult<()> {
        self.probe("batch_update", label)?;
        let plans = plan_batch_update(&self.descriptor, rows, mode)?;
        let ops: Vec<BatchOp> = plans
            .into_iter()
            .map(|plan| BatchOp::Update {
                table: self.table().to_string(),
                changes: plan.changes,
                clause: plan.clause,
                args: plan.args,
            })
            .collect();
        self.gateway.apply_batch(&ops)
    }

    fn row_projection(
        &self,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
        label: Option<&str>,
    ) -> StoreResult<Rows> {
        self.probe("projection", label)?;
        self.gateway.query(self.table(), projections, clause, args)
    }

    fn raw_query(
        &self,
        _statement: &str,
        _args: &[Value],
        _label: Option<&str>,
    ) -> StoreResult<Rows> {
        Err(Self::unsupported("raw statement execution"))
    }

    fn table_exists(&self) -> StoreResult<bool> {
        Err(Self::unsupported("schema inspection"))
    }

    fn live_columns(&self) -> StoreResult<Vec<String>> {
        Err(Self::unsupported("schema inspection"))
    }

    fn create_table(&self) -> StoreResult<()> {
        Err(Self::unsupported("schema management"))
    }

    fn add_column(&self, _column: &ColumnSpec) -> StoreResult<()> {
        Err(Self::unsupported("schema management"))
    }

    fn drop_table(&self) -> StoreResult<()> {
        Err(Self::unsupported("schema management"))
    }

    fn engine(&self) -> Option<&Engine> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LocalGateway;
    use crate::schema::LogicalType;
    use rowlite_engine::ColumnDef;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Gateway whose host can be switched off mid-test.
    struct FlakyGateway {
        inner: LocalGateway,
        alive: AtomicBool,
    }

    impl FlakyGateway {
        fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    impl StorageGateway for FlakyGateway {
        fn ping(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn insert(&self, table: &str, row: &ColumnMap) -> StoreResult<i64> {
            self.inner.insert(table, row)
        }

        fn update(
            &self,
            table: &str,
            changes: &ColumnMap,
            clause: Option<&str>,
            args: &[Value],
        ) -> StoreResult<usize> {
            self.inner.update(table, changes, clause, args)
        }

        fn delete(&self, table: &str, clause: Option<&str>, args: &[Value]) -> StoreResult<usize> {
            self.inner.delete(table, clause, args)
        }

        fn query(
            &self,
            table: &str,
            projections: &[&str],
            clause: Option<&str>,
            args: &[Value],
        ) -> StoreResult<Rows> {
            self.inner.query(table, projections, clause, args)
        }

        fn apply_batch(&self, ops: &[BatchOp]) -> StoreResult<()> {
            self.inner.apply_batch(ops)
        }
    }

    fn flaky_executor() -> (GatewayExecutor, Arc<FlakyGateway>) {
        let engine = Engine::in_memory();
        engine
            .create_table(
                "users",
                &[
                    ColumnDef::new("id").auto_increment(),
                    ColumnDef::new("name").not_null(),
                ],
            )
            .unwrap();
        let gateway = Arc::new(FlakyGateway {
            inner: LocalGateway::new(engine),
            alive: AtomicBool::new(true),
        });
        let descriptor = Arc::new(
            SchemaDescriptor::new(
                "users",
                vec![
                    ColumnSpec::new("id", LogicalType::Integer).auto_primary_key(),
                    ColumnSpec::new("name", LogicalType::Text).not_null(),
                ],
            )
            .unwrap(),
        );
        let executor = GatewayExecutor::new(gateway.clone(), descriptor);
        (executor, gateway)
    }

    #[test]
    fn round_trips_through_the_gateway() {
        let (executor, _gateway) = flaky_executor();
        let key = executor
            .insert(&ColumnMap::new().with("name", "Ann"), None)
            .unwrap();
        let row = executor
            .query_one(Some("id = ?"), &[Value::Integer(key)], None)
            .unwrap()
            .unwrap();
        assert_eq!(row.get_text("name"), Some("Ann"));
    }

    #[test]
    fn dead_gateway_fails_closed() {
        let (executor, gateway) = flaky_executor();
        executor
            .insert(&ColumnMap::new().with("name", "Ann"), None)
            .unwrap();
        gateway.kill();

        let err = executor
            .insert(&ColumnMap::new().with("name", "Bob"), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::GatewayUnavailable));
        assert!(matches!(
            executor.query_many(None, &[], None).unwrap_err(),
            StoreError::GatewayUnavailable
        ));
    }

    #[test]
    fn batches_are_atomic_on_the_host() {
        let (executor, _gateway) = flaky_executor();
        let rows = vec![
            ColumnMap::new().with("name", "ok"),
            ColumnMap::new().with("name", Value::Null),
        ];
        assert!(executor.batch_insert(&rows, None).is_err());
        assert!(executor.query_many(None, &[], None).unwrap().is_empty());
    }

    #[test]
    fn schema_and_raw_surfaces_are_unsupported() {
        let (executor, _gateway) = flaky_executor();
        assert!(matches!(
            executor.create_table().unwrap_err(),
            StoreError::Unsupported { .. }
        ));
        assert!(matches!(
            executor.raw_query("SELECT * FROM users", &[], None).unwrap_err(),
            StoreError::Unsupported { .. }
        ));
        assert!(executor.engine().is_none());
    }
}
