//! The store registry: one handle over every registered record type.
//!
//! A [`StoreRegistry`] maps record types to their controllers and routes
//! every operation by `TypeId`. It carries two synchronous surfaces over
//! the same controllers:
//!
//! * the `try_*` surface returns [`StoreResult`] and is what new code
//!   should call;
//! * the legacy surface (same names minus the prefix) collapses faults to
//!   neutral values after logging, the way long-lived callers expect.
//!   Misuse panics there instead of collapsing.
//!
//! Registration, aliasing and listener setup serialize under one registry
//! lock, as do schema reconciliation and version changes. Ordinary reads
//! and writes only take that lock long enough to look up a controller.

mod async_api;
mod builder;

pub use builder::StoreBuilder;

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use rowlite_engine::{ColumnMap, Engine, Rows, Value};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::controller::{short_type_name, RecordController, TransactionPolicy};
use crate::error::{StoreError, StoreResult};
use crate::executor::{EngineExecutor, GatewayExecutor, RecordExecutor};
use crate::gateway::StorageGateway;
use crate::mapper::RecordMapper;
use crate::worker::WorkerPool;

/// Runs schema changes when the stored version is behind the configured
/// one.
///
/// Listeners are registered per target version and replayed in ascending
/// order inside a single transaction scope. They receive the engine handle
/// and must do their work through it directly; calling back into the
/// registry from a listener deadlocks, because the registry lock is held
/// for the whole upgrade.
///
/// Implemented for any matching `Fn`, so closures register directly.
pub trait UpgradeListener: Send + Sync {
    /// Applies this listener's schema changes.
    ///
    /// # Errors
    ///
    /// A returned error aborts the replay: the transaction rolls back and
    /// every managed table is dropped and recreated from its descriptor.
    fn on_upgrade(&self, engine: &Engine, old_version: i64, new_version: i64) -> StoreResult<()>;
}

impl<F> UpgradeListener for F
where
    F: Fn(&Engine, i64, i64) -> StoreResult<()> + Send + Sync,
{
    fn on_upgrade(&self, engine: &Engine, old_version: i64, new_version: i64) -> StoreResult<()> {
        self(engine, old_version, new_version)
    }
}

/// Which backend a registry's executors talk to.
#[derive(Clone)]
pub(crate) enum Backend {
    /// In-process engine.
    Direct(Engine),
    /// Row transport to a store owned elsewhere.
    Gateway(Arc<dyn StorageGateway>),
}

/// Object-safe controller view for lifecycle and alias dispatch.
trait AnyController: Send + Sync {
    fn table_name(&self) -> &str;
    fn reconcile(&self) -> StoreResult<()>;
    fn create_table(&self) -> StoreResult<()>;
    fn drop_table(&self) -> StoreResult<()>;
    fn insert_boxed(&self, record: BoxedRecord) -> StoreResult<i64>;
    fn update_boxed(&self, record: BoxedRecord) -> StoreResult<bool>;
    fn update_where_boxed(
        &self,
        record: BoxedRecord,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool>;
    fn insert_or_update_boxed(&self, record: BoxedRecord) -> StoreResult<bool>;
    fn insert_or_update_where_boxed(
        &self,
        record: BoxedRecord,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool>;
    fn delete_boxed(&self, record: BoxedRecord) -> StoreResult<bool>;
    fn batch_insert_boxed(&self, records: Vec<BoxedRecord>) -> StoreResult<()>;
    fn batch_update_boxed(&self, records: Vec<BoxedRecord>) -> StoreResult<()>;
    fn batch_update_by_boxed(&self, records: Vec<BoxedRecord>, column: &str) -> StoreResult<()>;
    fn batch_update_where_boxed(
        &self,
        records: Vec<BoxedRecord>,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<()>;
    fn has_key(&self, key: &Value) -> StoreResult<bool>;
    fn has_where(&self, clause: &str, args: &[Value]) -> StoreResult<bool>;
    fn count(&self, clause: Option<&str>, args: &[Value]) -> StoreResult<i64>;
    fn delete_key(&self, key: &Value) -> StoreResult<bool>;
    fn delete_keys(&self, keys: &[Value]) -> StoreResult<bool>;
    fn delete_where(&self, clause: Option<&str>, args: &[Value]) -> StoreResult<bool>;
    fn update_keys(&self, keys: &[Value], changes: &ColumnMap) -> StoreResult<bool>;
    fn update_values(
        &self,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<bool>;
    fn scalar_i64(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Option<i64>>;
    fn scalar_string(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Option<String>>;
    fn column_i64s(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Vec<i64>>;
    fn column_strings(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Vec<String>>;
    fn rows(&self, projections: &[&str], clause: Option<&str>, args: &[Value])
        -> StoreResult<Rows>;
}

type BoxedRecord = Box<dyn Any + Send>;

fn downcast_record<R: 'static>(record: BoxedRecord) -> StoreResult<R> {
    record
        .downcast::<R>()
        .map(|boxed| *boxed)
        .map_err(|_| StoreError::mapping("record type does not match its controller"))
}

impl<R: Send + 'static> AnyController for RecordController<R> {
    fn table_name(&self) -> &str {
        RecordController::table_name(self)
    }

    fn reconcile(&self) -> StoreResult<()> {
        RecordController::reconcile(self)
    }

    fn create_table(&self) -> StoreResult<()> {
        RecordController::create_table(self)
    }

    fn drop_table(&self) -> StoreResult<()> {
        RecordController::drop_table(self)
    }

    fn insert_boxed(&self, record: BoxedRecord) -> StoreResult<i64> {
        self.insert(&downcast_record::<R>(record)?)
    }

    fn update_boxed(&self, record: BoxedRecord) -> StoreResult<bool> {
        self.update(&downcast_record::<R>(record)?)
    }

    fn update_where_boxed(
        &self,
        record: BoxedRecord,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool> {
        self.update_where(&downcast_record::<R>(record)?, clause, args)
    }

    fn insert_or_update_boxed(&self, record: BoxedRecord) -> StoreResult<bool> {
        self.insert_or_update(&downcast_record::<R>(record)?)
    }

    fn insert_or_update_where_boxed(
        &self,
        record: BoxedRecord,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool> {
        self.insert_or_update_where(&downcast_record::<R>(record)?, clause, args)
    }

    fn delete_boxed(&self, record: BoxedRecord) -> StoreResult<bool> {
        self.delete_record(&downcast_record::<R>(record)?)
    }

    fn batch_insert_boxed(&self, records: Vec<BoxedRecord>) -> StoreResult<()> {
        let mut typed = Vec::with_capacity(records.len());
        for record in records {
            typed.push(downcast_record::<R>(record)?);
        }
        self.batch_insert(&typed)
    }

    fn batch_update_boxed(&self, records: Vec<BoxedRecord>) -> StoreResult<()> {
        let mut typed = Vec::with_capacity(records.len());
        for record in records {
            typed.push(downcast_record::<R>(record)?);
        }
        self.batch_update(&typed)
    }

    fn batch_update_by_boxed(&self, records: Vec<BoxedRecord>, column: &str) -> StoreResult<()> {
        let mut typed = Vec::with_capacity(records.len());
        for record in records {
            typed.push(downcast_record::<R>(record)?);
        }
        self.batch_update_by(&typed, column)
    }

    fn batch_update_where_boxed(
        &self,
        records: Vec<BoxedRecord>,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<()> {
        let mut typed = Vec::with_capacity(records.len());
        for record in records {
            typed.push(downcast_record::<R>(record)?);
        }
        self.batch_update_where(&typed, clause, args)
    }

    fn has_key(&self, key: &Value) -> StoreResult<bool> {
        RecordController::has_key(self, key)
    }

    fn has_where(&self, clause: &str, args: &[Value]) -> StoreResult<bool> {
        RecordController::has_where(self, clause, args)
    }

    fn count(&self, clause: Option<&str>, args: &[Value]) -> StoreResult<i64> {
        RecordController::count(self, clause, args)
    }

    fn delete_key(&self, key: &Value) -> StoreResult<bool> {
        RecordController::delete_key(self, key)
    }

    fn delete_keys(&self, keys: &[Value]) -> StoreResult<bool> {
        RecordController::delete_keys(self, keys)
    }

    fn delete_where(&self, clause: Option<&str>, args: &[Value]) -> StoreResult<bool> {
        RecordController::delete_where(self, clause, args)
    }

    fn update_keys(&self, keys: &[Value], changes: &ColumnMap) -> StoreResult<bool> {
        RecordController::update_keys(self, keys, changes)
    }

    fn update_values(
        &self,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<bool> {
        RecordController::update_values(self, changes, clause, args)
    }

    fn scalar_i64(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Option<i64>> {
        RecordController::scalar_i64(self, projection, clause, args)
    }

    fn scalar_string(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Option<String>> {
        RecordController::scalar_string(self, projection, clause, args)
    }

    fn column_i64s(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Vec<i64>> {
        RecordController::column_i64s(self, projection, clause, args)
    }

    fn column_strings(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Vec<String>> {
        RecordController::column_strings(self, projection, clause, args)
    }

    fn rows(
        &self,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Rows> {
        RecordController::rows(self, projections, clause, args)
    }
}

/// Conversion edge from an aliased type to its registered target.
trait AliasRoute: Send + Sync {
    fn target(&self) -> TypeId;
    fn target_name(&self) -> &'static str;
    fn convert(&self, record: BoxedRecord) -> StoreResult<BoxedRecord>;
}

struct Route<S, B> {
    marker: PhantomData<fn(S) -> B>,
}

impl<S, B> AliasRoute for Route<S, B>
where
    S: Into<B> + Send + 'static,
    B: Send + 'static,
{
    fn target(&self) -> TypeId {
        TypeId::of::<B>()
    }

    fn target_name(&self) -> &'static str {
        short_type_name::<B>()
    }

    fn convert(&self, record: BoxedRecord) -> StoreResult<BoxedRecord> {
        let sub = downcast_record::<S>(record)?;
        Ok(Box::new(sub.into()))
    }
}

/// One registered record type: the same controller under two vtables.
#[derive(Clone)]
struct Entry {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn AnyController>,
}

#[derive(Default)]
struct RegistryState {
    controllers: HashMap<TypeId, Entry>,
    aliases: HashMap<TypeId, Arc<dyn AliasRoute>>,
    upgrades: BTreeMap<i64, Arc<dyn UpgradeListener>>,
}

struct RegistryInner {
    config: StoreConfig,
    state: Mutex<RegistryState>,
    // Declared before the backend so teardown joins the pool (finishing
    // queued jobs) before the engine handle drops and saves its final
    // snapshot.
    worker: WorkerPool,
    backend: Backend,
}

/// Handle to a record store.
///
/// Built with a [`StoreBuilder`]; cheap to clone and share across threads.
/// Dropping the last handle joins the async worker pool, which finishes
/// already queued operations, and releases the engine, which saves a final
/// snapshot.
#[derive(Clone)]
pub struct StoreRegistry {
    inner: Arc<RegistryInner>,
}

/// Collapses a strict result onto the legacy surface.
fn collapse<T>(result: StoreResult<T>, neutral: T, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) if err.is_misuse() => panic!("{context}: {err}"),
        Err(err) => {
            warn!("{context}: {err}");
            neutral
        }
    }
}

impl StoreRegistry {
    pub(crate) fn new(backend: Backend, config: StoreConfig) -> Self {
        let worker = WorkerPool::new(config.worker_threads);
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                config,
                state: Mutex::new(RegistryState::default()),
                worker,
            }),
        }
    }

    /// The store configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The underlying engine, when the backend is direct.
    #[must_use]
    pub fn engine(&self) -> Option<&Engine> {
        match &self.inner.backend {
            Backend::Direct(engine) => Some(engine),
            Backend::Gateway(_) => None,
        }
    }

    /// Tables of every registered record type.
    #[must_use]
    pub fn registered_tables(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut tables: Vec<String> = state
            .controllers
            .values()
            .map(|entry| entry.erased.table_name().to_string())
            .collect();
        tables.sort_unstable();
        tables
    }

    fn direct_engine(&self, what: &str) -> StoreResult<&Engine> {
        match &self.inner.backend {
            Backend::Direct(engine) => Ok(engine),
            Backend::Gateway(_) => Err(StoreError::unsupported(format!(
                "{what} needs the direct backend"
            ))),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers a mapper with the default transaction policy.
    ///
    /// Registration is idempotent per record type: registering the same
    /// type again is a no-op. On a direct backend the table is reconciled
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Misuse`] for contradictory column
    /// declarations, and engine errors when reconciliation fails.
    pub fn register<M: RecordMapper>(&self, mapper: M) -> StoreResult<()> {
        self.register_with_policy(mapper, TransactionPolicy::default())
    }

    /// Registers a mapper with an explicit transaction policy.
    pub fn register_with_policy<M: RecordMapper>(
        &self,
        mapper: M,
        policy: TransactionPolicy,
    ) -> StoreResult<()> {
        self.register_inner(mapper, policy, true)
    }

    pub(crate) fn register_inner<M: RecordMapper>(
        &self,
        mapper: M,
        policy: TransactionPolicy,
        reconcile: bool,
    ) -> StoreResult<()> {
        let type_id = TypeId::of::<M::Record>();
        let descriptor = Arc::new(mapper.descriptor()?);
        let mut state = self.inner.state.lock();
        if state.controllers.contains_key(&type_id) {
            debug!(
                "{} is already registered, keeping the existing controller",
                short_type_name::<M::Record>()
            );
            return Ok(());
        }

        let executor: Box<dyn RecordExecutor> = match &self.inner.backend {
            Backend::Direct(engine) => Box::new(EngineExecutor::new(
                engine.clone(),
                Arc::clone(&descriptor),
            )),
            Backend::Gateway(gateway) => Box::new(GatewayExecutor::new(
                Arc::clone(gateway),
                Arc::clone(&descriptor),
            )),
        };
        let controller = Arc::new(RecordController::new(
            Box::new(mapper),
            descriptor,
            executor,
            policy,
        ));
        if reconcile && matches!(self.inner.backend, Backend::Direct(_)) {
            controller.reconcile()?;
        }
        info!(
            "registered {} -> {}",
            short_type_name::<M::Record>(),
            controller.table_name()
        );
        state.controllers.insert(
            type_id,
            Entry {
                typed: controller.clone() as Arc<dyn Any + Send + Sync>,
                erased: controller,
            },
        );
        Ok(())
    }

    /// Registers `S` as an alias of the registered type `B`.
    ///
    /// Records of `S` are converted with [`Into`] and written through
    /// `B`'s controller; key-based operations forward unchanged. Reads
    /// that would have to produce an `S` are refused, because rows only
    /// convert in one direction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Misuse`] when `B` is not registered or `S`
    /// already has its own controller. Registering the same alias again is
    /// a no-op.
    pub fn register_alias<S, B>(&self) -> StoreResult<()>
    where
        S: Into<B> + Send + 'static,
        B: Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.controllers.contains_key(&TypeId::of::<S>()) {
            return Err(StoreError::misuse(format!(
                "{} already has its own controller",
                short_type_name::<S>()
            )));
        }
        if !state.controllers.contains_key(&TypeId::of::<B>()) {
            return Err(StoreError::misuse(format!(
                "alias target {} is not registered",
                short_type_name::<B>()
            )));
        }
        state
            .aliases
            .entry(TypeId::of::<S>())
            .or_insert_with(|| Arc::new(Route::<S, B> { marker: PhantomData }));
        debug!(
            "aliased {} -> {}",
            short_type_name::<S>(),
            short_type_name::<B>()
        );
        Ok(())
    }

    /// Registers an upgrade listener for one target version.
    ///
    /// Registration is idempotent per version: the first listener for a
    /// version wins and later ones are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Misuse`] for versions below 1.
    pub fn add_upgrade_listener(
        &self,
        version: i64,
        listener: impl UpgradeListener + 'static,
    ) -> StoreResult<()> {
        self.add_upgrade_listener_arc(version, Arc::new(listener))
    }

    pub(crate) fn add_upgrade_listener_arc(
        &self,
        version: i64,
        listener: Arc<dyn UpgradeListener>,
    ) -> StoreResult<()> {
        if version < 1 {
            return Err(StoreError::misuse("upgrade versions start at 1"));
        }
        let mut state = self.inner.state.lock();
        state.upgrades.entry(version).or_insert(listener);
        Ok(())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// The typed controller registered for `R`.
    ///
    /// Every registry operation dispatches through one of these; holding
    /// the controller directly skips the per-call lookup when a caller
    /// works one table hard.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoController`] for unregistered types. Alias
    /// registrations do not count; only real controllers are returned.
    pub fn controller<R: Send + 'static>(&self) -> StoreResult<Arc<RecordController<R>>> {
        let state = self.inner.state.lock();
        let entry = state
            .controllers
            .get(&TypeId::of::<R>())
            .ok_or_else(|| StoreError::no_controller(short_type_name::<R>()))?;
        entry
            .typed
            .clone()
            .downcast::<RecordController<R>>()
            .map_err(|_| StoreError::mapping("controller type does not match its registration"))
    }

    /// Controller for `R`'s key context: itself, or its alias target.
    fn resolve_keyed<R: 'static>(&self) -> StoreResult<Arc<dyn AnyController>> {
        let state = self.inner.state.lock();
        if let Some(entry) = state.controllers.get(&TypeId::of::<R>()) {
            return Ok(entry.erased.clone());
        }
        if let Some(route) = state.aliases.get(&TypeId::of::<R>()) {
            let entry = state
                .controllers
                .get(&route.target())
                .ok_or_else(|| StoreError::no_controller(route.target_name()))?;
            return Ok(entry.erased.clone());
        }
        Err(StoreError::no_controller(short_type_name::<R>()))
    }

    /// Controller and converted payload for a record-consuming operation.
    fn resolve_record<R: Send + 'static>(
        &self,
        record: R,
    ) -> StoreResult<(Arc<dyn AnyController>, BoxedRecord)> {
        let state = self.inner.state.lock();
        if let Some(entry) = state.controllers.get(&TypeId::of::<R>()) {
            return Ok((entry.erased.clone(), Box::new(record)));
        }
        if let Some(route) = state.aliases.get(&TypeId::of::<R>()) {
            let entry = state
                .controllers
                .get(&route.target())
                .ok_or_else(|| StoreError::no_controller(route.target_name()))?;
            let converted = route.convert(Box::new(record))?;
            return Ok((entry.erased.clone(), converted));
        }
        Err(StoreError::no_controller(short_type_name::<R>()))
    }

    /// Controller and converted payloads for a batch operation.
    fn resolve_records<R: Send + 'static>(
        &self,
        records: Vec<R>,
    ) -> StoreResult<(Arc<dyn AnyController>, Vec<BoxedRecord>)> {
        let state = self.inner.state.lock();
        if let Some(entry) = state.controllers.get(&TypeId::of::<R>()) {
            let boxed = records
                .into_iter()
                .map(|r| Box::new(r) as BoxedRecord)
                .collect();
            return Ok((entry.erased.clone(), boxed));
        }
        if let Some(route) = state.aliases.get(&TypeId::of::<R>()) {
            let entry = state
                .controllers
                .get(&route.target())
                .ok_or_else(|| StoreError::no_controller(route.target_name()))?;
            let mut converted = Vec::with_capacity(records.len());
            for record in records {
                converted.push(route.convert(Box::new(record))?);
            }
            return Ok((entry.erased.clone(), converted));
        }
        Err(StoreError::no_controller(short_type_name::<R>()))
    }

    /// Typed controller for a read that must produce `R` values.
    fn resolve_read<R: Send + 'static>(&self) -> StoreResult<Arc<RecordController<R>>> {
        {
            let state = self.inner.state.lock();
            if !state.controllers.contains_key(&TypeId::of::<R>())
                && state.aliases.contains_key(&TypeId::of::<R>())
            {
                return Err(StoreError::alias_read(short_type_name::<R>()));
            }
        }
        self.controller::<R>()
    }

    // ========================================================================
    // Strict surface
    // ========================================================================

    /// Whether a record of `R` with the given key exists.
    pub fn try_has<R: Send + 'static>(&self, key: Value) -> StoreResult<bool> {
        self.resolve_keyed::<R>()?.has_key(&key)
    }

    /// Whether any record of `R` matches the clause.
    pub fn try_has_where<R: Send + 'static>(
        &self,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool> {
        self.resolve_keyed::<R>()?.has_where(clause, args)
    }

    /// Number of records of `R` matching the clause; `None` counts all.
    pub fn try_count<R: Send + 'static>(
        &self,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<i64> {
        self.resolve_keyed::<R>()?.count(clause, args)
    }

    /// The record of `R` with the given key, if present.
    pub fn try_query<R: Send + 'static>(&self, key: Value) -> StoreResult<Option<R>> {
        self.resolve_read::<R>()?.find(&key)
    }

    /// The first record of `R` matching the clause.
    pub fn try_query_first<R: Send + 'static>(
        &self,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<Option<R>> {
        self.resolve_read::<R>()?.find_first(clause, args)
    }

    /// Every record of `R` matching the clause.
    pub fn try_query_where<R: Send + 'static>(
        &self,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<Vec<R>> {
        self.resolve_read::<R>()?.find_where(clause, args)
    }

    /// Every record of `R`.
    pub fn try_query_all<R: Send + 'static>(&self) -> StoreResult<Vec<R>> {
        self.resolve_read::<R>()?.find_all()
    }

    /// Inserts a record, returning the assigned key.
    pub fn try_insert<R: Send + 'static>(&self, record: R) -> StoreResult<i64> {
        let (controller, record) = self.resolve_record(record)?;
        controller.insert_boxed(record)
    }

    /// Updates the stored record with the same key.
    pub fn try_update<R: Send + 'static>(&self, record: R) -> StoreResult<bool> {
        let (controller, record) = self.resolve_record(record)?;
        controller.update_boxed(record)
    }

    /// Updates the rows the clause matches with the record's values.
    pub fn try_update_where<R: Send + 'static>(
        &self,
        record: R,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool> {
        let (controller, record) = self.resolve_record(record)?;
        controller.update_where_boxed(record, clause, args)
    }

    /// Applies an explicit change set to the rows the clause matches;
    /// `None` touches every row.
    pub fn try_update_values<R: Send + 'static>(
        &self,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<bool> {
        self.resolve_keyed::<R>()?.update_values(changes, clause, args)
    }

    /// Inserts the record, or updates it when its key already exists.
    pub fn try_insert_or_update<R: Send + 'static>(&self, record: R) -> StoreResult<bool> {
        let (controller, record) = self.resolve_record(record)?;
        controller.insert_or_update_boxed(record)
    }

    /// Inserts the record, or updates the rows an explicit predicate
    /// matches when any exist.
    pub fn try_insert_or_update_where<R: Send + 'static>(
        &self,
        record: R,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool> {
        let (controller, record) = self.resolve_record(record)?;
        controller.insert_or_update_where_boxed(record, clause, args)
    }

    /// Deletes the stored record with this record's key.
    pub fn try_delete<R: Send + 'static>(&self, record: R) -> StoreResult<bool> {
        let (controller, record) = self.resolve_record(record)?;
        controller.delete_boxed(record)
    }

    /// Deletes the record of `R` with the given key.
    pub fn try_delete_key<R: Send + 'static>(&self, key: Value) -> StoreResult<bool> {
        self.resolve_keyed::<R>()?.delete_key(&key)
    }

    /// Deletes every record of `R` whose key is in `keys`.
    pub fn try_delete_keys<R: Send + 'static>(&self, keys: &[Value]) -> StoreResult<bool> {
        self.resolve_keyed::<R>()?.delete_keys(keys)
    }

    /// Deletes every record of `R` the clause matches.
    pub fn try_delete_where<R: Send + 'static>(
        &self,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<bool> {
        self.resolve_keyed::<R>()?.delete_where(Some(clause), args)
    }

    /// Deletes every record of `R`.
    pub fn try_delete_all<R: Send + 'static>(&self) -> StoreResult<bool> {
        self.resolve_keyed::<R>()?.delete_where(None, &[])
    }

    /// Applies one change set to every record of `R` whose key is in
    /// `keys`.
    pub fn try_update_keys<R: Send + 'static>(
        &self,
        keys: &[Value],
        changes: &ColumnMap,
    ) -> StoreResult<bool> {
        self.resolve_keyed::<R>()?.update_keys(keys, changes)
    }

    /// Inserts every record.
    pub fn try_batch_insert<R: Send + 'static>(&self, records: Vec<R>) -> StoreResult<()> {
        let (controller, records) = self.resolve_records(records)?;
        controller.batch_insert_boxed(records)
    }

    /// Updates every record, matched by its key.
    pub fn try_batch_update<R: Send + 'static>(&self, records: Vec<R>) -> StoreResult<()> {
        let (controller, records) = self.resolve_records(records)?;
        controller.batch_update_boxed(records)
    }

    /// Updates every record, matched by the named column.
    pub fn try_batch_update_by<R: Send + 'static>(
        &self,
        records: Vec<R>,
        column: &str,
    ) -> StoreResult<()> {
        let (controller, records) = self.resolve_records(records)?;
        controller.batch_update_by_boxed(records, column)
    }

    /// Updates every record under one shared clause.
    pub fn try_batch_update_where<R: Send + 'static>(
        &self,
        records: Vec<R>,
        clause: &str,
        args: &[Value],
    ) -> StoreResult<()> {
        let (controller, records) = self.resolve_records(records)?;
        controller.batch_update_where_boxed(records, clause, args)
    }

    /// First value of a projection over `R`'s table, as an integer.
    pub fn try_scalar_i64<R: Send + 'static>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Option<i64>> {
        self.resolve_keyed::<R>()?.scalar_i64(projection, clause, args)
    }

    /// First value of a projection over `R`'s table, as a string.
    pub fn try_scalar_string<R: Send + 'static>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Option<String>> {
        self.resolve_keyed::<R>()?
            .scalar_string(projection, clause, args)
    }

    /// Every value of a projection over `R`'s table, as integers.
    pub fn try_column_i64s<R: Send + 'static>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Vec<i64>> {
        self.resolve_keyed::<R>()?
            .column_i64s(projection, clause, args)
    }

    /// Every value of a projection over `R`'s table, as strings.
    pub fn try_column_strings<R: Send + 'static>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Vec<String>> {
        self.resolve_keyed::<R>()?
            .column_strings(projection, clause, args)
    }

    /// Multi-column projection query over `R`'s table.
    pub fn try_rows<R: Send + 'static>(
        &self,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
    ) -> StoreResult<Rows> {
        self.resolve_keyed::<R>()?.rows(projections, clause, args)
    }

    /// Runs a raw select statement. Direct backend only.
    pub fn try_raw_query(&self, statement: &str, args: &[Value]) -> StoreResult<Rows> {
        let engine = self.direct_engine("raw statement execution")?;
        Ok(engine.raw_query(statement, args)?)
    }

    /// Runs a closure inside one transaction scope. Direct backend only.
    ///
    /// Commits when the closure returns `Ok`; rolls back when it returns
    /// `Err`. Registry operations called inside the closure join the
    /// scope.
    pub fn try_execute_transaction<T>(
        &self,
        f: impl FnOnce(&Engine) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let engine = self.direct_engine("execute_transaction")?;
        let scope = engine.begin().map_err(StoreError::from)?;
        let value = f(engine)?;
        scope.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Saves the snapshot now. Direct backend only.
    pub fn try_flush(&self) -> StoreResult<()> {
        let engine = self.direct_engine("flush")?;
        Ok(engine.flush()?)
    }

    // ========================================================================
    // Schema lifecycle
    // ========================================================================

    /// Creates every registered table. Direct backend only.
    pub fn try_create_all_tables(&self) -> StoreResult<()> {
        self.direct_engine("table creation")?;
        let state = self.inner.state.lock();
        for entry in state.controllers.values() {
            entry.erased.create_table()?;
        }
        Ok(())
    }

    /// Drops every registered table. Direct backend only.
    pub fn try_drop_all_tables(&self) -> StoreResult<()> {
        self.direct_engine("table removal")?;
        let state = self.inner.state.lock();
        for entry in state.controllers.values() {
            entry.erased.drop_table()?;
        }
        Ok(())
    }

    /// Reconciles every registered table inside one transaction.
    ///
    /// Missing tables are created and missing columns added; nothing is
    /// dropped. A failure rolls the whole pass back. Direct backend only.
    pub fn try_check_database_integrity(&self) -> StoreResult<()> {
        let engine = self.direct_engine("integrity check")?;
        let state = self.inner.state.lock();
        let scope = engine.begin().map_err(StoreError::from)?;
        for entry in state.controllers.values() {
            entry.erased.reconcile()?;
        }
        scope.commit().map_err(StoreError::from)?;
        debug!("integrity check passed for {} tables", state.controllers.len());
        Ok(())
    }

    /// Replays upgrade listeners and stamps the new version.
    ///
    /// Listeners registered for versions in `old_version+1..=new_version`
    /// run in ascending order inside one transaction scope. When one
    /// fails, the scope rolls back, every managed table is dropped and
    /// recreated from its descriptor, and the store continues at the new
    /// version with fresh tables. Usually driven by the builder at open
    /// time. Direct backend only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UpgradeFailed`] only when the destructive
    /// fallback itself fails; a failed listener alone is logged and
    /// recovered from.
    pub fn try_upgrade(&self, old_version: i64, new_version: i64) -> StoreResult<()> {
        if new_version < old_version {
            return Err(StoreError::misuse("an upgrade cannot lower the version"));
        }
        let engine = self.direct_engine("schema upgrade")?;
        let state = self.inner.state.lock();
        let listeners: Vec<(i64, Arc<dyn UpgradeListener>)> = state
            .upgrades
            .range(old_version + 1..=new_version)
            .map(|(version, listener)| (*version, Arc::clone(listener)))
            .collect();

        info!(
            "upgrading store from {old_version} to {new_version} ({} listener(s))",
            listeners.len()
        );
        let failure = {
            let scope = engine.begin().map_err(StoreError::from)?;
            let mut failure = None;
            for (version, listener) in &listeners {
                debug!("applying upgrade listener for version {version}");
                if let Err(err) = listener.on_upgrade(engine, old_version, new_version) {
                    failure = Some((*version, err));
                    break;
                }
            }
            match failure {
                None => {
                    scope.commit().map_err(StoreError::from)?;
                    None
                }
                // Roll back before touching anything else.
                Some(failed) => {
                    drop(scope);
                    Some(failed)
                }
            }
        };

        if let Some((version, err)) = failure {
            warn!("upgrade listener for version {version} failed: {err}; rebuilding all tables");
            rebuild_all(&state)
                .map_err(|rebuild| StoreError::upgrade_failed(new_version, rebuild.to_string()))?;
        }
        engine.set_schema_version(new_version)?;
        Ok(())
    }

    /// Drops and recreates every managed table, then stamps the version.
    ///
    /// Going back to an older version cannot be replayed, so the data is
    /// discarded. Direct backend only.
    pub fn try_downgrade(&self, old_version: i64, new_version: i64) -> StoreResult<()> {
        let engine = self.direct_engine("schema downgrade")?;
        let state = self.inner.state.lock();
        warn!("downgrading store from {old_version} to {new_version}, rebuilding all tables");
        rebuild_all(&state)?;
        engine.set_schema_version(new_version)?;
        Ok(())
    }

    /// Open-time versioning: create, upgrade or downgrade to the
    /// configured version.
    pub(crate) fn apply_versioning(&self) -> StoreResult<()> {
        let Backend::Direct(engine) = &self.inner.backend else {
            debug!("gateway backend, schema lifecycle stays with the host");
            return Ok(());
        };
        let configured = self.inner.config.version;
        let stored = engine.schema_version();

        if stored == 0 {
            info!("fresh store, creating tables at version {configured}");
            {
                let state = self.inner.state.lock();
                for entry in state.controllers.values() {
                    entry.erased.reconcile()?;
                }
            }
            engine.set_schema_version(configured)?;
            return Ok(());
        }

        match stored.cmp(&configured) {
            std::cmp::Ordering::Equal => self.reconcile_all(),
            std::cmp::Ordering::Less => {
                self.try_upgrade(stored, configured)?;
                // Tables and columns added in the new version that no
                // listener created are filled in additively.
                self.reconcile_all()
            }
            std::cmp::Ordering::Greater => self.try_downgrade(stored, configured),
        }
    }

    fn reconcile_all(&self) -> StoreResult<()> {
        let state = self.inner.state.lock();
        for entry in state.controllers.values() {
            entry.erased.reconcile()?;
        }
        Ok(())
    }

    // ========================================================================
    // Legacy surface
    // ========================================================================

    /// Whether a record of `R` with the given key exists. `false` on
    /// fault.
    ///
    /// # Panics
    ///
    /// Panics on misuse, like every legacy operation.
    pub fn has<R: Send + 'static>(&self, key: Value) -> bool {
        collapse(self.try_has::<R>(key), false, "has")
    }

    /// Whether any record of `R` matches the clause. `false` on fault.
    pub fn has_where<R: Send + 'static>(&self, clause: &str, args: &[Value]) -> bool {
        collapse(self.try_has_where::<R>(clause, args), false, "has_where")
    }

    /// Number of matching records of `R`. `0` on fault.
    pub fn count<R: Send + 'static>(&self, clause: Option<&str>, args: &[Value]) -> i64 {
        collapse(self.try_count::<R>(clause, args), 0, "count")
    }

    /// The record of `R` with the given key. `None` on fault.
    pub fn query<R: Send + 'static>(&self, key: Value) -> Option<R> {
        collapse(self.try_query::<R>(key), None, "query")
    }

    /// The first record of `R` matching the clause. Absent on fault.
    pub fn query_first<R: Send + 'static>(&self, clause: &str, args: &[Value]) -> Option<R> {
        collapse(self.try_query_first::<R>(clause, args), None, "query_first")
    }

    /// Every record of `R` matching the clause. Empty on fault.
    pub fn query_where<R: Send + 'static>(&self, clause: &str, args: &[Value]) -> Vec<R> {
        collapse(self.try_query_where::<R>(clause, args), Vec::new(), "query_where")
    }

    /// Every record of `R`. Empty on fault.
    pub fn query_all<R: Send + 'static>(&self) -> Vec<R> {
        collapse(self.try_query_all::<R>(), Vec::new(), "query_all")
    }

    /// Inserts a record, returning the assigned key. `0` on fault; keys
    /// start at 1.
    pub fn insert<R: Send + 'static>(&self, record: R) -> i64 {
        collapse(self.try_insert(record), 0, "insert")
    }

    /// Updates the stored record with the same key. `false` on fault.
    pub fn update<R: Send + 'static>(&self, record: R) -> bool {
        collapse(self.try_update(record), false, "update")
    }

    /// Updates the rows the clause matches with the record's values.
    /// `false` on fault.
    pub fn update_where<R: Send + 'static>(
        &self,
        record: R,
        clause: &str,
        args: &[Value],
    ) -> bool {
        collapse(
            self.try_update_where(record, clause, args),
            false,
            "update_where",
        )
    }

    /// Applies a change set to the rows the clause matches. `false` on
    /// fault.
    pub fn update_values<R: Send + 'static>(
        &self,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
    ) -> bool {
        collapse(
            self.try_update_values::<R>(changes, clause, args),
            false,
            "update_values",
        )
    }

    /// Inserts or updates the record. `false` on fault.
    pub fn insert_or_update<R: Send + 'static>(&self, record: R) -> bool {
        collapse(self.try_insert_or_update(record), false, "insert_or_update")
    }

    /// Inserts the record, or updates the rows the clause matches.
    /// `false` on fault.
    pub fn insert_or_update_where<R: Send + 'static>(
        &self,
        record: R,
        clause: &str,
        args: &[Value],
    ) -> bool {
        collapse(
            self.try_insert_or_update_where(record, clause, args),
            false,
            "insert_or_update_where",
        )
    }

    /// Deletes the stored record with this record's key. `false` on
    /// fault.
    pub fn delete<R: Send + 'static>(&self, record: R) -> bool {
        collapse(self.try_delete(record), false, "delete")
    }

    /// Deletes the record of `R` with the given key. `false` on fault.
    pub fn delete_key<R: Send + 'static>(&self, key: Value) -> bool {
        collapse(self.try_delete_key::<R>(key), false, "delete_key")
    }

    /// Deletes every record of `R` whose key is in `keys`. `false` on
    /// fault.
    pub fn delete_keys<R: Send + 'static>(&self, keys: &[Value]) -> bool {
        collapse(self.try_delete_keys::<R>(keys), false, "delete_keys")
    }

    /// Deletes every record of `R` the clause matches. `false` on fault.
    pub fn delete_where<R: Send + 'static>(&self, clause: &str, args: &[Value]) -> bool {
        collapse(self.try_delete_where::<R>(clause, args), false, "delete_where")
    }

    /// Deletes every record of `R`. `false` on fault.
    pub fn delete_all<R: Send + 'static>(&self) -> bool {
        collapse(self.try_delete_all::<R>(), false, "delete_all")
    }

    /// Applies one change set to every record of `R` whose key is in
    /// `keys`. `false` on fault.
    pub fn update_keys<R: Send + 'static>(&self, keys: &[Value], changes: &ColumnMap) -> bool {
        collapse(self.try_update_keys::<R>(keys, changes), false, "update_keys")
    }

    /// Inserts every record. `false` on fault, `true` when all stored.
    pub fn batch_insert<R: Send + 'static>(&self, records: Vec<R>) -> bool {
        collapse(
            self.try_batch_insert(records).map(|()| true),
            false,
            "batch_insert",
        )
    }

    /// Updates every record by key. `false` on fault.
    pub fn batch_update<R: Send + 'static>(&self, records: Vec<R>) -> bool {
        collapse(
            self.try_batch_update(records).map(|()| true),
            false,
            "batch_update",
        )
    }

    /// Updates every record, matched by the named column. `false` on
    /// fault.
    pub fn batch_update_by<R: Send + 'static>(&self, records: Vec<R>, column: &str) -> bool {
        collapse(
            self.try_batch_update_by(records, column).map(|()| true),
            false,
            "batch_update_by",
        )
    }

    /// Updates every record under one shared clause. `false` on fault.
    pub fn batch_update_where<R: Send + 'static>(
        &self,
        records: Vec<R>,
        clause: &str,
        args: &[Value],
    ) -> bool {
        collapse(
            self.try_batch_update_where(records, clause, args)
                .map(|()| true),
            false,
            "batch_update_where",
        )
    }

    /// First value of a projection over `R`'s table. `None` on fault.
    pub fn scalar_i64<R: Send + 'static>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> Option<i64> {
        collapse(
            self.try_scalar_i64::<R>(projection, clause, args),
            None,
            "scalar_i64",
        )
    }

    /// First value of a projection over `R`'s table. `None` on fault.
    pub fn scalar_string<R: Send + 'static>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> Option<String> {
        collapse(
            self.try_scalar_string::<R>(projection, clause, args),
            None,
            "scalar_string",
        )
    }

    /// Every value of a projection over `R`'s table. Empty on fault.
    pub fn column_i64s<R: Send + 'static>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> Vec<i64> {
        collapse(
            self.try_column_i64s::<R>(projection, clause, args),
            Vec::new(),
            "column_i64s",
        )
    }

    /// Every value of a projection over `R`'s table. Empty on fault.
    pub fn column_strings<R: Send + 'static>(
        &self,
        projection: &str,
        clause: Option<&str>,
        args: &[Value],
    ) -> Vec<String> {
        collapse(
            self.try_column_strings::<R>(projection, clause, args),
            Vec::new(),
            "column_strings",
        )
    }

    /// Multi-column projection over `R`'s table. Empty on fault.
    pub fn rows<R: Send + 'static>(
        &self,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
    ) -> Rows {
        collapse(
            self.try_rows::<R>(projections, clause, args),
            Rows::default(),
            "rows",
        )
    }

    /// Runs a raw select statement. Empty on fault.
    pub fn raw_query(&self, statement: &str, args: &[Value]) -> Rows {
        collapse(self.try_raw_query(statement, args), Rows::default(), "raw_query")
    }

    /// Runs a closure inside one transaction scope. `false` on fault.
    pub fn execute_transaction(&self, f: impl FnOnce(&Engine) -> StoreResult<()>) -> bool {
        collapse(
            self.try_execute_transaction(f).map(|()| true),
            false,
            "execute_transaction",
        )
    }

    /// Creates every registered table. `false` on fault.
    pub fn create_all_tables(&self) -> bool {
        collapse(
            self.try_create_all_tables().map(|()| true),
            false,
            "create_all_tables",
        )
    }

    /// Drops every registered table. `false` on fault.
    pub fn drop_all_tables(&self) -> bool {
        collapse(
            self.try_drop_all_tables().map(|()| true),
            false,
            "drop_all_tables",
        )
    }

    /// Reconciles every registered table. `false` on fault.
    pub fn check_database_integrity(&self) -> bool {
        collapse(
            self.try_check_database_integrity().map(|()| true),
            false,
            "check_database_integrity",
        )
    }
}

/// Drops and recreates every managed table.
fn rebuild_all(state: &RegistryState) -> StoreResult<()> {
    for entry in state.controllers.values() {
        entry.erased.drop_table()?;
        entry.erased.create_table()?;
    }
    Ok(())
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.inner.backend {
            Backend::Direct(_) => "direct",
            Backend::Gateway(_) => "gateway",
        };
        f.debug_struct("StoreRegistry")
            .field("name", &self.inner.config.name)
            .field("backend", &backend)
            .field("tables", &self.registered_tables())
            .finish_non_exhaustive()
    }
}
