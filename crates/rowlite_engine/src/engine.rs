//! Engine facade and transaction scopes.

use crate::cursor::Rows;
use crate::error::{EngineError, EngineResult};
use crate::predicate::Predicate;
use crate::query;
use crate::row::ColumnMap;
use crate::snapshot::{StoreFile, StoreState};
use crate::table::{ColumnDef, Table};
use crate::value::Value;
use parking_lot::{Condvar, Mutex, RwLock};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Create the store file when it doesn't exist.
    pub create_if_missing: bool,
    /// Save the snapshot after every committed write.
    ///
    /// When disabled, data reaches disk only on [`Engine::flush`] or when
    /// the last handle drops.
    pub flush_on_commit: bool,
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            create_if_missing: true,
            flush_on_commit: true,
        }
    }

    /// Sets whether a missing store file is created on open.
    #[must_use]
    pub const fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets whether every committed write saves the snapshot.
    #[must_use]
    pub const fn flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Bookkeeping for the single open transaction scope.
#[derive(Debug, Default)]
struct Gate {
    /// Thread currently holding write access, if any.
    owner: Option<ThreadId>,
    /// Pre-scope state for rollback. `None` for transient writes.
    undo: Option<StoreState>,
}

#[derive(Debug)]
struct EngineInner {
    config: EngineConfig,
    /// Store file and its lock. `None` for in-memory engines.
    file: Option<StoreFile>,
    state: RwLock<StoreState>,
    gate: Mutex<Gate>,
    gate_cv: Condvar,
}

/// The embedded row store.
///
/// An `Engine` owns a set of tables and executes inserts, updates, deletes
/// and selects against them, with clause strings and positional arguments.
/// Handles are cheap to clone and share one underlying store.
///
/// # Concurrency
///
/// Writes are single-writer: a plain write runs alone, and a
/// [`TransactionScope`] holds write access from [`Engine::begin`] until it
/// commits or drops. Writers on other threads block until the scope closes;
/// a second `begin` on the owning thread reports
/// [`EngineError::TransactionActive`]. Reads never block on writers and
/// observe in-flight scope changes on the same store.
///
/// # Durability
///
/// With a store file, every committed write saves a snapshot (see
/// [`EngineConfig::flush_on_commit`]); the last handle to drop saves once
/// more. In-memory engines keep nothing.
///
/// # Example
///
/// ```
/// use rowlite_engine::{ColumnDef, ColumnMap, Engine};
///
/// let engine = Engine::in_memory();
/// engine.create_table(
///     "users",
///     &[
///         ColumnDef::new("id").auto_increment(),
///         ColumnDef::new("name").not_null(),
///     ],
/// )?;
///
/// let id = engine.insert("users", &ColumnMap::new().with("name", "Ann"))?;
/// let rows = engine.select("users", &["name"], Some("id = ?"), &[id.into()])?;
/// assert_eq!(rows.scalar_string("name").as_deref(), Some("Ann"));
/// # Ok::<(), rowlite_engine::EngineError>(())
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Opens a durable store with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `Locked` when another handle holds the store's lock and
    /// `Snapshot` when the file cannot be decoded.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::open_with_config(path, EngineConfig::default())
    }

    /// Opens a durable store.
    ///
    /// # Errors
    ///
    /// Returns `StoreMissing` when the file doesn't exist and
    /// `create_if_missing` is off, `Locked` when another handle holds the
    /// store's lock, and `Snapshot` when the file cannot be decoded.
    pub fn open_with_config(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<Self> {
        let path = path.as_ref();
        let file = StoreFile::open(path, config.create_if_missing)?;
        let state = file.load()?.unwrap_or_else(StoreState::new);
        debug!("opened store {}", path.display());

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                file: Some(file),
                state: RwLock::new(state),
                gate: Mutex::new(Gate::default()),
                gate_cv: Condvar::new(),
            }),
        })
    }

    /// Creates an ephemeral store for testing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config: EngineConfig::default(),
                file: None,
                state: RwLock::new(StoreState::new()),
                gate: Mutex::new(Gate::default()),
                gate_cv: Condvar::new(),
            }),
        }
    }

    /// The store file path, or `None` for in-memory engines.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.file.as_ref().map(StoreFile::path)
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Creates a table. Present tables are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateColumn` or `ConstraintViolation` when the column
    /// declarations are invalid.
    pub fn create_table(&self, name: &str, columns: &[ColumnDef]) -> EngineResult<()> {
        self.inner.mutate(|state| {
            if state.tables.contains_key(name) {
                return Ok(());
            }
            let table = Table::new(name, columns)?;
            state.tables.insert(name.to_string(), table);
            Ok(())
        })
    }

    /// Drops a table and its rows. Missing tables are a no-op.
    pub fn drop_table(&self, name: &str) -> EngineResult<()> {
        self.inner.mutate(|state| {
            state.tables.remove(name);
            Ok(())
        })
    }

    /// Adds a column to a live table.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` for unknown tables and `DuplicateColumn` /
    /// `ConstraintViolation` for invalid declarations.
    pub fn add_column(&self, table: &str, column: ColumnDef) -> EngineResult<()> {
        self.inner.mutate(|state| {
            let table = state
                .tables
                .get_mut(table)
                .ok_or_else(|| EngineError::table_not_found(table))?;
            table.add_column(column)
        })
    }

    /// Checks whether a table exists.
    #[must_use]
    pub fn table_exists(&self, name: &str) -> bool {
        self.inner.state.read().tables.contains_key(name)
    }

    /// All table names, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.inner.state.read().tables.keys().cloned().collect()
    }

    /// The declared columns of a table.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` for unknown tables.
    pub fn table_columns(&self, name: &str) -> EngineResult<Vec<ColumnDef>> {
        let state = self.inner.state.read();
        let table = state
            .tables
            .get(name)
            .ok_or_else(|| EngineError::table_not_found(name))?;
        Ok(table.columns.clone())
    }

    /// The stored schema version. Fresh stores report 0.
    #[must_use]
    pub fn schema_version(&self) -> i64 {
        self.inner.state.read().schema_version
    }

    /// Stamps the schema version.
    pub fn set_schema_version(&self, version: i64) -> EngineResult<()> {
        self.inner.mutate(|state| {
            state.schema_version = version;
            Ok(())
        })
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Inserts one row, returning the assigned key.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound`, `ColumnNotFound` for unknown payload
    /// columns, and `ConstraintViolation` on constraint failures.
    pub fn insert(&self, table: &str, row: &ColumnMap) -> EngineResult<i64> {
        self.inner.mutate(|state| {
            let table = state
                .tables
                .get_mut(table)
                .ok_or_else(|| EngineError::table_not_found(table))?;
            table.insert(row)
        })
    }

    /// Updates matching rows with the given changes, returning the count.
    ///
    /// The update is statement-atomic: a constraint failure on any matched
    /// row leaves the table untouched.
    ///
    /// # Errors
    ///
    /// Clause tails (`ORDER BY`/`LIMIT`) are a parse error here.
    pub fn update(
        &self,
        table: &str,
        changes: &ColumnMap,
        clause: Option<&str>,
        args: &[Value],
    ) -> EngineResult<usize> {
        let predicate = parse_write_clause(clause)?;
        predicate.check_args(args)?;
        self.inner.mutate(|state| {
            let table = state
                .tables
                .get_mut(table)
                .ok_or_else(|| EngineError::table_not_found(table))?;
            table.update(&predicate, args, changes)
        })
    }

    /// Deletes matching rows, returning the count.
    ///
    /// # Errors
    ///
    /// Clause tails (`ORDER BY`/`LIMIT`) are a parse error here.
    pub fn delete(&self, table: &str, clause: Option<&str>, args: &[Value]) -> EngineResult<usize> {
        let predicate = parse_write_clause(clause)?;
        predicate.check_args(args)?;
        self.inner.mutate(|state| {
            let table = state
                .tables
                .get_mut(table)
                .ok_or_else(|| EngineError::table_not_found(table))?;
            table.delete(&predicate, args)
        })
    }

    /// Selects rows under a clause.
    ///
    /// Projections are `*`, column names, or `COUNT`/`SUM`/`MAX`/`MIN`
    /// aggregate expressions; aggregate results are keyed by the expression
    /// text and collapse the result to one row.
    pub fn select(
        &self,
        table: &str,
        projections: &[&str],
        clause: Option<&str>,
        args: &[Value],
    ) -> EngineResult<Rows> {
        let predicate = Predicate::parse(clause)?;
        predicate.check_args(args)?;
        let state = self.inner.state.read();
        let table = state
            .tables
            .get(table)
            .ok_or_else(|| EngineError::table_not_found(table))?;
        query::run_select(table, projections, &predicate, args)
    }

    /// Runs a raw `SELECT <projections> FROM <table> [WHERE ...]` statement.
    ///
    /// This is the escape hatch for callers that assemble statements by
    /// hand; only the select form is understood.
    pub fn raw_query(&self, statement: &str, args: &[Value]) -> EngineResult<Rows> {
        let raw = query::parse_raw_select(statement)?;
        let projections: Vec<&str> = raw.projections.iter().map(String::as_str).collect();
        self.select(&raw.table, &projections, raw.clause.as_deref(), args)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Opens a transaction scope.
    ///
    /// The scope holds exclusive write access. `commit()` makes its writes
    /// permanent; dropping it uncommitted rolls every write back.
    ///
    /// # Errors
    ///
    /// Returns `TransactionActive` when the calling thread already has an
    /// open scope. Other threads block instead.
    pub fn begin(&self) -> EngineResult<TransactionScope> {
        let current = thread::current().id();
        {
            let mut gate = self.inner.gate.lock();
            loop {
                match gate.owner {
                    Some(id) if id == current => return Err(EngineError::TransactionActive),
                    Some(_) => self.inner.gate_cv.wait(&mut gate),
                    None => break,
                }
            }
            gate.owner = Some(current);
            gate.undo = Some(self.inner.state.read().clone());
        }
        Ok(TransactionScope {
            inner: Arc::clone(&self.inner),
            committed: false,
            _thread_bound: PhantomData,
        })
    }

    /// Executes a closure within a transaction scope.
    ///
    /// Commits when the closure returns `Ok`, rolls back when it returns
    /// `Err`.
    pub fn transaction<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Self) -> EngineResult<T>,
    {
        let scope = self.begin()?;
        let result = f(self)?;
        scope.commit()?;
        Ok(result)
    }

    /// Whether the calling thread currently holds the transaction scope.
    ///
    /// Callers that conditionally open scopes use this to join an already
    /// open one instead of tripping over `TransactionActive`.
    #[must_use]
    pub fn owns_scope(&self) -> bool {
        self.inner.gate.lock().owner == Some(thread::current().id())
    }

    /// Saves the snapshot now. A no-op for in-memory engines.
    pub fn flush(&self) -> EngineResult<()> {
        self.inner.flush_now()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path())
            .field("tables", &self.table_names())
            .finish_non_exhaustive()
    }
}

fn parse_write_clause(clause: Option<&str>) -> EngineResult<Predicate> {
    let predicate = Predicate::parse(clause)?;
    if predicate.has_tail() {
        return Err(EngineError::parse(
            "ORDER BY and LIMIT apply to queries only",
        ));
    }
    Ok(predicate)
}

impl EngineInner {
    /// Runs one write statement under the single-writer gate.
    ///
    /// Inside the calling thread's open scope the statement joins the
    /// scope; otherwise it takes the gate for its own duration and saves
    /// the snapshot on success.
    fn mutate<T>(&self, op: impl FnOnce(&mut StoreState) -> EngineResult<T>) -> EngineResult<T> {
        let session = self.write_session();
        let result = {
            let mut state = self.state.write();
            op(&mut state)
        }?;
        if session.is_some() {
            self.flush_if_configured()?;
        }
        Ok(result)
    }

    /// Claims the gate for a transient write, or returns `None` when the
    /// calling thread already owns the open scope.
    fn write_session(&self) -> Option<WriteSession<'_>> {
        let current = thread::current().id();
        let mut gate = self.gate.lock();
        loop {
            match gate.owner {
                Some(id) if id == current => return None,
                Some(_) => self.gate_cv.wait(&mut gate),
                None => break,
            }
        }
        gate.owner = Some(current);
        Some(WriteSession { inner: self })
    }

    fn release_gate(&self, rollback: bool) {
        let mut gate = self.gate.lock();
        let undo = gate.undo.take();
        if rollback {
            if let Some(undo) = undo {
                *self.state.write() = undo;
            }
        }
        gate.owner = None;
        drop(gate);
        self.gate_cv.notify_all();
    }

    fn flush_if_configured(&self) -> EngineResult<()> {
        if self.config.flush_on_commit {
            self.flush_now()
        } else {
            Ok(())
        }
    }

    fn flush_now(&self) -> EngineResult<()> {
        if let Some(file) = &self.file {
            let state = self.state.read();
            file.save(&state)?;
        }
        Ok(())
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if self.file.is_some() {
            let _ = self.flush_now();
        }
    }
}

/// A transient single-statement hold on the write gate.
struct WriteSession<'a> {
    inner: &'a EngineInner,
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        let mut gate = self.inner.gate.lock();
        gate.owner = None;
        drop(gate);
        self.inner.gate_cv.notify_all();
    }
}

/// An open transaction scope.
///
/// Writes made through the engine on the owning thread belong to the scope.
/// `commit()` makes them permanent; dropping the scope uncommitted restores
/// the pre-scope state. Scopes stay on the thread that opened them.
#[must_use = "an uncommitted scope rolls back on drop"]
pub struct TransactionScope {
    inner: Arc<EngineInner>,
    committed: bool,
    /// Keeps the scope on its opening thread.
    _thread_bound: PhantomData<*const ()>,
}

impl TransactionScope {
    /// Commits the scope's writes.
    ///
    /// # Errors
    ///
    /// Returns an error when saving the snapshot fails; the in-memory
    /// state stays committed in that case.
    pub fn commit(mut self) -> EngineResult<()> {
        self.committed = true;
        let flushed = self.inner.flush_if_configured();
        self.inner.release_gate(false);
        flushed
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if !self.committed {
            self.inner.release_gate(true);
        }
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}
