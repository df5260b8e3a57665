//! Store construction and open-time versioning.

use std::sync::Arc;

use rowlite_engine::{Engine, EngineConfig};
use tracing::info;

use super::{Backend, StoreRegistry, UpgradeListener};
use crate::config::StoreConfig;
use crate::controller::TransactionPolicy;
use crate::error::{StoreError, StoreResult};
use crate::gateway::StorageGateway;
use crate::mapper::RecordMapper;

enum BackendSource {
    /// Resolved from the configuration: a store file when a directory is
    /// set, in-memory otherwise.
    Configured,
    Engine(Engine),
    Gateway(Arc<dyn StorageGateway>),
}

type SetupStep = Box<dyn FnOnce(&StoreRegistry) -> StoreResult<()> + Send>;

/// Builds a [`StoreRegistry`], opens its backend and brings the schema to
/// the configured version.
///
/// Mappers, aliases and upgrade listeners are collected first and applied
/// in registration order when [`StoreBuilder::build`] runs, so a listener
/// registered for version 3 sees every table the mappers declare. Register
/// a type before any alias that targets it.
///
/// ```
/// use rowlite_core::{StoreBuilder, StoreConfig};
/// # use rowlite_core::{ColumnMap, ColumnSpec, LogicalType, RecordMapper};
/// # use rowlite_core::{StoreError, StoreResult};
/// # struct User { id: Option<i64>, name: String }
/// # struct UserMapper;
/// # impl RecordMapper for UserMapper {
/// #     type Record = User;
/// #     fn table_name(&self) -> &str { "users" }
/// #     fn columns(&self) -> Vec<ColumnSpec> {
/// #         vec![
/// #             ColumnSpec::new("id", LogicalType::Integer).auto_primary_key(),
/// #             ColumnSpec::new("name", LogicalType::Text).not_null(),
/// #         ]
/// #     }
/// #     fn to_row(&self, r: &User) -> ColumnMap {
/// #         ColumnMap::new().with("id", r.id).with("name", r.name.as_str())
/// #     }
/// #     fn from_row(&self, row: &ColumnMap) -> StoreResult<User> {
/// #         Ok(User {
/// #             id: row.get_i64("id"),
/// #             name: row.get_string("name").ok_or_else(|| StoreError::mapping("name"))?,
/// #         })
/// #     }
/// # }
///
/// let store = StoreBuilder::new(StoreConfig::new("demo").version(1))
///     .register(UserMapper)
///     .build()?;
/// let key = store.try_insert(User { id: None, name: "Ann".into() })?;
/// assert!(store.try_has::<User>(key.into())?);
/// # Ok::<(), rowlite_core::StoreError>(())
/// ```
pub struct StoreBuilder {
    config: StoreConfig,
    backend: BackendSource,
    setup: Vec<SetupStep>,
    listeners: Vec<(i64, Arc<dyn UpgradeListener>)>,
}

impl StoreBuilder {
    /// Starts a builder over the given configuration.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            backend: BackendSource::Configured,
            setup: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Uses an already opened engine instead of the configured path.
    #[must_use]
    pub fn engine(mut self, engine: Engine) -> Self {
        self.backend = BackendSource::Engine(engine);
        self
    }

    /// Routes every operation through a gateway to a store owned
    /// elsewhere.
    ///
    /// The gateway host keeps schema ownership: no tables are created and
    /// no versioning runs on this side.
    #[must_use]
    pub fn gateway(mut self, gateway: impl StorageGateway + 'static) -> Self {
        self.backend = BackendSource::Gateway(Arc::new(gateway));
        self
    }

    /// Queues a mapper registration with the default transaction policy.
    #[must_use]
    pub fn register<M: RecordMapper>(self, mapper: M) -> Self {
        self.register_with_policy(mapper, TransactionPolicy::default())
    }

    /// Queues a mapper registration with an explicit transaction policy.
    #[must_use]
    pub fn register_with_policy<M: RecordMapper>(
        mut self,
        mapper: M,
        policy: TransactionPolicy,
    ) -> Self {
        self.setup.push(Box::new(move |registry| {
            registry.register_inner(mapper, policy, false)
        }));
        self
    }

    /// Queues an alias of `S` onto the registered type `B`.
    #[must_use]
    pub fn register_alias<S, B>(mut self) -> Self
    where
        S: Into<B> + Send + 'static,
        B: Send + 'static,
    {
        self.setup
            .push(Box::new(|registry| registry.register_alias::<S, B>()));
        self
    }

    /// Queues an upgrade listener for one target version.
    #[must_use]
    pub fn add_upgrade_listener(
        mut self,
        version: i64,
        listener: impl UpgradeListener + 'static,
    ) -> Self {
        self.listeners.push((version, Arc::new(listener)));
        self
    }

    /// Opens the backend, applies every queued registration and brings
    /// the schema to the configured version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Misuse`] when nothing was registered or the
    /// configured version is below 1, engine errors when the store file
    /// cannot be opened, and [`StoreError::UpgradeFailed`] when upgrade
    /// recovery fails.
    pub fn build(self) -> StoreResult<StoreRegistry> {
        if self.setup.is_empty() {
            return Err(StoreError::misuse("a store needs at least one mapper"));
        }
        if self.config.version < 1 {
            return Err(StoreError::misuse("store versions start at 1"));
        }

        let backend = match self.backend {
            BackendSource::Configured => match self.config.store_path() {
                Some(path) => {
                    info!("opening store at {}", path.display());
                    let engine_config =
                        EngineConfig::new().flush_on_commit(self.config.flush_on_commit);
                    Backend::Direct(Engine::open_with_config(path, engine_config)?)
                }
                None => Backend::Direct(Engine::in_memory()),
            },
            BackendSource::Engine(engine) => Backend::Direct(engine),
            BackendSource::Gateway(gateway) => Backend::Gateway(gateway),
        };

        let registry = StoreRegistry::new(backend, self.config);
        for step in self.setup {
            step(&registry)?;
        }
        for (version, listener) in self.listeners {
            registry.add_upgrade_listener_arc(version, listener)?;
        }
        registry.apply_versioning()?;
        Ok(registry)
    }
}

impl std::fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            BackendSource::Configured => "configured",
            BackendSource::Engine(_) => "engine",
            BackendSource::Gateway(_) => "gateway",
        };
        f.debug_struct("StoreBuilder")
            .field("name", &self.config.name)
            .field("version", &self.config.version)
            .field("backend", &backend)
            .field("registrations", &self.setup.len())
            .finish_non_exhaustive()
    }
}
