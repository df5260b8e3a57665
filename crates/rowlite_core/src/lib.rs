//! # Rowlite
//!
//! Record persistence over the rowlite engine.
//!
//! Applications describe each stored type once with a [`RecordMapper`]
//! (table name, column shapes, row conversions) and register it in a
//! [`StoreRegistry`]. The registry routes typed operations to a
//! [`RecordController`] per type, keeps table schemas in step with the
//! declarations, replays [`UpgradeListener`]s when the configured version
//! moves, and mirrors the whole surface asynchronously through a worker
//! pool with owner-directed [callback delivery](DeliveryOptions).
//!
//! Storage is either a [`rowlite_engine::Engine`] in this process or a
//! [`StorageGateway`] to a store owned elsewhere; controllers cannot tell
//! the difference.
//!
//! ## Design Principles
//!
//! - Declare once: the mapper is the only place a table's shape is written
//! - Two surfaces: `try_*` returns [`StoreResult`], the legacy surface
//!   collapses faults to neutral values and panics on misuse
//! - Stored keys never change: update paths strip the key column
//! - Schema changes are additive except explicit rebuilds
//!
//! ## Example
//!
//! ```rust
//! use rowlite_core::{clause, StoreBuilder, StoreConfig, Value};
//! # use rowlite_core::{ColumnMap, ColumnSpec, LogicalType, RecordMapper};
//! # use rowlite_core::{StoreError, StoreResult};
//! # #[derive(Debug)]
//! # struct User { id: Option<i64>, name: String, age: i64 }
//! # struct UserMapper;
//! # impl RecordMapper for UserMapper {
//! #     type Record = User;
//! #     fn table_name(&self) -> &str { "users" }
//! #     fn columns(&self) -> Vec<ColumnSpec> {
//! #         vec![
//! #             ColumnSpec::new("id", LogicalType::Integer).auto_primary_key(),
//! #             ColumnSpec::new("name", LogicalType::Text).not_null(),
//! #             ColumnSpec::new("age", LogicalType::Integer),
//! #         ]
//! #     }
//! #     fn to_row(&self, r: &User) -> ColumnMap {
//! #         ColumnMap::new()
//! #             .with("id", r.id)
//! #             .with("name", r.name.as_str())
//! #             .with("age", r.age)
//! #     }
//! #     fn from_row(&self, row: &ColumnMap) -> StoreResult<User> {
//! #         Ok(User {
//! #             id: row.get_i64("id"),
//! #             name: row.get_string("name").ok_or_else(|| StoreError::mapping("name"))?,
//! #             age: row.get_i64("age").unwrap_or(0),
//! #         })
//! #     }
//! # }
//!
//! let store = StoreBuilder::new(StoreConfig::new("app"))
//!     .register(UserMapper)
//!     .build()?;
//!
//! store.try_insert(User { id: None, name: "Ann".into(), age: 30 })?;
//! store.try_insert(User { id: None, name: "Bea".into(), age: 31 })?;
//!
//! let adults = store.try_query_where::<User>(
//!     &clause::order_by_desc(&clause::ge("age"), "age"),
//!     &[Value::Integer(30)],
//! )?;
//! assert_eq!(adults.len(), 2);
//! assert_eq!(adults[0].name, "Bea");
//! # Ok::<(), rowlite_core::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod callback;
pub mod clause;
mod config;
mod controller;
mod error;
mod executor;
mod gateway;
mod mapper;
mod registry;
mod schema;
mod worker;

pub use callback::{DeliveryOptions, DeliveryQueue, LivenessGuard, LivenessWatch, StoreCallback};
pub use config::StoreConfig;
pub use controller::{Operation, RecordController, TransactionPolicy};
pub use error::{StoreError, StoreResult};
pub use executor::{BatchUpdate, EngineExecutor, GatewayExecutor, RecordExecutor};
pub use gateway::{BatchOp, LocalGateway, StorageGateway};
pub use mapper::RecordMapper;
pub use registry::{StoreBuilder, StoreRegistry, UpgradeListener};
pub use schema::{ColumnSpec, Constraint, LogicalType, SchemaDescriptor};

pub use rowlite_engine::{ColumnDef, ColumnMap, Engine, EngineConfig, EngineError, Rows, Value};
