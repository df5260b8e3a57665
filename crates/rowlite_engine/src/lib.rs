//! # Rowlite Engine
//!
//! Embedded row store for rowlite.
//!
//! This crate is the storage collaborator the persistence layer executes
//! against: tables with declared columns and constraints, clause-driven
//! reads and writes, single-writer transaction scopes, and an optional
//! snapshot file for durability.
//!
//! ## Design Principles
//!
//! - Dynamically typed rows: [`Value`] cells in [`ColumnMap`] rows
//! - One writer at a time; readers never block
//! - Statements are atomic; scopes make multi-statement writes atomic
//! - Durability by whole-store snapshot, not write-ahead logging
//!
//! ## Example
//!
//! ```rust
//! use rowlite_engine::{ColumnDef, ColumnMap, Engine};
//!
//! let engine = Engine::in_memory();
//! engine
//!     .create_table(
//!         "users",
//!         &[
//!             ColumnDef::new("id").auto_increment(),
//!             ColumnDef::new("name").not_null(),
//!         ],
//!     )
//!     .unwrap();
//!
//! let id = engine
//!     .insert("users", &ColumnMap::new().with("name", "Ann"))
//!     .unwrap();
//! let rows = engine
//!     .select("users", &["name"], Some("id = ?"), &[id.into()])
//!     .unwrap();
//! assert_eq!(rows.scalar_string("name").as_deref(), Some("Ann"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod engine;
mod error;
mod predicate;
mod query;
mod row;
mod snapshot;
mod table;
mod value;

pub use cursor::Rows;
pub use engine::{Engine, EngineConfig, TransactionScope};
pub use error::{EngineError, EngineResult};
pub use predicate::{Limit, OrderKey, Predicate};
pub use row::ColumnMap;
pub use table::ColumnDef;
pub use value::Value;
