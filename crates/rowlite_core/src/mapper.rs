//! The mapping contract between record types and stored rows.

use rowlite_engine::ColumnMap;

use crate::error::StoreResult;
use crate::schema::{ColumnSpec, SchemaDescriptor};

/// Maps one record type to and from its table.
///
/// A mapper declares the table name and column shapes once; the registry
/// derives the table schema, the canonical key predicate and the
/// reconciliation plan from those declarations. `to_row` and `from_row`
/// carry the payload in both directions.
///
/// # Example
///
/// ```
/// use rowlite_core::{ColumnSpec, LogicalType, RecordMapper, StoreError, StoreResult};
/// use rowlite_engine::ColumnMap;
///
/// struct User {
///     id: Option<i64>,
///     name: String,
/// }
///
/// struct UserMapper;
///
/// impl RecordMapper for UserMapper {
///     type Record = User;
///
///     fn table_name(&self) -> &str {
///         "users"
///     }
///
///     fn columns(&self) -> Vec<ColumnSpec> {
///         vec![
///             ColumnSpec::new("id", LogicalType::Integer).auto_primary_key(),
///             ColumnSpec::new("name", LogicalType::Text).not_null(),
///         ]
///     }
///
///     fn to_row(&self, record: &User) -> ColumnMap {
///         ColumnMap::new()
///             .with("id", record.id)
///             .with("name", record.name.as_str())
///     }
///
///     fn from_row(&self, row: &ColumnMap) -> StoreResult<User> {
///         Ok(User {
///             id: row.get("id").and_then(|v| v.coerce_i64()),
///             name: row
///                 .get("name")
///                 .and_then(|v| v.as_text())
///                 .ok_or_else(|| StoreError::mapping("users row without a name"))?
///                 .to_string(),
///         })
///     }
/// }
/// ```
pub trait RecordMapper: Send + Sync + 'static {
    /// The record type this mapper handles.
    type Record: Send + 'static;

    /// The table the records live in.
    fn table_name(&self) -> &str;

    /// Column declarations, in table order.
    fn columns(&self) -> Vec<ColumnSpec>;

    /// Converts a record into a row payload.
    ///
    /// Include the primary key when the record carries one; write paths
    /// strip it where the store assigns keys itself.
    fn to_row(&self, record: &Self::Record) -> ColumnMap;

    /// Converts a row back into a record.
    ///
    /// # Errors
    ///
    /// Implementations report rows that cannot represent the record as
    /// [`StoreError::Mapping`](crate::StoreError::Mapping).
    fn from_row(&self, row: &ColumnMap) -> StoreResult<Self::Record>;

    /// Builds the validated schema descriptor for this mapper.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Misuse`](crate::StoreError::Misuse) when the
    /// declarations are contradictory, for example two primary keys.
    fn descriptor(&self) -> StoreResult<SchemaDescriptor> {
        SchemaDescriptor::new(self.table_name(), self.columns())
    }
}
