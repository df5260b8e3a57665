//! Error types for the persistence core.

use thiserror::Error;

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in persistence operations.
///
/// The `try_*` surface returns these directly. The legacy surface collapses
/// everything except [`StoreError::Misuse`] to a neutral value after
/// logging; misuse panics there instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage engine error.
    #[error("engine error: {0}")]
    Engine(#[from] rowlite_engine::EngineError),

    /// The storage gateway did not answer its liveness probe.
    #[error("storage gateway is unreachable")]
    GatewayUnavailable,

    /// The storage gateway reported a fault.
    #[error("gateway error: {message}")]
    Gateway {
        /// Description of the gateway fault.
        message: String,
    },

    /// The operation is not available on this backend.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// The operation that was attempted.
        operation: String,
    },

    /// No controller is registered for the record type.
    #[error("no controller registered for {type_name}")]
    NoController {
        /// The record type that was dispatched.
        type_name: &'static str,
    },

    /// A typed read was attempted through an alias registration.
    #[error("typed reads are not routed through the alias for {type_name}")]
    AliasRead {
        /// The aliased record type.
        type_name: &'static str,
    },

    /// A row could not be converted into the record type.
    #[error("mapping error: {message}")]
    Mapping {
        /// Description of the conversion failure.
        message: String,
    },

    /// The caller violated an argument contract.
    #[error("misuse: {message}")]
    Misuse {
        /// Description of the violated contract.
        message: String,
    },

    /// A schema upgrade failed and the destructive fallback also failed.
    #[error("upgrade to version {version} failed: {message}")]
    UpgradeFailed {
        /// The version the upgrade targeted.
        version: i64,
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a gateway fault.
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates a no-controller error.
    #[must_use]
    pub fn no_controller(type_name: &'static str) -> Self {
        Self::NoController { type_name }
    }

    /// Creates an alias-read error.
    #[must_use]
    pub fn alias_read(type_name: &'static str) -> Self {
        Self::AliasRead { type_name }
    }

    /// Creates a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Creates a misuse error.
    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse {
            message: message.into(),
        }
    }

    /// Creates an upgrade-failed error.
    pub fn upgrade_failed(version: i64, message: impl Into<String>) -> Self {
        Self::UpgradeFailed {
            version,
            message: message.into(),
        }
    }

    /// Checks whether this error is an argument-contract violation.
    ///
    /// Misuse raises on the legacy surface instead of collapsing to a
    /// neutral value.
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Misuse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert() {
        let engine_err = rowlite_engine::EngineError::table_not_found("users");
        let err: StoreError = engine_err.into();
        assert!(matches!(err, StoreError::Engine(_)));
        assert!(!err.is_misuse());
    }

    #[test]
    fn misuse_is_classified() {
        assert!(StoreError::misuse("empty batch").is_misuse());
        assert!(!StoreError::gateway("down").is_misuse());
    }

    #[test]
    fn display_includes_context() {
        let err = StoreError::no_controller("User");
        assert!(err.to_string().contains("User"));
        let err = StoreError::upgrade_failed(3, "listener exploded");
        assert!(err.to_string().contains('3'));
    }
}
