//! Strategy Errors
//!
//! `TigerStyle`: Explicit error types with context.
//!
//! `StrategyError` is `Clone` because the readiness result is resolved once
//! and observed by every caller of `ready()`. Backend driver errors are
//! flattened to messages at the boundary for the same reason.

use thiserror::Error;

/// Errors from storage strategy operations.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    /// Connect retries exhausted; wraps the final transport failure
    #[error("connection exhausted after {attempts} attempts: {message}")]
    ConnectionExhausted {
        /// Total attempts performed (initial + retries)
        attempts: u32,
        /// Final transport error
        message: String,
    },

    /// A create/read/update/delete call failed at the backend
    #[error("{operation} failed: {message}")]
    QueryFailed {
        /// Offending operation
        operation: String,
        /// Backend error
        message: String,
    },

    /// limit/offset/sort outside allowed ranges
    #[error("invalid query options: {message}")]
    InvalidQueryOptions {
        /// What was out of range
        message: String,
    },

    /// A registered per-collection schema rejected the payload
    #[error("validation failed for collection `{collection}`: {message}")]
    Validation {
        /// Collection whose schema rejected the record
        collection: String,
        /// Violation description
        message: String,
    },

    /// Operation attempted before the strategy reached `ready`
    #[error("strategy is not connected")]
    NotConnected,

    /// Operation attempted after `disconnect()`
    #[error("strategy has been disconnected")]
    Disconnected,

    /// Record or filter could not be serialized for the backend
    #[error("serialization error: {message}")]
    Serialization {
        /// What failed to serialize
        message: String,
    },

    /// Collection name the backend cannot address safely
    #[error("invalid collection name `{name}`")]
    InvalidCollection {
        /// Offending name
        name: String,
    },

    /// Deterministic fault injected by the mock engine
    #[error("injected fault: {message}")]
    Fault {
        /// Which fault fired
        message: String,
    },
}

impl StrategyError {
    /// Create a connection-exhausted error.
    #[must_use]
    pub fn connection_exhausted(attempts: u32, message: impl Into<String>) -> Self {
        Self::ConnectionExhausted {
            attempts,
            message: message.into(),
        }
    }

    /// Create a query error for the given operation.
    #[must_use]
    pub fn query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueryFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-options error.
    #[must_use]
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidQueryOptions {
            message: message.into(),
        }
    }

    /// Create a validation error for a collection.
    #[must_use]
    pub fn validation(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid-collection error.
    #[must_use]
    pub fn invalid_collection(name: impl Into<String>) -> Self {
        Self::InvalidCollection { name: name.into() }
    }

    /// Create an injected-fault error.
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }

    /// Check if this error class is transient (connect-level, retryable).
    ///
    /// Per-operation query errors are never retried by the core; the
    /// decision to retry those belongs to the caller.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fault { .. } | Self::NotConnected)
    }
}

/// Result type for strategy operations.
pub type StrategyResult<T> = Result<T, StrategyError>;
