//! Config Errors
//!
//! `TigerStyle`: Explicit error types with context.

use thiserror::Error;

use super::validator::ValidationReport;

/// Errors from the configuration subsystem.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Requested module has no registered field schema
    #[error("no config schema registered for module `{module}`")]
    SchemaMissing {
        /// Module name that was requested
        module: String,
    },

    /// One or more fields failed type or requirement checks
    #[error("config validation failed:\n{report}")]
    ValidationFailed {
        /// Every violated field
        report: ValidationReport,
    },
}

impl ConfigError {
    /// Create a missing-schema error.
    #[must_use]
    pub fn schema_missing(module: impl Into<String>) -> Self {
        Self::SchemaMissing {
            module: module.into(),
        }
    }

    /// Create a validation-failed error carrying the full report.
    #[must_use]
    pub fn validation_failed(report: ValidationReport) -> Self {
        Self::ValidationFailed { report }
    }
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
