//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `READ_LIMIT_COUNT_MAX` (not `MAX_READ_LIMIT`)
//!
//! Every constant includes units in the name:
//! - _`COUNT_MAX` for quantity limits
//! - _`MS_BASE/MAX` for millisecond durations
//! - _`DEFAULT` for fallback values

// =============================================================================
// Connection Retry Limits
// =============================================================================

/// Maximum number of retry attempts after the initial connect attempt
pub const STORAGE_RETRY_COUNT_MAX: u32 = 3;

/// Base delay between connect attempts in milliseconds
pub const STORAGE_RETRY_DELAY_MS_BASE: u64 = 100;

/// Maximum delay between connect attempts in milliseconds
pub const STORAGE_RETRY_DELAY_MS_MAX: u64 = 5000;

/// Multiplier applied to the delay after each failed attempt
pub const STORAGE_RETRY_BACKOFF_FACTOR: f64 = 2.0;

// =============================================================================
// Query Limits
// =============================================================================

/// Maximum number of records a single read may request
pub const READ_LIMIT_COUNT_MAX: usize = 1000;

/// Maximum length of a collection name
pub const COLLECTION_NAME_BYTES_MAX: usize = 128;

// =============================================================================
// Health Check Limits
// =============================================================================

/// Timeout for a single health probe in milliseconds
pub const HEALTH_PROBE_TIMEOUT_MS: u64 = 2000;

// =============================================================================
// Engine Selection
// =============================================================================

/// Environment variable naming the storage engine, read once at startup
pub const ENGINE_ENV_VAR: &str = "STORAGE_ENGINE";

/// Prefix for dynamically registered engine tags
pub const ENGINE_CUSTOM_PREFIX: &str = "custom:";

// =============================================================================
// Builtin Engine Defaults
// =============================================================================

/// Default connection pool size for the relational engine
pub const RELATIONAL_POOL_CONNECTIONS_COUNT_DEFAULT: u64 = 10;

/// Default database name for the document engine
pub const DOCUMENT_DATABASE_NAME_DEFAULT: &str = "app";

/// Default database file path for the embedded engine
pub const EMBEDDED_DB_PATH_DEFAULT: &str = "./data/polystore.redb";

// =============================================================================
// Tests
// =============================================================================
