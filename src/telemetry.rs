//! Logging Initialization
//!
//! `TigerStyle`: Optional observability with graceful fallback. Never panics
//! if a subscriber is already installed.
//!
//! ## Usage
//!
//! ```rust
//! polystore::telemetry::init_logging();
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG` - tracing filter directives (default: "info")
//!
//! Strategies emit diagnostics through the `tracing` facade: connect and
//! disconnect transitions, retry attempts, and every failed query with its
//! offending operation and filter.

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber.
///
/// Reads `RUST_LOG` for filter directives, falling back to `info`. Calling
/// this twice (or after the host application installed its own subscriber)
/// is a no-op rather than an error: the core only consumes the facade, it
/// does not own it.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed, keeping existing one");
    }
}
