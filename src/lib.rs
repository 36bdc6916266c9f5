//! # trustdb
//!
//! Persistence layer for TrustChecker.
//!
//! Exposes one asynchronous `get` / `all` / `run` / `prepare` contract and routes
//! it to exactly one of two interchangeable engines, chosen once at startup:
//!
//! - **Embedded** (`SQLite`): in-process, single writer, owns its schema, flushed
//!   to a snapshot file on a fixed interval.
//! - **Client/server** (PostgreSQL): pooled connections, schema owned by external
//!   migrations, every statement rewritten from the `SQLite` dialect first.
//!
//! ## Example
//!
//! ```rust,ignore
//! use trustdb::{Database, StoreConfig, params};
//!
//! let db = Database::connect(&StoreConfig::from_env())?;
//! db.ready().await?;
//!
//! db.run(
//!     "INSERT OR IGNORE INTO users (id, email) VALUES (?, ?)",
//!     &params!["u1", "a@x.com"],
//! )
//! .await?;
//! let recent = db
//!     .all("SELECT * FROM sessions WHERE revoked = 0", &[])
//!     .await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;
use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod observability;
pub mod storage;

// Re-exports for convenience
pub use config::{BackendKind, BootstrapConfig, StoreConfig};
pub use models::{FromValue, Row, Value};
pub use storage::dialect::{NoOpReason, PostgresDialect, SqlRewriter, Translation, translate};
pub use storage::{Database, PreparedStatement, SqlBackend};

/// Error type for trustdb operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Parameter count mismatch, unsupported URL scheme, bad CLI parameter |
/// | `OperationFailed` | File I/O, pool construction, config parsing, runtime setup |
/// | `Execution` | The engine rejected a statement (carries the executed text) |
/// | `Timeout` | Pool acquisition or readiness wait exceeded its bound |
/// | `Unavailable` | The backend's startup probe failed |
/// | `Durability` | An explicit snapshot flush failed |
/// | `FeatureNotEnabled` | PostgreSQL requested without the `postgres` feature |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - The parameter list length differs from the statement's placeholder count
    /// - A database URL uses an unknown scheme
    /// - A CLI parameter cannot be parsed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An infrastructure operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The engine rejected a statement.
    ///
    /// The statement is the text actually sent to the engine, i.e. after
    /// dialect translation on the client/server backend. Never retried here:
    /// statements may not be idempotent.
    #[error("statement failed: {cause} [sql: {statement}]")]
    Execution {
        /// The executed statement text.
        statement: String,
        /// The engine's error message.
        cause: String,
    },

    /// A bounded wait expired.
    #[error("operation '{operation}' timed out after {waited:?}")]
    Timeout {
        /// The operation that was waiting.
        operation: String,
        /// How long it waited.
        waited: Duration,
    },

    /// The backend never became ready.
    #[error("{backend} backend unavailable: {cause}")]
    Unavailable {
        /// Backend name.
        backend: &'static str,
        /// Why the startup probe failed.
        cause: String,
    },

    /// Writing the embedded snapshot failed.
    #[error("failed to persist snapshot to {path}: {cause}")]
    Durability {
        /// Snapshot path.
        path: String,
        /// The underlying cause.
        cause: String,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

/// Result type alias for trustdb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Builds an ordered parameter list from heterogeneous values.
///
/// ```rust
/// use trustdb::{Value, params};
///
/// let p = params!["u1", 42, true, None::<String>];
/// assert_eq!(p[1], Value::Integer(42));
/// assert_eq!(p[3], Value::Null);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}
