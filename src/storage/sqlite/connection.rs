//! Connection handling for the embedded engine.
//!
//! One in-memory connection behind a `Mutex`: the engine is single-writer and
//! every statement is serialized through the lock.

use crate::models::Value;
use crate::{Error, Result};
use rusqlite::Connection;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use std::sync::{Mutex, MutexGuard};

/// Acquires the connection lock, recovering from poison.
///
/// A panic inside a previous critical section leaves the connection usable,
/// so the inner value is taken and the event is logged and counted.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Opens the in-memory engine.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if `SQLite` cannot allocate the database.
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(|e| Error::OperationFailed {
        operation: "open_sqlite".to_string(),
        cause: e.to_string(),
    })
}

/// Applies session pragmas.
///
/// - **`cache_size`**: 20 MB page cache
/// - **`temp_store`**: temporary tables in memory
/// - **`busy_timeout`**: wait 5 seconds on a lock instead of failing
///
/// Journal and sync pragmas do nothing for an in-memory database and are not
/// set.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a pragma is rejected.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    for (name, value) in [
        ("cache_size", "-20000"),
        ("temp_store", "MEMORY"),
        ("busy_timeout", "5000"),
    ] {
        conn.pragma_update(None, name, value)
            .map_err(|e| Error::OperationFailed {
                operation: format!("pragma_{name}"),
                cause: e.to_string(),
            })?;
    }
    Ok(())
}

/// Double-quotes an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Self::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}
