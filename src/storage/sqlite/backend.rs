//! Embedded `SQLite` backend.

use super::autosave::Autosave;
use super::bootstrap::seed_if_empty;
use super::connection::{acquire_lock, configure_connection, open_in_memory};
use super::migrations::{ColumnMigration, MigrationReport, TRUSTCHECKER_MIGRATIONS, apply_column_migrations};
use super::schema::Schema;
use super::snapshot::{load_snapshot, write_snapshot};
use crate::config::{BackendKind, BootstrapConfig, StoreConfig};
use crate::models::{Row, Value};
use crate::observability::{record_operation_metrics, status_of};
use crate::storage::dialect::{Translation, preview};
use crate::storage::normalize::{NativeValue, normalize_row};
use crate::storage::readiness::{Readiness, ReadySignal};
use crate::storage::traits::SqlBackend;
use crate::{Error, Result};
use async_trait::async_trait;
use rusqlite::{Connection, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite";

/// What the embedded engine sets up before accepting traffic.
///
/// Passed in explicitly so tests can run the backend with a reduced schema,
/// a custom migration list, or no seed at all.
#[derive(Debug, Clone)]
pub struct EmbeddedSetup {
    /// Tables and indexes to create.
    pub schema: Schema,
    /// Columns to add to tables from older snapshots.
    pub migrations: Vec<ColumnMigration>,
    /// First-start seed. `None` skips seeding.
    pub bootstrap: Option<BootstrapConfig>,
}

impl EmbeddedSetup {
    /// The application schema, migrations and seed.
    #[must_use]
    pub fn trustchecker(bootstrap: BootstrapConfig) -> Self {
        Self {
            schema: Schema::TRUSTCHECKER,
            migrations: TRUSTCHECKER_MIGRATIONS.to_vec(),
            bootstrap: Some(bootstrap),
        }
    }

    /// No schema, no migrations, no seed.
    #[must_use]
    pub const fn bare() -> Self {
        Self {
            schema: Schema::EMPTY,
            migrations: Vec::new(),
            bootstrap: None,
        }
    }
}

struct Inner {
    conn: Mutex<Connection>,
    snapshot_path: Option<PathBuf>,
    readiness: Readiness,
}

/// In-process `SQLite` held in memory and flushed to a snapshot file.
///
/// # Concurrency Model
///
/// One connection behind a `Mutex`; every statement runs on the blocking
/// pool while holding it. Callers see sequential consistency.
///
/// # Durability
///
/// The snapshot is rewritten every autosave interval and once more on
/// [`SqlBackend::close`]. An ungraceful exit loses at most one interval of
/// writes.
pub struct EmbeddedBackend {
    inner: Arc<Inner>,
    autosave: Mutex<Option<Autosave>>,
}

impl std::fmt::Debug for EmbeddedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedBackend")
            .field("snapshot_path", &self.inner.snapshot_path)
            .field("ready", &self.inner.readiness.state())
            .finish_non_exhaustive()
    }
}

impl EmbeddedBackend {
    /// Opens the backend and starts initialization in the background.
    ///
    /// Returns immediately. Operations issued before initialization finishes
    /// wait for it.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a Tokio runtime or if `SQLite`
    /// cannot allocate the database.
    pub fn open(config: &StoreConfig, setup: EmbeddedSetup) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;

        let (signal, readiness) = Readiness::channel(BACKEND, config.ready_timeout());
        let inner = Arc::new(Inner {
            conn: Mutex::new(open_in_memory()?),
            snapshot_path: config.snapshot_path(),
            readiness,
        });

        let init_inner = Arc::clone(&inner);
        runtime.spawn_blocking(move || initialize(&init_inner, &setup, &signal));

        let autosave = config
            .autosave_interval()
            .map(|period| Autosave::spawn(Arc::downgrade(&inner), period, Inner::save));

        Ok(Self {
            inner,
            autosave: Mutex::new(autosave),
        })
    }

    /// Opens a backend with no snapshot, no autosave and the given setup.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub fn in_memory(setup: EmbeddedSetup) -> Result<Self> {
        Self::open(&StoreConfig::ephemeral(), setup)
    }

    /// The snapshot file, if persistence is on.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.inner.snapshot_path.as_deref()
    }

    /// Runs a column migration list against the live schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is not ready or a migration fails.
    pub async fn run_migrations(&self, migrations: Vec<ColumnMigration>) -> Result<MigrationReport> {
        self.with_conn("migrate", move |conn| apply_column_migrations(conn, &migrations))
            .await
    }

    /// Waits for readiness, then runs `f` on the blocking pool under the lock.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.readiness.wait().await?;
        let start = Instant::now();
        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = acquire_lock(&inner.conn);
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::OperationFailed {
            operation: format!("{BACKEND}_{operation}"),
            cause: e.to_string(),
        })
        .and_then(|r| r);

        record_operation_metrics(BACKEND, operation, start, status_of(&result));
        result
    }
}

impl Inner {
    async fn save(self: Arc<Self>) -> Result<()> {
        let Some(path) = self.snapshot_path.clone() else {
            return Ok(());
        };
        self.readiness.wait().await?;
        let start = Instant::now();
        let inner = Arc::clone(&self);
        let result = tokio::task::spawn_blocking(move || {
            let conn = acquire_lock(&inner.conn);
            write_snapshot(&conn, &path)
        })
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "sqlite_save".to_string(),
            cause: e.to_string(),
        })
        .and_then(|r| r);

        record_operation_metrics(BACKEND, "save", start, status_of(&result));
        result
    }
}

/// Loads, configures, creates, migrates and seeds, then resolves readiness.
fn initialize(inner: &Inner, setup: &EmbeddedSetup, signal: &ReadySignal) {
    let mut conn = acquire_lock(&inner.conn);
    match prepare_store(&mut conn, inner.snapshot_path.as_deref(), setup) {
        Ok(report) => {
            tracing::info!(
                backend = BACKEND,
                snapshot = ?inner.snapshot_path,
                columns_added = report.added.len(),
                "Embedded backend ready"
            );
            signal.ready();
        },
        Err(e) => {
            tracing::error!(backend = BACKEND, error = %e, "Embedded backend failed to initialize");
            signal.fail(e.to_string());
        },
    }
}

fn prepare_store(
    conn: &mut Connection,
    snapshot: Option<&Path>,
    setup: &EmbeddedSetup,
) -> Result<MigrationReport> {
    if let Some(path) = snapshot {
        load_snapshot(conn, path)?;
    }
    configure_connection(conn)?;
    setup.schema.create_tables(conn)?;
    let report = apply_column_migrations(conn, &setup.migrations)?;
    setup.schema.create_indexes(conn)?;
    if let Some(bootstrap) = &setup.bootstrap {
        seed_if_empty(conn, bootstrap)?;
    }
    Ok(report)
}

fn execution_error(sql: &str, e: &rusqlite::Error) -> Error {
    tracing::error!(backend = BACKEND, statement = %preview(sql), error = %e, "Statement failed");
    Error::Execution {
        statement: sql.to_string(),
        cause: e.to_string(),
    }
}

fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    let run = || -> rusqlite::Result<Vec<(Vec<String>, Vec<NativeValue>)>> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let width = columns.len();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let natives = (0..width)
                .map(|i| row.get_ref(i).map(NativeValue::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.push((columns.clone(), natives));
        }
        Ok(out)
    };

    run()
        .map_err(|e| execution_error(sql, &e))?
        .into_iter()
        .map(|(columns, natives)| normalize_row(columns, natives))
        .collect()
}

fn execute_statement(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64> {
    let run = || -> rusqlite::Result<u64> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        // Drain so statements with RETURNING or a SELECT still complete.
        while rows.next()?.is_some() {}
        Ok(u64::try_from(conn.changes()).unwrap_or_default())
    };
    run().map_err(|e| execution_error(sql, &e))
}

#[async_trait]
impl SqlBackend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn translate(&self, sql: &str) -> Translation {
        Translation::passthrough(sql)
    }

    async fn wait_ready(&self) -> Result<()> {
        self.inner.readiness.wait().await
    }

    #[instrument(skip(self, params), fields(operation = "query", backend = BACKEND))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn("query", move |conn| query_rows(conn, &sql, &params))
            .await
    }

    #[instrument(skip(self, params), fields(operation = "execute", backend = BACKEND))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn("execute", move |conn| execute_statement(conn, &sql, &params))
            .await
    }

    #[instrument(skip(self), fields(operation = "exec_batch", backend = BACKEND))]
    async fn exec_batch(&self, sql: &str) -> Result<()> {
        let batch = sql.to_string();
        self.with_conn("exec_batch", move |conn| {
            conn.execute_batch(&batch)
                .map_err(|e| execution_error(&batch, &e))
        })
        .await?;
        self.save().await
    }

    async fn save(&self) -> Result<()> {
        Arc::clone(&self.inner).save().await
    }

    async fn close(&self) -> Result<()> {
        let autosave = acquire_lock(&self.autosave).take();
        if let Some(autosave) = autosave {
            autosave.stop();
        }
        let result = self.save().await;
        tracing::info!(backend = BACKEND, "Embedded backend closed");
        result
    }
}

impl Drop for EmbeddedBackend {
    fn drop(&mut self) {
        if let Some(autosave) = acquire_lock(&self.autosave).take() {
            autosave.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[tokio::test]
    async fn test_operations_wait_for_initialization() {
        let backend = EmbeddedBackend::in_memory(EmbeddedSetup::trustchecker(BootstrapConfig::default()))
            .unwrap();
        // Issued immediately; must be held until the schema exists.
        let admin = backend
            .get("SELECT username, role FROM users WHERE username = ?", &params!["admin"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.get("role"), Some(&Value::Text("admin".into())));
    }

    #[tokio::test]
    async fn test_get_all_run_shapes() {
        let backend = EmbeddedBackend::in_memory(EmbeddedSetup::bare()).unwrap();
        backend
            .run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, active INTEGER)", &[])
            .await
            .unwrap();
        let changed = backend
            .run("INSERT INTO t (name, active) VALUES (?, ?), (?, ?)", &params!["a", true, "b", false])
            .await
            .unwrap();
        assert_eq!(changed, 2);

        assert!(backend.get("SELECT * FROM t WHERE id = ?", &params![99]).await.unwrap().is_none());
        assert!(backend.all("SELECT * FROM t WHERE id > ?", &params![99]).await.unwrap().is_empty());

        let rows = backend.all("SELECT name, active FROM t ORDER BY id", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("active"), Some(&Value::Integer(1)));
        assert!(!rows[1].get_as::<bool>("active").unwrap());
    }

    #[tokio::test]
    async fn test_engine_error_surfaces_with_statement() {
        let backend = EmbeddedBackend::in_memory(EmbeddedSetup::bare()).unwrap();
        let err = backend.all("SELECT * FROM missing", &[]).await.unwrap_err();
        match err {
            Error::Execution { statement, cause } => {
                assert_eq!(statement, "SELECT * FROM missing");
                assert!(cause.contains("no such table"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_insert_returning_via_get() {
        let backend = EmbeddedBackend::in_memory(EmbeddedSetup::bare()).unwrap();
        backend
            .exec_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
            .await
            .unwrap();
        let row = backend
            .get("INSERT INTO t (name) VALUES (?) RETURNING id", &params!["x"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_fails_readiness() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("trustchecker.db"), b"definitely not sqlite").unwrap();
        let config = StoreConfig::default().with_data_dir(dir.path());
        let backend = EmbeddedBackend::open(&config, EmbeddedSetup::bare()).unwrap();
        assert!(matches!(backend.wait_ready().await, Err(Error::Unavailable { .. })));
        assert!(matches!(backend.all("SELECT 1", &[]).await, Err(Error::Unavailable { .. })));
    }

    #[test]
    fn test_open_outside_runtime_is_an_error() {
        let err = EmbeddedBackend::in_memory(EmbeddedSetup::bare()).unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
    }
}
