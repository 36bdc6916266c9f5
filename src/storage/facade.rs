//! The single entry point application code talks to.

use crate::config::{BackendKind, BootstrapConfig, StoreConfig};
use crate::models::{Row, Value};
use crate::storage::dialect::Translation;
use crate::storage::postgres::PostgresBackend;
use crate::storage::sqlite::{EmbeddedBackend, EmbeddedSetup};
use crate::storage::traits::{PreparedStatement, SqlBackend};
use crate::Result;
use std::sync::Arc;

/// A connected store.
///
/// The backend is chosen once in [`Database::connect`]; every method after
/// that forwards to it unchanged.
#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn SqlBackend>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl Database {
    /// Builds the backend selected by `config`.
    ///
    /// Returns as soon as the backend is constructed. Calls made before it is
    /// ready wait for readiness.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be constructed, including
    /// [`Error::FeatureNotEnabled`](crate::Error::FeatureNotEnabled) when the
    /// client/server backend is selected without the `postgres` feature.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let kind = BackendKind::select(config);
        tracing::info!(backend = %kind, "Connecting store");
        let backend: Arc<dyn SqlBackend> = match kind {
            BackendKind::Postgres => Arc::new(PostgresBackend::connect(config)?),
            BackendKind::Embedded => Arc::new(EmbeddedBackend::open(
                config,
                EmbeddedSetup::trustchecker(config.bootstrap.clone()),
            )?),
        };
        Ok(Self { backend })
    }

    /// Wraps an already constructed backend.
    #[must_use]
    pub fn from_backend(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    /// Opens an embedded store with no snapshot file, for tests and tools.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a Tokio runtime.
    pub fn in_memory(bootstrap: Option<BootstrapConfig>) -> Result<Self> {
        let setup = bootstrap.map_or_else(
            || EmbeddedSetup {
                bootstrap: None,
                ..EmbeddedSetup::trustchecker(BootstrapConfig::default())
            },
            EmbeddedSetup::trustchecker,
        );
        Ok(Self::from_backend(Arc::new(EmbeddedBackend::in_memory(setup)?)))
    }

    /// Which backend is active.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// The active backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.backend
    }

    /// Shows what the active backend would run for `sql`.
    #[must_use]
    pub fn translate(&self, sql: &str) -> Translation {
        self.backend.translate(sql)
    }

    /// Waits until the backend is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization failed or timed out.
    pub async fn ready(&self) -> Result<()> {
        self.backend.wait_ready().await
    }

    /// Fetches the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for a rejected statement.
    pub async fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.backend.get(sql, params).await
    }

    /// Fetches all rows.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for a rejected statement.
    pub async fn all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.backend.all(sql, params).await
    }

    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for a rejected statement.
    pub async fn run(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.backend.run(sql, params).await
    }

    /// Translates once and returns a handle that can be run many times.
    #[must_use]
    pub fn prepare(&self, sql: &str) -> PreparedStatement<Arc<dyn SqlBackend>> {
        PreparedStatement::new(Arc::clone(&self.backend), sql)
    }

    /// Runs a multi-statement batch.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for a rejected statement.
    pub async fn exec(&self, sql: &str) -> Result<()> {
        self.backend.exec_batch(sql).await
    }

    /// Flushes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Durability`](crate::Error::Durability) if the snapshot
    /// cannot be written.
    pub async fn save(&self) -> Result<()> {
        self.backend.save().await
    }

    /// Round-trips `SELECT 1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    /// Flushes and releases the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[tokio::test]
    async fn test_embedded_selected_without_url() {
        let db = Database::connect(&StoreConfig::ephemeral()).unwrap();
        assert_eq!(db.kind(), BackendKind::Embedded);
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_prepared_handle_outlives_borrow() {
        let db = Database::in_memory(None).unwrap();
        let insert = db.prepare("INSERT INTO organizations (id, name, slug) VALUES (?, ?, ?)");
        insert.run(&params!["o1", "One", "one"]).await.unwrap();
        insert.run(&params!["o2", "Two", "two"]).await.unwrap();

        let count = db
            .get("SELECT COUNT(*) AS n FROM organizations", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(count.get_as::<i64>("n").unwrap(), 2);
        assert!(db.all("SELECT * FROM users", &[]).await.unwrap().is_empty());
    }

    #[cfg(feature = "postgres")]
    #[tokio::test]
    async fn test_postgres_selected_with_url() {
        let config = StoreConfig::ephemeral().with_database_url("postgresql://u@127.0.0.1:1/db");
        let db = Database::connect(&config).unwrap();
        assert_eq!(db.kind(), BackendKind::Postgres);
        assert!(db.translate("PRAGMA foreign_keys = ON").is_no_op());
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_postgres_requires_feature() {
        let config = StoreConfig::ephemeral().with_database_url("postgresql://u@127.0.0.1:1/db");
        assert!(matches!(
            Database::connect(&config),
            Err(crate::Error::FeatureNotEnabled(_))
        ));
    }
}
