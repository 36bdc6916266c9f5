//! Client/server `PostgreSQL` backend.

use super::pool::{create_pool, pool_error};
use super::row::decode_row;
use crate::config::{BackendKind, StoreConfig};
use crate::models::{Row, Value};
use crate::observability::{record_operation_metrics, status_of};
use crate::storage::dialect::{PostgresDialect, SqlRewriter, Translation, preview};
use crate::storage::readiness::Readiness;
use crate::storage::traits::SqlBackend;
use crate::{Error, Result};
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_postgres::types::ToSql;
use tracing::instrument;

const BACKEND: &str = "postgresql";

/// `PostgreSQL` behind a bounded connection pool.
///
/// Statements arrive in `SQLite` dialect and are rewritten by the configured
/// [`SqlRewriter`]. Schema statements are skipped: the server's schema is
/// owned by external migrations.
///
/// Readiness is a single `SELECT 1` probe started at construction. If it
/// fails, every operation reports [`Error::Unavailable`].
pub struct PostgresBackend {
    pool: Pool,
    rewriter: Arc<dyn SqlRewriter>,
    readiness: Readiness,
    pool_timeout: Duration,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PostgresBackend")
            .field("pool_size", &status.size)
            .field("pool_max_size", &status.max_size)
            .field("ready", &self.readiness.state())
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// Connects with the default dialect and the configured conflict targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or invalid, the pool cannot be
    /// built, or no Tokio runtime is running.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let dialect = PostgresDialect::with_conflict_targets(config.conflict_targets.clone());
        Self::with_rewriter(config, Arc::new(dialect))
    }

    /// Connects with a caller-supplied rewriter.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub fn with_rewriter(config: &StoreConfig, rewriter: Arc<dyn SqlRewriter>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::OperationFailed {
            operation: "open_postgres".to_string(),
            cause: e.to_string(),
        })?;
        let pool = create_pool(config)?;
        let pool_timeout = config.pool_timeout();
        let (signal, readiness) = Readiness::channel(BACKEND, config.ready_timeout());

        let probe_pool = pool.clone();
        runtime.spawn(async move {
            match probe(&probe_pool, pool_timeout).await {
                Ok(()) => {
                    tracing::info!(backend = BACKEND, "Client/server backend ready");
                    signal.ready();
                },
                Err(e) => {
                    tracing::error!(backend = BACKEND, error = %e, "Readiness probe failed");
                    signal.fail(e.to_string());
                },
            }
        });

        Ok(Self {
            pool,
            rewriter,
            readiness,
            pool_timeout,
        })
    }

    async fn client(&self) -> Result<Object> {
        self.readiness.wait().await?;
        self.pool
            .get()
            .await
            .map_err(|e| pool_error(e, self.pool_timeout))
    }

    async fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let client = self.client().await?;
        let stmt = client
            .prepare_cached(sql)
            .await
            .map_err(|e| execution_error(sql, &e))?;
        let rows = client
            .query(&stmt, &param_refs(params))
            .await
            .map_err(|e| execution_error(sql, &e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn modify(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let client = self.client().await?;
        let stmt = client
            .prepare_cached(sql)
            .await
            .map_err(|e| execution_error(sql, &e))?;
        client
            .execute(&stmt, &param_refs(params))
            .await
            .map_err(|e| execution_error(sql, &e))
    }
}

async fn probe(pool: &Pool, timeout: Duration) -> Result<()> {
    let client = pool.get().await.map_err(|e| pool_error(e, timeout))?;
    client
        .simple_query("SELECT 1")
        .await
        .map(|_| ())
        .map_err(|e| Error::Unavailable {
            backend: BACKEND,
            cause: e.to_string(),
        })
}

fn execution_error(sql: &str, e: &tokio_postgres::Error) -> Error {
    let cause = e
        .as_db_error()
        .map_or_else(|| e.to_string(), ToString::to_string);
    tracing::error!(backend = BACKEND, statement = %preview(sql), error = %cause, "Statement failed");
    Error::Execution {
        statement: sql.to_string(),
        cause,
    }
}

fn param_refs(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl SqlBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn translate(&self, sql: &str) -> Translation {
        self.rewriter.rewrite(sql)
    }

    async fn wait_ready(&self) -> Result<()> {
        self.readiness.wait().await
    }

    #[instrument(skip(self, params), fields(operation = "query", backend = BACKEND))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let start = Instant::now();
        let result = self.fetch(sql, params).await;

        record_operation_metrics(BACKEND, "query", start, status_of(&result));
        result
    }

    #[instrument(skip(self, params), fields(operation = "execute", backend = BACKEND))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let start = Instant::now();
        let result = self.modify(sql, params).await;

        record_operation_metrics(BACKEND, "execute", start, status_of(&result));
        result
    }

    async fn exec_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!(backend = BACKEND, statement = %preview(sql), "Batch skipped; schema is managed by migrations");
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        tracing::info!(backend = BACKEND, "Client/server backend closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dialect::NoOpReason;

    fn unreachable() -> StoreConfig {
        let mut config = StoreConfig::ephemeral().with_database_url("postgresql://trust@127.0.0.1:1/trust");
        config.pool_timeout_secs = 1;
        config.ready_timeout_secs = 5;
        config
    }

    #[tokio::test]
    async fn test_schema_statements_succeed_without_a_server() {
        let backend = PostgresBackend::connect(&unreachable()).unwrap();
        assert_eq!(
            backend.translate("CREATE INDEX IF NOT EXISTS idx_x ON t(c)"),
            Translation::NoOp(NoOpReason::SchemaDefinition)
        );
        assert_eq!(backend.run("CREATE INDEX IF NOT EXISTS idx_x ON t(c)", &[]).await.unwrap(), 0);
        assert!(backend.get("PRAGMA foreign_keys = ON", &[]).await.unwrap().is_none());
        assert!(backend.all("ALTER TABLE t ADD COLUMN c TEXT", &[]).await.unwrap().is_empty());
        backend.exec_batch("CREATE TABLE t (id TEXT)").await.unwrap();
        backend.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_probe_makes_backend_unavailable() {
        let backend = PostgresBackend::connect(&unreachable()).unwrap();
        let err = backend.all("SELECT 1", &[]).await.unwrap_err();
        assert!(
            matches!(err, Error::Unavailable { .. } | Error::Timeout { .. }),
            "unexpected error: {err}"
        );
        backend.close().await.unwrap();
    }

    #[test]
    fn test_connect_requires_runtime() {
        assert!(matches!(
            PostgresBackend::connect(&unreachable()),
            Err(Error::OperationFailed { .. })
        ));
    }
}
