//! SQL backend trait and reusable statements.

use crate::config::BackendKind;
use crate::models::{Row, Value};
use crate::storage::dialect::Translation;
use crate::{Error, Result};
use async_trait::async_trait;
use std::ops::Deref;

/// One relational engine behind the store.
///
/// Implementations differ in how they reach the engine and in whether they
/// rewrite statements, but every implementation must give callers the same
/// shapes: `None` for no row, an empty list for no rows, and an untouched
/// engine error for a rejected statement.
///
/// `query` and `execute` receive text that has already been through
/// [`SqlBackend::translate`] and must wait for readiness before touching the
/// engine.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Which engine this is.
    fn kind(&self) -> BackendKind;

    /// Converts a `SQLite`-dialect statement into what this engine runs.
    fn translate(&self, sql: &str) -> Translation;

    /// Resolves once the engine is usable.
    async fn wait_ready(&self) -> Result<()>;

    /// Runs translated text and returns normalized rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Runs translated text and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Runs a multi-statement batch without parameters.
    async fn exec_batch(&self, sql: &str) -> Result<()>;

    /// Flushes state to durable storage. A no-op where the engine persists
    /// on its own.
    async fn save(&self) -> Result<()>;

    /// Releases the engine. Further calls are undefined but must not panic.
    async fn close(&self) -> Result<()>;

    /// Round-trips `SELECT 1`.
    async fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Fetches the first row, if any.
    async fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        PreparedStatement::new(self, sql).get(params).await
    }

    /// Fetches all rows.
    async fn all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        PreparedStatement::new(self, sql).all(params).await
    }

    /// Executes a statement for its side effects.
    async fn run(&self, sql: &str, params: &[Value]) -> Result<u64> {
        PreparedStatement::new(self, sql).run(params).await
    }

    /// Translates once and returns a reusable handle.
    fn prepare(&self, sql: &str) -> PreparedStatement<&Self>
    where
        Self: Sized,
    {
        PreparedStatement::new(self, sql)
    }
}

/// A statement translated once and executed any number of times.
///
/// Generic over how the backend is held, so both a borrowed backend and an
/// `Arc<dyn SqlBackend>` work.
#[derive(Debug, Clone)]
pub struct PreparedStatement<P> {
    backend: P,
    translation: Translation,
}

impl<P> PreparedStatement<P>
where
    P: Deref + Send + Sync,
    P::Target: SqlBackend,
{
    /// Translates `sql` for the backend and keeps the result.
    pub fn new(backend: P, sql: &str) -> Self {
        let translation = backend.translate(sql);
        Self {
            backend,
            translation,
        }
    }

    /// The translation this handle executes.
    pub const fn translation(&self) -> &Translation {
        &self.translation
    }

    /// Returns the text to run, or `None` for a no-op.
    fn bind(&self, params: &[Value]) -> Result<Option<&str>> {
        let Translation::Statement { sql, placeholders } = &self.translation else {
            return Ok(None);
        };
        if *placeholders != params.len() {
            return Err(Error::InvalidInput(format!(
                "statement expects {placeholders} parameters, got {}",
                params.len()
            )));
        }
        Ok(Some(sql))
    }

    /// Executes for side effects. A no-op reports success with zero rows.
    ///
    /// # Errors
    ///
    /// Returns an error on a parameter count mismatch or if the engine
    /// rejects the statement.
    pub async fn run(&self, params: &[Value]) -> Result<u64> {
        match self.bind(params)? {
            Some(sql) => self.backend.execute(sql, params).await,
            None => Ok(0),
        }
    }

    /// Fetches the first row. A no-op returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on a parameter count mismatch or if the engine
    /// rejects the statement.
    pub async fn get(&self, params: &[Value]) -> Result<Option<Row>> {
        match self.bind(params)? {
            Some(sql) => Ok(self.backend.query(sql, params).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    /// Fetches all rows. A no-op returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error on a parameter count mismatch or if the engine
    /// rejects the statement.
    pub async fn all(&self, params: &[Value]) -> Result<Vec<Row>> {
        match self.bind(params)? {
            Some(sql) => self.backend.query(sql, params).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dialect::{PostgresDialect, SqlRewriter};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records what reaches the engine instead of running it.
    #[derive(Default)]
    struct RecordingBackend {
        translations: AtomicUsize,
        executed: Mutex<Vec<(String, Vec<Value>)>>,
    }

    #[async_trait]
    impl SqlBackend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Postgres
        }

        fn translate(&self, sql: &str) -> Translation {
            self.translations.fetch_add(1, Ordering::SeqCst);
            PostgresDialect::default().rewrite(sql)
        }

        async fn wait_ready(&self) -> Result<()> {
            Ok(())
        }

        async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
            self.executed
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));
            Ok(vec![Row::new(vec!["n".into()], vec![Value::Integer(1)])?])
        }

        async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
            self.query(sql, params).await.map(|_| 1)
        }

        async fn exec_batch(&self, _sql: &str) -> Result<()> {
            Ok(())
        }

        async fn save(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_prepared_translates_once() {
        let backend = RecordingBackend::default();
        let stmt = backend.prepare("SELECT * FROM sessions WHERE user_id = ? AND revoked = 0");

        stmt.all(&[Value::from("u1")]).await.unwrap();
        stmt.all(&[Value::from("u2")]).await.unwrap();

        assert_eq!(backend.translations.load(Ordering::SeqCst), 1);
        let executed = backend.executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert_eq!(
            executed[0].0,
            "SELECT * FROM sessions WHERE user_id = $1 AND revoked = false"
        );
        assert_eq!(executed[1].1, vec![Value::from("u2")]);
    }

    #[tokio::test]
    async fn test_no_op_never_reaches_engine() {
        let backend = RecordingBackend::default();
        assert!(backend.get("CREATE TABLE t (id TEXT)", &[]).await.unwrap().is_none());
        assert!(backend.all("PRAGMA foreign_keys = ON", &[]).await.unwrap().is_empty());
        assert_eq!(backend.run("ALTER TABLE t ADD COLUMN c TEXT", &[]).await.unwrap(), 0);
        assert!(backend.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parameter_count_mismatch() {
        let backend = RecordingBackend::default();
        let err = backend
            .run("UPDATE t SET a = ? WHERE id = ?", &[Value::Integer(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(backend.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_owned_handle_over_trait_object() {
        let backend: Arc<dyn SqlBackend> = Arc::new(RecordingBackend::default());
        let stmt = PreparedStatement::new(Arc::clone(&backend), "SELECT ?");
        let row = stmt.get(&[Value::Integer(9)]).await.unwrap().unwrap();
        assert_eq!(row.get("n"), Some(&Value::Integer(1)));
    }
}
