//! Client/server `PostgreSQL` backend.
//!
//! Requires the `postgres` feature. Without it, [`PostgresBackend`] cannot be
//! constructed and selecting it reports [`Error::FeatureNotEnabled`].
//!
//! [`Error::FeatureNotEnabled`]: crate::Error::FeatureNotEnabled

#[cfg(feature = "postgres")]
mod backend;
#[cfg(feature = "postgres")]
pub mod params;
#[cfg(feature = "postgres")]
mod pool;
#[cfg(feature = "postgres")]
pub(crate) mod row;

#[cfg(feature = "postgres")]
pub use backend::PostgresBackend;
#[cfg(feature = "postgres")]
pub use row::decode_row;

#[cfg(not(feature = "postgres"))]
mod stub {
    use crate::config::{BackendKind, StoreConfig};
    use crate::models::{Row, Value};
    use crate::storage::dialect::Translation;
    use crate::storage::traits::SqlBackend;
    use crate::{Error, Result};
    use async_trait::async_trait;

    /// Stub backend when the `postgres` feature is not enabled. Uninhabited.
    #[derive(Debug)]
    pub enum PostgresBackend {}

    impl PostgresBackend {
        /// Always fails: requires the `postgres` feature.
        ///
        /// # Errors
        ///
        /// Always returns [`Error::FeatureNotEnabled`].
        pub fn connect(_config: &StoreConfig) -> Result<Self> {
            Err(Error::FeatureNotEnabled("postgres".to_string()))
        }
    }

    #[async_trait]
    impl SqlBackend for PostgresBackend {
        fn kind(&self) -> BackendKind {
            match *self {}
        }

        fn translate(&self, _sql: &str) -> Translation {
            match *self {}
        }

        async fn wait_ready(&self) -> Result<()> {
            match *self {}
        }

        async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            match *self {}
        }

        async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
            match *self {}
        }

        async fn exec_batch(&self, _sql: &str) -> Result<()> {
            match *self {}
        }

        async fn save(&self) -> Result<()> {
            match *self {}
        }

        async fn close(&self) -> Result<()> {
            match *self {}
        }
    }
}

#[cfg(not(feature = "postgres"))]
pub use stub::PostgresBackend;
