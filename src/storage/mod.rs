//! Storage layer.
//!
//! Two engines sit behind [`SqlBackend`]:
//!
//! | Backend | Engine | Dialect | Durability |
//! |---------|--------|---------|------------|
//! | [`sqlite::EmbeddedBackend`] | in-process `SQLite` | native | snapshot file, autosave |
//! | [`postgres::PostgresBackend`] | `PostgreSQL` pool | rewritten by [`dialect`] | server |
//!
//! Application code uses [`Database`], which picks one at startup.

pub mod dialect;
mod facade;
pub mod normalize;
pub mod postgres;
pub mod readiness;
pub mod sqlite;
pub mod traits;

pub use facade::Database;
pub use readiness::{ReadySignal, ReadyState, Readiness};
pub use traits::{PreparedStatement, SqlBackend};
