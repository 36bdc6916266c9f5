//! Embedded `SQLite` backend.
//!
//! ## Module Structure
//!
//! - [`connection`]: Connection setup, pragmas and lock acquisition
//! - [`schema`]: Application tables and indexes
//! - [`migrations`]: Additive column migrations for older snapshots
//! - [`bootstrap`]: First-start seed
//! - [`snapshot`]: Whole-database file save and load
//! - [`autosave`]: Periodic background save
//! - [`backend`]: [`EmbeddedBackend`], the [`SqlBackend`](crate::storage::SqlBackend) implementation

pub mod autosave;
mod backend;
pub mod bootstrap;
pub mod connection;
pub mod migrations;
pub mod schema;
pub mod snapshot;

pub use backend::{EmbeddedBackend, EmbeddedSetup};
pub use bootstrap::{SeededAccounts, seed_if_empty};
pub use connection::{acquire_lock, configure_connection};
pub use migrations::{ColumnMigration, MigrationReport, TRUSTCHECKER_MIGRATIONS, apply_column_migrations};
pub use schema::Schema;
