//! Additive column migrations for the embedded schema.
//!
//! A snapshot written by an older build may predate columns the current
//! schema declares. `CREATE TABLE IF NOT EXISTS` will not touch an existing
//! table, so each listed column is checked against the live table and added
//! only when absent. Running the list again is a no-op.

use super::connection::quote_ident;
use crate::{Error, Result};
use rusqlite::Connection;

/// One column that must exist on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMigration {
    /// Table name.
    pub table: &'static str,
    /// Column name.
    pub column: &'static str,
    /// Column type and constraints as written after the name.
    pub definition: &'static str,
}

impl ColumnMigration {
    /// Creates a migration entry.
    #[must_use]
    pub const fn new(table: &'static str, column: &'static str, definition: &'static str) -> Self {
        Self {
            table,
            column,
            definition,
        }
    }
}

/// Columns added since the first released schema.
pub const TRUSTCHECKER_MIGRATIONS: &[ColumnMigration] = &[
    ColumnMigration::new("evidence_items", "file_path", "TEXT DEFAULT ''"),
    ColumnMigration::new("evidence_items", "tags", "TEXT DEFAULT '[]'"),
    ColumnMigration::new("evidence_items", "status", "TEXT DEFAULT 'active'"),
    ColumnMigration::new("billing_plans", "expires_at", "TEXT"),
    ColumnMigration::new("users", "org_id", "TEXT"),
    ColumnMigration::new("users", "mfa_secret", "TEXT"),
    ColumnMigration::new("users", "mfa_enabled", "INTEGER DEFAULT 0"),
    ColumnMigration::new("users", "mfa_backup_codes", "TEXT"),
    ColumnMigration::new("users", "failed_attempts", "INTEGER DEFAULT 0"),
    ColumnMigration::new("users", "locked_until", "TEXT"),
];

/// What a migration pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// `(table, column)` pairs that were added.
    pub added: Vec<(String, String)>,
    /// Entries skipped because their table does not exist.
    pub missing_tables: Vec<String>,
}

impl MigrationReport {
    /// Returns true if nothing was altered.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
    }
}

/// Adds every listed column that the live schema lacks.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the schema cannot be inspected or an
/// `ALTER TABLE` fails.
pub fn apply_column_migrations(
    conn: &Connection,
    migrations: &[ColumnMigration],
) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    for migration in migrations {
        let Some(columns) = table_columns(conn, migration.table)? else {
            if !report.missing_tables.iter().any(|t| t == migration.table) {
                report.missing_tables.push(migration.table.to_string());
            }
            continue;
        };

        if columns.iter().any(|c| c.eq_ignore_ascii_case(migration.column)) {
            continue;
        }

        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(migration.table),
            quote_ident(migration.column),
            migration.definition
        );
        conn.execute(&sql, []).map_err(|e| Error::OperationFailed {
            operation: "add_column".to_string(),
            cause: format!("{}.{}: {e}", migration.table, migration.column),
        })?;

        tracing::info!(
            table = migration.table,
            column = migration.column,
            "Migration: added column"
        );
        report
            .added
            .push((migration.table.to_string(), migration.column.to_string()));
    }

    Ok(report)
}

/// Column names of a table, or `None` if the table does not exist.
fn table_columns(conn: &Connection, table: &str) -> Result<Option<Vec<String>>> {
    let to_err = |e: rusqlite::Error| Error::OperationFailed {
        operation: "table_info".to_string(),
        cause: format!("{table}: {e}"),
    };

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
        .map_err(to_err)?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(to_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(to_err)?;

    Ok((!columns.is_empty()).then_some(columns))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_users(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE users (id TEXT PRIMARY KEY, username TEXT, email TEXT, password_hash TEXT)",
        )
        .unwrap();
    }

    #[test]
    fn test_adds_missing_columns_once() {
        let conn = Connection::open_in_memory().unwrap();
        legacy_users(&conn);
        let users_only: Vec<_> = TRUSTCHECKER_MIGRATIONS
            .iter()
            .copied()
            .filter(|m| m.table == "users")
            .collect();

        let first = apply_column_migrations(&conn, &users_only).unwrap();
        assert_eq!(first.added.len(), users_only.len());

        let second = apply_column_migrations(&conn, &users_only).unwrap();
        assert!(second.is_noop());

        let columns = table_columns(&conn, "users").unwrap().unwrap();
        assert!(columns.contains(&"mfa_enabled".to_string()));
    }

    #[test]
    fn test_default_applies_to_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        legacy_users(&conn);
        conn.execute("INSERT INTO users (id) VALUES ('u1')", []).unwrap();

        apply_column_migrations(&conn, &[ColumnMigration::new("users", "failed_attempts", "INTEGER DEFAULT 0")])
            .unwrap();

        let attempts: i64 = conn
            .query_row("SELECT failed_attempts FROM users WHERE id = 'u1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(attempts, 0);
    }

    #[test]
    fn test_missing_table_is_skipped() {
        let conn = Connection::open_in_memory().unwrap();
        let report = apply_column_migrations(&conn, TRUSTCHECKER_MIGRATIONS).unwrap();
        assert!(report.is_noop());
        assert_eq!(
            report.missing_tables,
            vec!["evidence_items", "billing_plans", "users"]
        );
    }

    #[test]
    fn test_existing_column_differing_in_case() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE billing_plans (id TEXT, EXPIRES_AT TEXT)")
            .unwrap();
        let report = apply_column_migrations(&conn, TRUSTCHECKER_MIGRATIONS).unwrap();
        assert!(report.is_noop());
    }
}
