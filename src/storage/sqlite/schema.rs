//! Schema owned by the embedded engine.
//!
//! Every statement is idempotent. The client/server deployment gets the same
//! tables from its external migrations instead.

use crate::{Error, Result};
use rusqlite::Connection;

/// Table definitions, in creation order.
pub const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS organizations (id TEXT PRIMARY KEY, name TEXT NOT NULL, slug TEXT UNIQUE NOT NULL, plan TEXT DEFAULT 'free', created_at TEXT DEFAULT (datetime('now')))",
    "CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY, username TEXT UNIQUE NOT NULL, email TEXT UNIQUE NOT NULL, password_hash TEXT NOT NULL, role TEXT DEFAULT 'operator', company TEXT DEFAULT '', org_id TEXT, mfa_secret TEXT, mfa_enabled INTEGER DEFAULT 0, mfa_backup_codes TEXT, failed_attempts INTEGER DEFAULT 0, locked_until TEXT, created_at TEXT DEFAULT (datetime('now')), last_login TEXT)",
    "CREATE TABLE IF NOT EXISTS refresh_tokens (id TEXT PRIMARY KEY, user_id TEXT NOT NULL, token_hash TEXT NOT NULL, expires_at TEXT NOT NULL, created_at TEXT DEFAULT (datetime('now')), revoked INTEGER DEFAULT 0)",
    "CREATE TABLE IF NOT EXISTS sessions (id TEXT PRIMARY KEY, user_id TEXT NOT NULL, ip_address TEXT, user_agent TEXT, created_at TEXT DEFAULT (datetime('now')), last_active TEXT DEFAULT (datetime('now')), revoked INTEGER DEFAULT 0)",
    "CREATE TABLE IF NOT EXISTS audit_log (id TEXT PRIMARY KEY, actor_id TEXT, action TEXT NOT NULL, entity_type TEXT DEFAULT '', entity_id TEXT DEFAULT '', details TEXT DEFAULT '{}', ip_address TEXT DEFAULT '', timestamp TEXT DEFAULT (datetime('now')))",
    "CREATE TABLE IF NOT EXISTS evidence_items (id TEXT PRIMARY KEY, title TEXT NOT NULL, description TEXT DEFAULT '', file_name TEXT DEFAULT '', file_type TEXT DEFAULT '', file_size INTEGER DEFAULT 0, sha256_hash TEXT NOT NULL, entity_type TEXT DEFAULT '', entity_id TEXT DEFAULT '', uploaded_by TEXT, verification_status TEXT DEFAULT 'anchored', file_path TEXT DEFAULT '', tags TEXT DEFAULT '[]', status TEXT DEFAULT 'active', created_at TEXT DEFAULT (datetime('now')))",
    "CREATE TABLE IF NOT EXISTS iot_readings (id TEXT PRIMARY KEY, shipment_id TEXT NOT NULL, sensor_type TEXT DEFAULT 'temperature', value REAL NOT NULL, unit TEXT DEFAULT 'C', threshold_min REAL, threshold_max REAL, alert_triggered INTEGER DEFAULT 0, recorded_at TEXT DEFAULT (datetime('now')))",
    "CREATE TABLE IF NOT EXISTS billing_plans (id TEXT PRIMARY KEY, user_id TEXT NOT NULL, plan_name TEXT DEFAULT 'free', scan_limit INTEGER DEFAULT 100, api_limit INTEGER DEFAULT 500, price_monthly REAL DEFAULT 0.0, status TEXT DEFAULT 'active', started_at TEXT DEFAULT (datetime('now')), expires_at TEXT)",
    "CREATE TABLE IF NOT EXISTS system_settings (id TEXT PRIMARY KEY, category TEXT NOT NULL, setting_key TEXT NOT NULL, setting_value TEXT DEFAULT '', is_secret INTEGER DEFAULT 0, description TEXT DEFAULT '', updated_by TEXT, updated_at TEXT DEFAULT (datetime('now')), UNIQUE(category, setting_key))",
    "CREATE TABLE IF NOT EXISTS data_retention_policies (id TEXT PRIMARY KEY, table_name TEXT NOT NULL, retention_days INTEGER DEFAULT 365, action TEXT DEFAULT 'archive', is_active INTEGER DEFAULT 1, last_run TEXT, records_affected INTEGER DEFAULT 0, created_at TEXT DEFAULT (datetime('now')))",
];

/// Index definitions. Run after [`TABLES`] and after column migrations, so
/// an index may reference a migrated column.
pub const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_users_org ON users(org_id)",
    "CREATE INDEX IF NOT EXISTS idx_refresh_user ON refresh_tokens(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_log(actor_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_time ON audit_log(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_evidence_entity ON evidence_items(entity_type, entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_iot_time ON iot_readings(recorded_at)",
    "CREATE INDEX IF NOT EXISTS idx_billing_user ON billing_plans(user_id)",
];

/// A schema as an ordered list of statements.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// `CREATE TABLE IF NOT EXISTS` statements.
    pub tables: &'static [&'static str],
    /// `CREATE INDEX IF NOT EXISTS` statements.
    pub indexes: &'static [&'static str],
}

impl Schema {
    /// The application schema.
    pub const TRUSTCHECKER: Self = Self {
        tables: TABLES,
        indexes: INDEXES,
    };

    /// A schema with nothing in it.
    pub const EMPTY: Self = Self {
        tables: &[],
        indexes: &[],
    };

    /// Creates all tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if a statement fails.
    pub fn create_tables(&self, conn: &Connection) -> Result<()> {
        run_all(conn, self.tables, "create_table")
    }

    /// Creates all indexes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if a statement fails.
    pub fn create_indexes(&self, conn: &Connection) -> Result<()> {
        run_all(conn, self.indexes, "create_index")
    }
}

fn run_all(conn: &Connection, statements: &[&str], operation: &str) -> Result<()> {
    for sql in statements {
        conn.execute(sql, []).map_err(|e| Error::OperationFailed {
            operation: operation.to_string(),
            cause: format!("{e} [sql: {sql}]"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        for _ in 0..2 {
            Schema::TRUSTCHECKER.create_tables(&conn).unwrap();
            Schema::TRUSTCHECKER.create_indexes(&conn).unwrap();
        }
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, i64::try_from(TABLES.len()).unwrap());
    }
}
