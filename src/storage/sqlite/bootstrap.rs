//! One-time seed for an empty embedded store.

use crate::config::BootstrapConfig;
use crate::{Error, Result};
use rusqlite::{Connection, params};
use secrecy::ExposeSecret;

/// Identifiers of the seeded records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededAccounts {
    /// Organization id.
    pub organization_id: String,
    /// Administrator user id.
    pub admin_id: String,
}

/// Seeds one organization and one administrator if `users` is empty.
///
/// Returns `None` when users already exist. This is a first-start bootstrap,
/// not a reconciliation: an operator deleting the admin later does not bring
/// it back unless every user is gone.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if counting or inserting fails.
pub fn seed_if_empty(conn: &Connection, config: &BootstrapConfig) -> Result<Option<SeededAccounts>> {
    let to_err = |e: rusqlite::Error| Error::OperationFailed {
        operation: "bootstrap_seed".to_string(),
        cause: e.to_string(),
    };

    let users: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .map_err(to_err)?;
    if users > 0 {
        return Ok(None);
    }

    let organization_id = uuid::Uuid::new_v4().to_string();
    let admin_id = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT OR IGNORE INTO organizations (id, name, slug) VALUES (?1, ?2, ?3)",
        params![
            organization_id,
            config.organization_name,
            config.organization_slug
        ],
    )
    .map_err(to_err)?;
    // The slug may already exist from an earlier seed whose users were removed.
    let organization_id: String = conn
        .query_row(
            "SELECT id FROM organizations WHERE slug = ?1",
            [&config.organization_slug],
            |row| row.get(0),
        )
        .map_err(to_err)?;

    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, role, company, org_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            admin_id,
            config.admin_username,
            config.admin_email,
            config.admin_password_hash.expose_secret(),
            config.admin_role,
            config.organization_name,
            organization_id,
        ],
    )
    .map_err(to_err)?;

    tracing::info!(
        username = %config.admin_username,
        organization = %config.organization_name,
        "Seeded bootstrap organization and administrator"
    );

    Ok(Some(SeededAccounts {
        organization_id,
        admin_id,
    }))
}
