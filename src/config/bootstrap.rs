//! First-start seed settings for the embedded engine.

use secrecy::SecretString;
use serde::Deserialize;

/// Password hash that matches no password. Login stays disabled until an
/// operator supplies a real hash.
pub const DISABLED_PASSWORD_HASH: &str = "!";

/// Seed data written once, when the users table is empty.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Organization display name.
    pub organization_name: String,
    /// Organization slug.
    pub organization_slug: String,
    /// Administrator login name.
    pub admin_username: String,
    /// Administrator email.
    pub admin_email: String,
    /// Administrator role.
    pub admin_role: String,
    /// Pre-computed password hash for the administrator.
    pub admin_password_hash: SecretString,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            organization_name: "TrustChecker".to_string(),
            organization_slug: "trustchecker".to_string(),
            admin_username: "admin".to_string(),
            admin_email: "admin@trustchecker.io".to_string(),
            admin_role: "admin".to_string(),
            admin_password_hash: SecretString::from(DISABLED_PASSWORD_HASH),
        }
    }
}

/// Bootstrap section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileBootstrap {
    /// Organization name.
    pub organization_name: Option<String>,
    /// Organization slug.
    pub organization_slug: Option<String>,
    /// Admin username.
    pub admin_username: Option<String>,
    /// Admin email.
    pub admin_email: Option<String>,
    /// Admin role.
    pub admin_role: Option<String>,
    /// Admin password hash.
    pub admin_password_hash: Option<String>,
}

impl BootstrapConfig {
    pub(super) fn merge(&mut self, file: ConfigFileBootstrap) {
        if let Some(v) = file.organization_name {
            self.organization_name = v;
        }
        if let Some(v) = file.organization_slug {
            self.organization_slug = v;
        }
        if let Some(v) = file.admin_username {
            self.admin_username = v;
        }
        if let Some(v) = file.admin_email {
            self.admin_email = v;
        }
        if let Some(v) = file.admin_role {
            self.admin_role = v;
        }
        if let Some(v) = file.admin_password_hash {
            self.admin_password_hash = SecretString::from(v);
        }
    }
}
