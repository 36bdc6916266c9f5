//! Configuration management.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables. The presence of a database URL is what selects the
//! client/server backend; everything else falls back to the embedded engine.

mod bootstrap;

pub use bootstrap::BootstrapConfig;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default snapshot file name.
pub const DEFAULT_DB_FILE: &str = "trustchecker.db";
/// Default autosave interval in seconds.
pub const DEFAULT_AUTOSAVE_SECS: u64 = 30;
/// Default maximum pool size.
pub const DEFAULT_POOL_MAX_SIZE: usize = 20;
/// Default pool acquisition timeout in seconds.
pub const DEFAULT_POOL_TIMEOUT_SECS: u64 = 5;
/// Default readiness wait in seconds.
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;

/// Which engine serves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process `SQLite` with periodic snapshots.
    Embedded,
    /// Pooled PostgreSQL.
    Postgres,
}

impl BackendKind {
    /// Picks the backend for a configuration.
    ///
    /// This is the only place the choice is made; nothing downstream branches
    /// on it again.
    #[must_use]
    pub fn select(config: &StoreConfig) -> Self {
        match &config.database_url {
            Some(url) if !url.expose_secret().trim().is_empty() => Self::Postgres,
            _ => Self::Embedded,
        }
    }

    /// Returns the backend name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "sqlite",
            Self::Postgres => "postgresql",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection URL. Selects the client/server backend when set.
    pub database_url: Option<SecretString>,
    /// Directory holding the embedded snapshot file.
    pub data_dir: PathBuf,
    /// Snapshot file name inside `data_dir`.
    pub db_file: String,
    /// Whether the embedded engine reads and writes a snapshot at all.
    pub persist: bool,
    /// Seconds between autosave cycles. Zero disables the loop.
    pub autosave_interval_secs: u64,
    /// Maximum pooled connections.
    pub pool_max_size: usize,
    /// Seconds to wait for a pooled connection.
    pub pool_timeout_secs: u64,
    /// Seconds an operation waits for the readiness signal.
    pub ready_timeout_secs: u64,
    /// First-start seed data for the embedded engine.
    pub bootstrap: BootstrapConfig,
    /// Conflict-target columns per table, used to rewrite `INSERT OR REPLACE`.
    pub conflict_targets: BTreeMap<String, Vec<String>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            data_dir: default_data_dir(),
            db_file: DEFAULT_DB_FILE.to_string(),
            persist: true,
            autosave_interval_secs: DEFAULT_AUTOSAVE_SECS,
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
            pool_timeout_secs: DEFAULT_POOL_TIMEOUT_SECS,
            ready_timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
            bootstrap: BootstrapConfig::default(),
            conflict_targets: BTreeMap::new(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Database URL.
    pub database_url: Option<String>,
    /// Data directory.
    pub data_dir: Option<String>,
    /// Snapshot file name.
    pub db_file: Option<String>,
    /// Snapshot toggle.
    pub persist: Option<bool>,
    /// Autosave interval.
    pub autosave_interval_secs: Option<u64>,
    /// Pool size.
    pub pool_max_size: Option<usize>,
    /// Pool timeout.
    pub pool_timeout_secs: Option<u64>,
    /// Readiness timeout.
    pub ready_timeout_secs: Option<u64>,
    /// Bootstrap section.
    pub bootstrap: Option<bootstrap::ConfigFileBootstrap>,
    /// Conflict targets section.
    pub conflict_targets: Option<BTreeMap<String, Vec<String>>>,
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An embedded configuration that never touches disk.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            persist: false,
            autosave_interval_secs: 0,
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        let mut config = Self::from_toml(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parses TOML text without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self::from_config_file(file))
    }

    /// Builds configuration from defaults plus environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Converts a `ConfigFile` to `StoreConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(url) = file.database_url {
            config.database_url = Some(SecretString::from(url));
        }
        if let Some(dir) = file.data_dir {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(name) = file.db_file {
            config.db_file = name;
        }
        if let Some(v) = file.persist {
            config.persist = v;
        }
        if let Some(v) = file.autosave_interval_secs {
            config.autosave_interval_secs = v;
        }
        if let Some(v) = file.pool_max_size {
            config.pool_max_size = v;
        }
        if let Some(v) = file.pool_timeout_secs {
            config.pool_timeout_secs = v;
        }
        if let Some(v) = file.ready_timeout_secs {
            config.ready_timeout_secs = v;
        }
        if let Some(section) = file.bootstrap {
            config.bootstrap.merge(section);
        }
        if let Some(targets) = file.conflict_targets {
            config.conflict_targets = targets;
        }

        config
    }

    /// Applies environment overrides through a lookup function.
    ///
    /// Unparseable numeric values are ignored with a warning so a typo in one
    /// variable does not take the process down.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database_url = Some(SecretString::from(url));
        }
        if let Some(dir) = lookup("TRUSTDB_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("TRUSTDB_DB_FILE") {
            self.db_file = name;
        }
        if let Some(v) = parse_env(&lookup, "TRUSTDB_AUTOSAVE_SECS") {
            self.autosave_interval_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "TRUSTDB_POOL_MAX_SIZE") {
            self.pool_max_size = v;
        }
        if let Some(v) = parse_env(&lookup, "TRUSTDB_POOL_TIMEOUT_SECS") {
            self.pool_timeout_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "TRUSTDB_READY_TIMEOUT_SECS") {
            self.ready_timeout_secs = v;
        }
        if let Some(hash) = lookup("TRUSTDB_ADMIN_PASSWORD_HASH") {
            self.bootstrap.admin_password_hash = SecretString::from(hash);
        }
    }

    /// Sets the database URL.
    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(SecretString::from(url.into()));
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self.persist = true;
        self
    }

    /// Registers conflict-target columns for a table.
    #[must_use]
    pub fn with_conflict_target<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict_targets
            .insert(table.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    /// Path of the snapshot file, or `None` when persistence is off.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.persist.then(|| self.data_dir.join(&self.db_file))
    }

    /// Autosave period, or `None` when disabled.
    #[must_use]
    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.persist && self.autosave_interval_secs > 0)
            .then(|| Duration::from_secs(self.autosave_interval_secs))
    }

    /// Pool acquisition bound.
    #[must_use]
    pub const fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_secs)
    }

    /// Readiness wait bound.
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        },
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "trustchecker", "trustdb")
        .map_or_else(|| PathBuf::from("data"), |dirs| dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_select_embedded() {
        let config = StoreConfig::default();
        assert_eq!(BackendKind::select(&config), BackendKind::Embedded);
        assert_eq!(config.autosave_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.pool_max_size, 20);
        assert!(
            config
                .snapshot_path()
                .unwrap()
                .ends_with("trustchecker.db")
        );
    }

    #[test]
    fn test_database_url_selects_postgres() {
        let config = StoreConfig::default().with_database_url("postgres://localhost/trust");
        assert_eq!(BackendKind::select(&config), BackendKind::Postgres);
    }

    #[test]
    fn test_blank_url_is_ignored() {
        let mut config = StoreConfig::default();
        config.apply_overrides(lookup_from(&[("DATABASE_URL", "  ")]));
        assert_eq!(BackendKind::select(&config), BackendKind::Embedded);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = StoreConfig::default();
        config.apply_overrides(lookup_from(&[
            ("TRUSTDB_DATA_DIR", "/tmp/trust"),
            ("TRUSTDB_DB_FILE", "t.db"),
            ("TRUSTDB_AUTOSAVE_SECS", "10"),
            ("TRUSTDB_POOL_MAX_SIZE", "not-a-number"),
        ]));
        assert_eq!(config.snapshot_path(), Some(PathBuf::from("/tmp/trust/t.db")));
        assert_eq!(config.autosave_interval_secs, 10);
        assert_eq!(config.pool_max_size, DEFAULT_POOL_MAX_SIZE);
    }

    #[test]
    fn test_ephemeral_has_no_snapshot() {
        let config = StoreConfig::ephemeral();
        assert!(config.snapshot_path().is_none());
        assert!(config.autosave_interval().is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = StoreConfig::from_toml(
            r#"
            data_dir = "/var/lib/trust"
            autosave_interval_secs = 5

            [bootstrap]
            organization_name = "Acme"

            [conflict_targets]
            users = ["id"]
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/trust"));
        assert_eq!(config.autosave_interval_secs, 5);
        assert_eq!(config.bootstrap.organization_name, "Acme");
        assert_eq!(config.conflict_targets["users"], vec!["id".to_string()]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(StoreConfig::from_toml("bogus = 1").is_err());
    }
}
