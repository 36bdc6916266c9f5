//! Snapshot file for the in-memory engine.
//!
//! The whole database is written to one file and the file is replaced as a
//! unit: `VACUUM INTO` a sibling temp file, then rename over the snapshot. A
//! crash mid-write leaves the previous snapshot intact.

use super::connection::quote_ident;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

const SNAPSHOT_SCHEMA: &str = "snapshot";

fn durability_err(path: &Path, cause: impl std::fmt::Display) -> Error {
    Error::Durability {
        path: path.display().to_string(),
        cause: cause.to_string(),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes the full database to `path`.
///
/// # Errors
///
/// Returns [`Error::Durability`] if the directory cannot be created, the
/// engine cannot serialize, or the rename fails.
pub fn write_snapshot(conn: &Connection, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| durability_err(path, e))?;
    }

    let tmp = temp_path(path);
    // VACUUM INTO refuses to overwrite a non-empty file.
    match std::fs::remove_file(&tmp) {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(durability_err(&tmp, e)),
    }

    let tmp_str = tmp
        .to_str()
        .ok_or_else(|| durability_err(&tmp, "path is not valid UTF-8"))?;
    conn.execute("VACUUM INTO ?1", [tmp_str])
        .map_err(|e| durability_err(&tmp, e))?;

    std::fs::rename(&tmp, path).map_err(|e| durability_err(path, e))
}

/// Loads a snapshot file into an empty connection.
///
/// Returns `false` if the file does not exist. Tables are recreated from the
/// snapshot's own definitions and their rows copied, then indexes, views and
/// triggers are recreated.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the file is not a readable database
/// or any copy step fails.
pub fn load_snapshot(conn: &mut Connection, path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    let to_err = |e: rusqlite::Error| Error::OperationFailed {
        operation: "load_snapshot".to_string(),
        cause: format!("{}: {e}", path.display()),
    };

    let path_str = path.to_str().ok_or_else(|| Error::OperationFailed {
        operation: "load_snapshot".to_string(),
        cause: format!("{}: path is not valid UTF-8", path.display()),
    })?;
    conn.execute(&format!("ATTACH DATABASE ?1 AS {SNAPSHOT_SCHEMA}"), [path_str])
        .map_err(to_err)?;

    let copied = copy_attached(conn).map_err(to_err);
    let detached = conn
        .execute(&format!("DETACH DATABASE {SNAPSHOT_SCHEMA}"), [])
        .map_err(to_err);
    let tables = copied?;
    detached?;

    tracing::info!(path = %path.display(), tables, "Loaded snapshot");
    Ok(true)
}

fn copy_attached(conn: &mut Connection) -> rusqlite::Result<usize> {
    let objects: Vec<(String, String, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT type, name, sql FROM {SNAPSHOT_SCHEMA}.sqlite_master \
             WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%' \
             ORDER BY CASE type WHEN 'table' THEN 0 WHEN 'index' THEN 1 ELSE 2 END, rowid"
        ))?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<_>>()?
    };

    let tx = conn.transaction()?;
    let mut tables = 0;
    for (kind, name, sql) in &objects {
        tx.execute(sql, [])?;
        if kind == "table" {
            let ident = quote_ident(name);
            tx.execute(
                &format!("INSERT INTO main.{ident} SELECT * FROM {SNAPSHOT_SCHEMA}.{ident}"),
                [],
            )?;
            tables += 1;
        }
    }

    let has_sequence: bool = tx.query_row(
        &format!(
            "SELECT EXISTS (SELECT 1 FROM {SNAPSHOT_SCHEMA}.sqlite_master WHERE name = 'sqlite_sequence')"
        ),
        [],
        |row| row.get(0),
    )?;
    if has_sequence {
        // The row copy above already bumped the counters; replace them.
        tx.execute("DELETE FROM main.sqlite_sequence", [])?;
        tx.execute(
            &format!("INSERT INTO main.sqlite_sequence SELECT * FROM {SNAPSHOT_SCHEMA}.sqlite_sequence"),
            [],
        )?;
    }

    tx.commit()?;
    Ok(tables)
}
