//! Open and migrate the repository's database file (mirrors the
//! teacher's `db_ops::connection`: WAL pragmas + idempotent schema).

use super::schema::{self, WAL_PRAGMAS};
use crate::errors::CoreError;
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the database at `path`, enable WAL, and apply any
/// pending migrations. Backs the file up before mutating an existing
/// schema (spec.md §4.3); skipped for freshly created files.
pub fn open_db(path: &Path) -> Result<Connection, CoreError> {
    let existed = path.exists();
    let conn = Connection::open(path)?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.execute_batch(WAL_PRAGMAS)?;

    if existed {
        backup_file(path)?;
    }
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (tests, demo lib-only path).
pub fn open_in_memory() -> Result<Connection, CoreError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Copy `path` to `path.bak` before a schema mutation. Best-effort: a
/// failed backup is logged, never fatal (the migration still runs).
fn backup_file(path: &Path) -> Result<(), CoreError> {
    let backup_path = path.with_extension("bak");
    if let Err(e) = std::fs::copy(path, &backup_path) {
        log::warn!("could not back up {} before migration: {e}", path.display());
    }
    Ok(())
}
