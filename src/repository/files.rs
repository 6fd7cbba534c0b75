//! File table operations (spec.md §4.3, §6 `files`).

use crate::errors::CoreError;
use crate::types::File;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

fn row_to_file(row: &Row) -> rusqlite::Result<File> {
    let modified_time: String = row.get("modified_time")?;
    let last_updated: String = row.get("last_updated")?;
    let parents: String = row.get("parents")?;
    Ok(File {
        id: row.get("id")?,
        name: row.get("name")?,
        size: row.get::<_, i64>("size")?.max(0) as u64,
        mime_type: row.get("mime_type")?,
        modified_time: parse_ts(&modified_time),
        hash: row.get("hash")?,
        hash_calculated: row.get::<_, i64>("hash_calculated")? != 0,
        parents: serde_json::from_str(&parents).unwrap_or_default(),
        path: row.get("path")?,
        web_view_link: row.get("web_view_link")?,
        last_updated: parse_ts(&last_updated),
        hash_skip_reason: row.get("hash_skip_reason")?,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str = "id, name, size, mime_type, modified_time, hash, hash_calculated, \
    parents, path, web_view_link, last_updated, hash_skip_reason";

const UPSERT_SQL: &str = "INSERT INTO files
    (id, name, size, mime_type, modified_time, hash, hash_calculated, parents, path, web_view_link, last_updated, hash_skip_reason)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        size = excluded.size,
        mime_type = excluded.mime_type,
        modified_time = excluded.modified_time,
        hash = excluded.hash,
        hash_calculated = excluded.hash_calculated,
        parents = excluded.parents,
        path = excluded.path,
        web_view_link = excluded.web_view_link,
        last_updated = excluded.last_updated,
        hash_skip_reason = excluded.hash_skip_reason";

/// Metadata-only upsert: inserts a fresh row with no hash, or on conflict
/// updates everything *except* the hash group. Used by the scan engine so
/// a re-scan never clobbers a hash the hash engine already computed.
const UPSERT_METADATA_SQL: &str = "INSERT INTO files
    (id, name, size, mime_type, modified_time, hash, hash_calculated, parents, path, web_view_link, last_updated, hash_skip_reason)
    VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0, ?6, ?7, ?8, ?9, NULL)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        size = excluded.size,
        mime_type = excluded.mime_type,
        modified_time = excluded.modified_time,
        parents = excluded.parents,
        path = excluded.path,
        web_view_link = excluded.web_view_link,
        last_updated = excluded.last_updated";

fn bind_and_execute(conn: &Connection, file: &File) -> Result<(), CoreError> {
    let parents = serde_json::to_string(&file.parents)?;
    conn.execute(
        UPSERT_SQL,
        params![
            file.id,
            file.name,
            file.size as i64,
            file.mime_type,
            file.modified_time.to_rfc3339(),
            file.hash,
            file.hash_calculated as i64,
            parents,
            file.path,
            file.web_view_link,
            file.last_updated.to_rfc3339(),
            file.hash_skip_reason,
        ],
    )?;
    Ok(())
}

fn bind_and_execute_metadata(conn: &Connection, file: &File) -> Result<(), CoreError> {
    let parents = serde_json::to_string(&file.parents)?;
    conn.execute(
        UPSERT_METADATA_SQL,
        params![
            file.id,
            file.name,
            file.size as i64,
            file.mime_type,
            file.modified_time.to_rfc3339(),
            parents,
            file.path,
            file.web_view_link,
            file.last_updated.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Full-row upsert (including hash fields). Used by tests/fixtures and by
/// the cleanup executor's bookkeeping; the scan engine uses
/// `upsert_metadata_batch` instead.
pub fn upsert(conn: &Connection, file: &File) -> Result<(), CoreError> {
    bind_and_execute(conn, file)
}

pub fn upsert_batch(conn: &mut Connection, files: &[File]) -> Result<(), CoreError> {
    let tx = conn.transaction()?;
    for f in files {
        bind_and_execute(&tx, f)?;
    }
    tx.commit()?;
    Ok(())
}

/// Batch metadata upsert under one transaction (spec.md §4.3, §4.5).
pub fn upsert_metadata_batch(conn: &mut Connection, files: &[File]) -> Result<(), CoreError> {
    let tx = conn.transaction()?;
    for f in files {
        bind_and_execute_metadata(&tx, f)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<File>, CoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM files WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_file)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e.into()),
        })
}

/// Files sharing `hash`, only rows with a calculated hash.
pub fn find_by_hash(conn: &Connection, hash: &str) -> Result<Vec<File>, CoreError> {
    let sql =
        format!("SELECT {SELECT_COLUMNS} FROM files WHERE hash = ?1 AND hash_calculated = 1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([hash], row_to_file)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn find_by_size(conn: &Connection, size: u64) -> Result<Vec<File>, CoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM files WHERE size = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([size as i64], row_to_file)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Files the hash engine hasn't yet disposed of: no hash, and no
/// recorded not-hashable sentinel (spec.md §4.6). Largest first, then
/// oldest-modified first ("long stragglers start earliest").
pub fn iter_without_hash(conn: &Connection, limit: usize) -> Result<Vec<File>, CoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM files
         WHERE hash_calculated = 0 AND hash_skip_reason IS NULL
         ORDER BY size DESC, modified_time ASC
         LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([limit as i64], row_to_file)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn list_paginated(conn: &Connection, offset: i64, limit: i64) -> Result<Vec<File>, CoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM files ORDER BY id LIMIT ?1 OFFSET ?2");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit, offset], row_to_file)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Record a successful hash (spec.md §4.6 step 3).
pub fn mark_hashed(conn: &Connection, id: &str, hash: &str) -> Result<(), CoreError> {
    conn.execute(
        "UPDATE files SET hash = ?1, hash_calculated = 1, hash_skip_reason = NULL, last_updated = ?2 WHERE id = ?3",
        params![hash, Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

/// Record a not-hashable skip so the hash engine never re-selects this file.
pub fn mark_hash_skip(conn: &Connection, id: &str, reason: &str) -> Result<(), CoreError> {
    conn.execute(
        "UPDATE files SET hash = NULL, hash_calculated = 0, hash_skip_reason = ?1, last_updated = ?2 WHERE id = ?3",
        params![reason, Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> Result<(), CoreError> {
    conn.execute("DELETE FROM files WHERE id = ?1", [id])?;
    Ok(())
}

pub fn delete_batch(conn: &mut Connection, ids: &[String]) -> Result<usize, CoreError> {
    let tx = conn.transaction()?;
    let mut deleted = 0;
    for id in ids {
        deleted += tx.execute("DELETE FROM files WHERE id = ?1", [id])?;
    }
    tx.commit()?;
    Ok(deleted)
}

pub fn delete_by_hash(conn: &Connection, hash: &str) -> Result<usize, CoreError> {
    Ok(conn.execute("DELETE FROM files WHERE hash = ?1", [hash])?)
}

/// Files whose recorded parents are all absent from the table themselves
/// (DESIGN.md Open Question: "orphaned" taken to mean parentless-in-table).
pub fn delete_orphaned(conn: &mut Connection) -> Result<usize, CoreError> {
    let tx = conn.transaction()?;
    let candidates: Vec<(String, String)> = {
        let mut stmt = tx.prepare("SELECT id, parents FROM files")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        rows.collect::<Result<_, _>>()?
    };
    let mut deleted = 0;
    for (id, parents_json) in candidates {
        let parents: Vec<String> = serde_json::from_str(&parents_json).unwrap_or_default();
        if parents.is_empty() {
            continue;
        }
        let any_present = parents.iter().any(|p| {
            tx.query_row("SELECT 1 FROM files WHERE id = ?1", [p], |_| Ok(()))
                .is_ok()
        });
        if !any_present {
            deleted += tx.execute("DELETE FROM files WHERE id = ?1", [&id])?;
        }
    }
    tx.commit()?;
    Ok(deleted)
}

pub fn delete_older_than(conn: &Connection, threshold: DateTime<Utc>) -> Result<usize, CoreError> {
    Ok(conn.execute(
        "DELETE FROM files WHERE last_updated < ?1",
        [threshold.to_rfc3339()],
    )?)
}

pub fn count(conn: &Connection) -> Result<i64, CoreError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?)
}

/// `(mime category, count, total size)` grouped by the mime prefix before '/'.
pub fn stats_by_mime_category(conn: &Connection) -> Result<Vec<(String, i64, u64)>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT
            CASE WHEN instr(mime_type, '/') > 0
                 THEN substr(mime_type, 1, instr(mime_type, '/') - 1)
                 ELSE mime_type END AS category,
            COUNT(*), COALESCE(SUM(size), 0)
         FROM files GROUP BY category ORDER BY 3 DESC",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, i64>(2)?.max(0) as u64,
        ))
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

const SIZE_BUCKETS: &[(&str, i64, i64)] = &[
    ("0-1KB", 0, 1024),
    ("1KB-1MB", 1024, 1024 * 1024),
    ("1MB-100MB", 1024 * 1024, 100 * 1024 * 1024),
    ("100MB-1GB", 100 * 1024 * 1024, 1024 * 1024 * 1024),
    ("1GB+", 1024 * 1024 * 1024, i64::MAX),
];

pub fn stats_by_size_bucket(conn: &Connection) -> Result<Vec<(String, i64, u64)>, CoreError> {
    let mut out = Vec::new();
    for (label, lo, hi) in SIZE_BUCKETS {
        let (count, total): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM files WHERE size >= ?1 AND size < ?2",
            params![lo, hi],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        out.push((label.to_string(), count, total.max(0) as u64));
    }
    Ok(out)
}

/// `(YYYY-MM, count, total size)` grouped by `modified_time`'s calendar month.
pub fn stats_by_month(conn: &Connection) -> Result<Vec<(String, i64, u64)>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT substr(modified_time, 1, 7) AS month, COUNT(*), COALESCE(SUM(size), 0)
         FROM files GROUP BY month ORDER BY month DESC",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, i64>(2)?.max(0) as u64,
        ))
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}
