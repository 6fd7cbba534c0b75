//! Duplicate group table operations (spec.md §4.3, §4.7, §6).

use crate::errors::CoreError;
use crate::types::{DuplicateGroup, DuplicateStats};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

fn row_to_group(row: &Row) -> rusqlite::Result<DuplicateGroup> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(DuplicateGroup {
        id: row.get("id")?,
        hash: row.get("hash")?,
        count: row.get("count")?,
        total_size: row.get::<_, i64>("total_size")?.max(0) as u64,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str = "id, hash, count, total_size, created_at, updated_at";

/// Insert a new group for `hash`, or update an existing one's `count`/`total_size`.
pub fn upsert(conn: &Connection, hash: &str, count: i64, total_size: u64) -> Result<i64, CoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO duplicate_groups (hash, count, total_size, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(hash) DO UPDATE SET
            count = excluded.count,
            total_size = excluded.total_size,
            updated_at = excluded.updated_at",
        params![hash, count, total_size as i64, now],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM duplicate_groups WHERE hash = ?1",
        [hash],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<DuplicateGroup>, CoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM duplicate_groups WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_group)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e.into()),
        })
}

pub fn find_by_hash(conn: &Connection, hash: &str) -> Result<Option<DuplicateGroup>, CoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM duplicate_groups WHERE hash = ?1");
    conn.query_row(&sql, [hash], row_to_group)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e.into()),
        })
}

pub fn list_paginated(
    conn: &Connection,
    offset: i64,
    limit: i64,
) -> Result<Vec<DuplicateGroup>, CoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM duplicate_groups ORDER BY total_size DESC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit, offset], row_to_group)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn member_ids(conn: &Connection, group_id: i64) -> Result<Vec<String>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT file_id FROM duplicate_group_files WHERE group_id = ?1")?;
    let rows = stmt.query_map([group_id], |r| r.get::<_, String>(0))?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Delete a group outright; `ON DELETE CASCADE` removes its member rows.
pub fn delete(conn: &Connection, id: i64) -> Result<(), CoreError> {
    conn.execute("DELETE FROM duplicate_groups WHERE id = ?1", [id])?;
    Ok(())
}

/// Detach `file_id` from `group_id`; deletes the group outright once its
/// member count would drop below 2 (spec.md §3 invariant).
pub fn remove_file_from_group(
    conn: &Connection,
    group_id: i64,
    file_id: &str,
) -> Result<(), CoreError> {
    conn.execute(
        "DELETE FROM duplicate_group_files WHERE group_id = ?1 AND file_id = ?2",
        params![group_id, file_id],
    )?;
    let remaining: i64 = conn.query_row(
        "SELECT COUNT(*) FROM duplicate_group_files WHERE group_id = ?1",
        [group_id],
        |r| r.get(0),
    )?;
    if remaining < 2 {
        delete(conn, group_id)?;
    } else {
        conn.execute(
            "UPDATE duplicate_groups SET count = ?1, updated_at = ?2 WHERE id = ?3",
            params![remaining, Utc::now().to_rfc3339(), group_id],
        )?;
    }
    Ok(())
}

/// Atomically wipe and rebuild every group from `files GROUP BY hash
/// HAVING COUNT > 1` (spec.md §4.3, §4.7 "full refresh").
pub fn refresh_from_files(conn: &mut Connection) -> Result<DuplicateStats, CoreError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM duplicate_group_files", [])?;
    tx.execute("DELETE FROM duplicate_groups", [])?;

    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO duplicate_groups (hash, count, total_size, created_at, updated_at)
         SELECT hash, COUNT(*), COALESCE(SUM(size), 0), ?1, ?1
         FROM files
         WHERE hash_calculated = 1
         GROUP BY hash
         HAVING COUNT(*) > 1",
        [&now],
    )?;
    tx.execute(
        "INSERT INTO duplicate_group_files (group_id, file_id)
         SELECT g.id, f.id
         FROM files f
         JOIN duplicate_groups g ON g.hash = f.hash
         WHERE f.hash_calculated = 1",
        [],
    )?;

    let stats = query_stats(&tx)?;
    tx.commit()?;
    Ok(stats)
}

/// Upsert only the groups touched by `hashes` (spec.md §4.7 "incremental").
pub fn refresh_incremental(conn: &mut Connection, hashes: &[String]) -> Result<(), CoreError> {
    let tx = conn.transaction()?;
    for hash in hashes {
        let (count, total_size): (i64, i64) = tx.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM files WHERE hash = ?1 AND hash_calculated = 1",
            [hash],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        if count < 2 {
            tx.execute("DELETE FROM duplicate_groups WHERE hash = ?1", [hash])?;
            continue;
        }
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO duplicate_groups (hash, count, total_size, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(hash) DO UPDATE SET count = excluded.count, total_size = excluded.total_size, updated_at = excluded.updated_at",
            params![hash, count, total_size, now],
        )?;
        let group_id: i64 =
            tx.query_row("SELECT id FROM duplicate_groups WHERE hash = ?1", [hash], |r| r.get(0))?;
        tx.execute(
            "DELETE FROM duplicate_group_files WHERE group_id = ?1",
            [group_id],
        )?;
        tx.execute(
            "INSERT INTO duplicate_group_files (group_id, file_id)
             SELECT ?1, id FROM files WHERE hash = ?2 AND hash_calculated = 1",
            params![group_id, hash],
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn query_stats(conn: &Connection) -> Result<DuplicateStats, CoreError> {
    let total_groups: i64 = conn.query_row("SELECT COUNT(*) FROM duplicate_groups", [], |r| r.get(0))?;
    let total_wasted_bytes: i64 = conn.query_row(
        "SELECT COALESCE(SUM((count - 1) * (total_size / count)), 0) FROM duplicate_groups WHERE count > 0",
        [],
        |r| r.get(0),
    )?;
    Ok(DuplicateStats {
        total_groups,
        total_wasted_bytes: total_wasted_bytes.max(0) as u64,
    })
}

pub fn stats(conn: &Connection) -> Result<DuplicateStats, CoreError> {
    query_stats(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::connection::open_in_memory;
    use crate::repository::files;
    use crate::types::File;

    fn hashed_file(id: &str, hash: &str, size: u64) -> File {
        let now = Utc::now();
        File {
            id: id.to_string(),
            name: id.to_string(),
            size,
            mime_type: "text/plain".to_string(),
            modified_time: now,
            hash: Some(hash.to_string()),
            hash_calculated: true,
            parents: vec![],
            path: None,
            web_view_link: None,
            last_updated: now,
            hash_skip_reason: None,
        }
    }

    #[test]
    fn refresh_from_files_builds_groups_of_two_or_more() {
        let mut conn = open_in_memory().unwrap();
        files::upsert(&conn, &hashed_file("a", "h1", 3)).unwrap();
        files::upsert(&conn, &hashed_file("b", "h1", 3)).unwrap();
        files::upsert(&conn, &hashed_file("c", "h2", 5)).unwrap();

        let stats = refresh_from_files(&mut conn).unwrap();
        assert_eq!(stats.total_groups, 1);
        let g = find_by_hash(&conn, "h1").unwrap().unwrap();
        assert_eq!(g.count, 2);
        assert_eq!(g.total_size, 6);
        assert_eq!(member_ids(&conn, g.id).unwrap().len(), 2);
    }

    #[test]
    fn refresh_is_idempotent() {
        let mut conn = open_in_memory().unwrap();
        files::upsert(&conn, &hashed_file("a", "h1", 3)).unwrap();
        files::upsert(&conn, &hashed_file("b", "h1", 3)).unwrap();
        refresh_from_files(&mut conn).unwrap();
        let first: Vec<(String, i64, u64)> = list_paginated(&conn, 0, 10)
            .unwrap()
            .into_iter()
            .map(|g| (g.hash, g.count, g.total_size))
            .collect();
        refresh_from_files(&mut conn).unwrap();
        let second: Vec<(String, i64, u64)> = list_paginated(&conn, 0, 10)
            .unwrap()
            .into_iter()
            .map(|g| (g.hash, g.count, g.total_size))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn remove_file_from_group_deletes_group_below_two_members() {
        let mut conn = open_in_memory().unwrap();
        files::upsert(&conn, &hashed_file("a", "h1", 3)).unwrap();
        files::upsert(&conn, &hashed_file("b", "h1", 3)).unwrap();
        refresh_from_files(&mut conn).unwrap();
        let g = find_by_hash(&conn, "h1").unwrap().unwrap();

        remove_file_from_group(&conn, g.id, "a").unwrap();
        assert!(find_by_id(&conn, g.id).unwrap().is_none());
    }
}
