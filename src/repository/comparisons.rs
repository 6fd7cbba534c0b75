//! Comparison result table operations (spec.md §4.3, §4.8, §6).

use crate::errors::CoreError;
use crate::types::ComparisonResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

fn row_to_result(row: &Row) -> rusqlite::Result<ComparisonResult> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(ComparisonResult {
        id: row.get("id")?,
        source_folder_id: row.get("source_folder_id")?,
        target_folder_id: row.get("target_folder_id")?,
        source_folder_name: row.get("source_folder_name")?,
        target_folder_name: row.get("target_folder_name")?,
        source_file_count: row.get("source_file_count")?,
        target_file_count: row.get("target_file_count")?,
        duplicate_count: row.get("duplicate_count")?,
        source_total_size: row.get::<_, i64>("source_total_size")?.max(0) as u64,
        target_total_size: row.get::<_, i64>("target_total_size")?.max(0) as u64,
        duplicate_size: row.get::<_, i64>("duplicate_size")?.max(0) as u64,
        can_delete_target_folder: row.get::<_, i64>("can_delete_target_folder")? != 0,
        duplication_percentage: row.get("duplication_percentage")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str = "id, source_folder_id, target_folder_id, source_folder_name, target_folder_name, \
    source_file_count, target_file_count, duplicate_count, source_total_size, target_total_size, \
    duplicate_size, can_delete_target_folder, duplication_percentage, created_at, updated_at";

/// Insert a new comparison result plus its duplicate-file member rows,
/// all in one transaction. Returns the new row's id.
pub fn insert(
    conn: &mut Connection,
    result: &ComparisonResult,
    duplicate_file_ids: &[String],
) -> Result<i64, CoreError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO comparison_results
            (source_folder_id, target_folder_id, source_folder_name, target_folder_name,
             source_file_count, target_file_count, duplicate_count, source_total_size,
             target_total_size, duplicate_size, can_delete_target_folder, duplication_percentage,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            result.source_folder_id,
            result.target_folder_id,
            result.source_folder_name,
            result.target_folder_name,
            result.source_file_count,
            result.target_file_count,
            result.duplicate_count,
            result.source_total_size as i64,
            result.target_total_size as i64,
            result.duplicate_size as i64,
            result.can_delete_target_folder as i64,
            result.duplication_percentage,
            Utc::now().to_rfc3339(),
        ],
    )?;
    let id = tx.last_insert_rowid();
    insert_members(&tx, id, duplicate_file_ids)?;
    tx.commit()?;
    Ok(id)
}

/// Replace an existing comparison result's fields and member set
/// atomically (spec.md §4.3 "replacing the member set atomically").
pub fn update(
    conn: &mut Connection,
    id: i64,
    result: &ComparisonResult,
    duplicate_file_ids: &[String],
) -> Result<(), CoreError> {
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE comparison_results SET
            source_file_count = ?1, target_file_count = ?2, duplicate_count = ?3,
            source_total_size = ?4, target_total_size = ?5, duplicate_size = ?6,
            can_delete_target_folder = ?7, duplication_percentage = ?8, updated_at = ?9
         WHERE id = ?10",
        params![
            result.source_file_count,
            result.target_file_count,
            result.duplicate_count,
            result.source_total_size as i64,
            result.target_total_size as i64,
            result.duplicate_size as i64,
            result.can_delete_target_folder as i64,
            result.duplication_percentage,
            Utc::now().to_rfc3339(),
            id,
        ],
    )?;
    tx.execute("DELETE FROM comparison_duplicate_files WHERE comparison_id = ?1", [id])?;
    insert_members(&tx, id, duplicate_file_ids)?;
    tx.commit()?;
    Ok(())
}

fn insert_members(conn: &Connection, comparison_id: i64, file_ids: &[String]) -> Result<(), CoreError> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO comparison_duplicate_files (comparison_id, file_id) VALUES (?1, ?2)",
    )?;
    for file_id in file_ids {
        stmt.execute(params![comparison_id, file_id])?;
    }
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<ComparisonResult>, CoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM comparison_results WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_result)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e.into()),
        })
}

pub fn find_by_source_and_target(
    conn: &Connection,
    source_folder_id: &str,
    target_folder_id: &str,
) -> Result<Option<ComparisonResult>, CoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM comparison_results
         WHERE source_folder_id = ?1 AND target_folder_id = ?2
         ORDER BY created_at DESC LIMIT 1"
    );
    conn.query_row(&sql, params![source_folder_id, target_folder_id], row_to_result)
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
) -> Result<Vec<ComparisonResult>, CoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM comparison_results ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit, offset], row_to_result)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn duplicate_file_ids(conn: &Connection, comparison_id: i64) -> Result<Vec<String>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT file_id FROM comparison_duplicate_files WHERE comparison_id = ?1")?;
    let rows = stmt.query_map([comparison_id], |r| r.get::<_, String>(0))?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Delete a comparison result; `ON DELETE CASCADE` removes its member rows.
pub fn delete(conn: &Connection, id: i64) -> Result<(), CoreError> {
    conn.execute("DELETE FROM comparison_results WHERE id = ?1", [id])?;
    Ok(())
}

pub fn total_potential_savings(conn: &Connection) -> Result<u64, CoreError> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(duplicate_size), 0) FROM comparison_results",
        [],
        |r| r.get(0),
    )?;
    Ok(total.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::connection::open_in_memory;
    use crate::repository::files;
    use crate::types::File;

    fn sample_file(id: &str) -> File {
        let now = Utc::now();
        File {
            id: id.to_string(),
            name: id.to_string(),
            size: 10,
            mime_type: "text/plain".to_string(),
            modified_time: now,
            hash: None,
            hash_calculated: false,
            parents: vec![],
            path: None,
            web_view_link: None,
            last_updated: now,
            hash_skip_reason: None,
        }
    }

    fn sample(source: &str, target: &str) -> ComparisonResult {
        let now = Utc::now();
        ComparisonResult {
            id: 0,
            source_folder_id: source.to_string(),
            target_folder_id: target.to_string(),
            source_folder_name: "src".to_string(),
            target_folder_name: "tgt".to_string(),
            source_file_count: 1,
            target_file_count: 1,
            duplicate_count: 1,
            source_total_size: 10,
            target_total_size: 10,
            duplicate_size: 10,
            can_delete_target_folder: true,
            duplication_percentage: 100.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_then_update_replaces_member_set_atomically() {
        let mut conn = open_in_memory().unwrap();
        for id in ["f1", "f2", "f3"] {
            files::upsert(&conn, &sample_file(id)).unwrap();
        }
        let id = insert(&mut conn, &sample("s", "t"), &["f1".to_string()]).unwrap();
        assert_eq!(duplicate_file_ids(&conn, id).unwrap(), vec!["f1".to_string()]);

        let mut updated = sample("s", "t");
        updated.duplicate_count = 2;
        update(&mut conn, id, &updated, &["f2".to_string(), "f3".to_string()]).unwrap();

        let mut members = duplicate_file_ids(&conn, id).unwrap();
        members.sort();
        assert_eq!(members, vec!["f2".to_string(), "f3".to_string()]);
        assert_eq!(find_by_id(&conn, id).unwrap().unwrap().duplicate_count, 2);
    }

    #[test]
    fn deleting_result_cascades_member_rows() {
        let mut conn = open_in_memory().unwrap();
        files::upsert(&conn, &sample_file("f1")).unwrap();
        let id = insert(&mut conn, &sample("s", "t"), &["f1".to_string()]).unwrap();
        delete(&conn, id).unwrap();
        assert!(duplicate_file_ids(&conn, id).unwrap().is_empty());
    }
}
