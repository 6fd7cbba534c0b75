//! Progress table operations (spec.md §4.4, §4.8, §6).

use crate::errors::CoreError;
use crate::types::{JobStatus, OperationType, Progress};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;

fn row_to_progress(row: &Row) -> rusqlite::Result<Progress> {
    let operation_type: String = row.get("operation_type")?;
    let status: String = row.get("status")?;
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let last_updated: String = row.get("last_updated")?;
    let metadata: String = row.get("metadata")?;
    Ok(Progress {
        id: row.get("id")?,
        operation_type: OperationType::from_str_opt(&operation_type)
            .unwrap_or(OperationType::FileScan),
        processed_items: row.get("processed_items")?,
        total_items: row.get("total_items")?,
        status: JobStatus::from_str_opt(&status).unwrap_or(JobStatus::Failed),
        current_step: row.get("current_step")?,
        error_message: row.get("error_message")?,
        start_time: parse_ts(&start_time),
        end_time: end_time.as_deref().map(parse_ts),
        last_updated: parse_ts(&last_updated),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str = "id, operation_type, processed_items, total_items, status, \
    current_step, error_message, start_time, end_time, last_updated, metadata";

/// Insert a new progress row, returning its id. Callers enforce the
/// singleton-per-operation-type rule (spec.md §4.10) before calling this.
pub fn create(conn: &Connection, operation_type: OperationType, total_items: i64) -> Result<i64, CoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO progress
            (operation_type, processed_items, total_items, status, current_step,
             error_message, start_time, end_time, last_updated, metadata)
         VALUES (?1, 0, ?2, ?3, '', NULL, ?4, NULL, ?4, '{}')",
        params![operation_type.as_str(), total_items, JobStatus::Pending.as_str(), now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Progress>, CoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM progress WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_progress)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e.into()),
        })
}

/// Update processed/total count, status, current step and metadata for a row
/// and bump `last_updated`. Used by every engine on each progress tick.
#[allow(clippy::too_many_arguments)]
pub fn update(
    conn: &Connection,
    id: i64,
    processed_items: i64,
    total_items: i64,
    status: JobStatus,
    current_step: &str,
    metadata: &HashMap<String, serde_json::Value>,
) -> Result<(), CoreError> {
    let now = Utc::now();
    let end_time = if status.is_terminal() { Some(now.to_rfc3339()) } else { None };
    conn.execute(
        "UPDATE progress SET
            processed_items = ?1, total_items = ?2, status = ?3, current_step = ?4,
            end_time = COALESCE(?5, end_time), last_updated = ?6, metadata = ?7
         WHERE id = ?8",
        params![
            processed_items,
            total_items,
            status.as_str(),
            current_step,
            end_time,
            now.to_rfc3339(),
            serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string()),
            id,
        ],
    )?;
    Ok(())
}

pub fn fail(conn: &Connection, id: i64, message: &str) -> Result<(), CoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE progress SET status = ?1, error_message = ?2, end_time = ?3, last_updated = ?3 WHERE id = ?4",
        params![JobStatus::Failed.as_str(), message, now, id],
    )?;
    Ok(())
}

pub fn list_by_operation_type(
    conn: &Connection,
    operation_type: OperationType,
    offset: i64,
    limit: i64,
) -> Result<Vec<Progress>, CoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM progress WHERE operation_type = ?1
         ORDER BY start_time DESC LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![operation_type.as_str(), limit, offset], row_to_progress)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Rows in `pending` or `running` state, across all operation types.
pub fn list_active(conn: &Connection) -> Result<Vec<Progress>, CoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM progress WHERE status IN ('pending', 'running') ORDER BY start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_progress)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// `running` rows whose `last_updated` is older than `threshold` (spec.md
/// §4.10 stuck-job reaper).
pub fn list_stuck(conn: &Connection, threshold: DateTime<Utc>) -> Result<Vec<Progress>, CoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM progress WHERE status = 'running' AND last_updated < ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([threshold.to_rfc3339()], row_to_progress)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// The single active (pending/running) row for `operation_type`, if any —
/// used by the supervisor to enforce one job per operation type at a time.
pub fn find_active_for_operation(
    conn: &Connection,
    operation_type: OperationType,
) -> Result<Option<Progress>, CoreError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM progress
         WHERE operation_type = ?1 AND status IN ('pending', 'running')
         ORDER BY start_time DESC LIMIT 1"
    );
    conn.query_row(&sql, [operation_type.as_str()], row_to_progress)
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e.into()),
        })
}

pub fn delete_completed(conn: &Connection) -> Result<usize, CoreError> {
    Ok(conn.execute("DELETE FROM progress WHERE status IN ('completed', 'failed')", [])?)
}

pub fn delete_older_than(conn: &Connection, threshold: DateTime<Utc>) -> Result<usize, CoreError> {
    Ok(conn.execute(
        "DELETE FROM progress WHERE last_updated < ?1",
        [threshold.to_rfc3339()],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::connection::open_in_memory;
    use std::time::Duration;

    #[test]
    fn create_then_update_then_get_roundtrips() {
        let conn = open_in_memory().unwrap();
        let id = create(&conn, OperationType::FileScan, 100).unwrap();
        let row = get(&conn, id).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Pending);
        assert_eq!(row.total_items, 100);

        update(&conn, id, 50, 100, JobStatus::Running, "scanning", &HashMap::new()).unwrap();
        let row = get(&conn, id).unwrap().unwrap();
        assert_eq!(row.processed_items, 50);
        assert_eq!(row.status, JobStatus::Running);
        assert!(row.end_time.is_none());

        update(&conn, id, 100, 100, JobStatus::Completed, "done", &HashMap::new()).unwrap();
        let row = get(&conn, id).unwrap().unwrap();
        assert!(row.end_time.is_some());
    }

    #[test]
    fn find_active_for_operation_ignores_terminal_rows() {
        let conn = open_in_memory().unwrap();
        let id = create(&conn, OperationType::HashCalculation, 10).unwrap();
        assert!(find_active_for_operation(&conn, OperationType::HashCalculation)
            .unwrap()
            .is_some());
        update(&conn, id, 10, 10, JobStatus::Completed, "done", &HashMap::new()).unwrap();
        assert!(find_active_for_operation(&conn, OperationType::HashCalculation)
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_stuck_finds_rows_older_than_threshold() {
        let conn = open_in_memory().unwrap();
        let id = create(&conn, OperationType::FileScan, 10).unwrap();
        update(&conn, id, 1, 10, JobStatus::Running, "scanning", &HashMap::new()).unwrap();

        let future_threshold = Utc::now() + chrono::Duration::from_std(Duration::from_secs(1)).unwrap();
        let stuck = list_stuck(&conn, future_threshold).unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, id);

        let past_threshold = Utc::now() - chrono::Duration::from_std(Duration::from_secs(3600)).unwrap();
        assert!(list_stuck(&conn, past_threshold).unwrap().is_empty());
    }
}
