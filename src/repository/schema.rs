//! Ordered, idempotent DDL steps plus the migrations ledger (spec.md §4.3,
//! §6). Each step is applied at most once; applied versions are recorded
//! in `schema_migrations`. Missing columns on older databases are added
//! in place via catalog queries (see `ensure_column`).

use crate::errors::CoreError;
use rusqlite::Connection;

pub(crate) const WAL_PRAGMAS: &str = r#"
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA wal_autocheckpoint = 10000;
"#;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                modified_time TEXT NOT NULL,
                hash TEXT,
                hash_calculated INTEGER NOT NULL DEFAULT 0,
                parents TEXT NOT NULL DEFAULT '[]',
                path TEXT,
                web_view_link TEXT,
                last_updated TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_size ON files(size);
            CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);
            CREATE INDEX IF NOT EXISTS idx_files_name ON files(name);
            CREATE INDEX IF NOT EXISTS idx_files_modified_time ON files(modified_time);
            CREATE INDEX IF NOT EXISTS idx_files_hash_calculated ON files(hash_calculated);
        "#,
    },
    Migration {
        version: 2,
        sql: r#"
            CREATE TABLE IF NOT EXISTS duplicate_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL UNIQUE,
                count INTEGER NOT NULL,
                total_size INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS duplicate_group_files (
                group_id INTEGER NOT NULL REFERENCES duplicate_groups(id) ON DELETE CASCADE,
                file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                PRIMARY KEY (group_id, file_id)
            );
        "#,
    },
    Migration {
        version: 3,
        sql: r#"
            CREATE TABLE IF NOT EXISTS comparison_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_folder_id TEXT NOT NULL,
                target_folder_id TEXT NOT NULL,
                source_folder_name TEXT NOT NULL,
                target_folder_name TEXT NOT NULL,
                source_file_count INTEGER NOT NULL,
                target_file_count INTEGER NOT NULL,
                duplicate_count INTEGER NOT NULL,
                source_total_size INTEGER NOT NULL,
                target_total_size INTEGER NOT NULL,
                duplicate_size INTEGER NOT NULL,
                can_delete_target_folder INTEGER NOT NULL,
                duplication_percentage REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS comparison_duplicate_files (
                comparison_id INTEGER NOT NULL REFERENCES comparison_results(id) ON DELETE CASCADE,
                file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                PRIMARY KEY (comparison_id, file_id)
            );
        "#,
    },
    Migration {
        version: 4,
        sql: r#"
            CREATE TABLE IF NOT EXISTS progress (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                operation_type TEXT NOT NULL,
                processed_items INTEGER NOT NULL DEFAULT 0,
                total_items INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                current_step TEXT NOT NULL DEFAULT '',
                error_message TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                last_updated TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_progress_operation_type ON progress(operation_type);
            CREATE INDEX IF NOT EXISTS idx_progress_status ON progress(status);
        "#,
    },
];

pub fn migrate(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    for m in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE version = ?1",
                [m.version],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if already {
            continue;
        }
        conn.execute_batch(m.sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![m.version, chrono::Utc::now().to_rfc3339()],
        )?;
    }

    // Catalog-detected column addition (spec.md §4.3), independent of the
    // versioned DDL steps above: older databases get this column added in
    // place rather than via a numbered migration.
    ensure_column(conn, "files", "hash_skip_reason", "TEXT")?;

    Ok(())
}

/// Add `column` to `table` if a catalog query shows it is missing.
/// Used by future migrations that widen an existing table in place.
pub fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    ddl_type: &str,
) -> Result<(), CoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .any(|name| name == column);
    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {ddl_type}"))?;
    }
    Ok(())
}
