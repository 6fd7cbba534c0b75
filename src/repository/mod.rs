//! SQLite-backed repository layer (spec.md §4.3, C3).
//!
//! A single `rusqlite::Connection` behind a mutex. The spec's "single
//! writer, readers proceed in parallel" note is accepted here as one
//! serialized connection rather than a reader pool; see DESIGN.md.

pub mod comparisons;
pub mod connection;
pub mod files;
pub mod groups;
pub mod progress;
mod schema;

use crate::errors::CoreError;
use crate::types::{
    ComparisonResult, DuplicateGroup, DuplicateStats, File, JobStatus, OperationType, Progress,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        Ok(Self {
            conn: Mutex::new(connection::open_db(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self, CoreError> {
        Ok(Self {
            conn: Mutex::new(connection::open_in_memory()?),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- files --------------------------------------------------------

    pub fn upsert_file(&self, file: &File) -> Result<(), CoreError> {
        files::upsert(&self.lock(), file)
    }

    pub fn upsert_files(&self, batch: &[File]) -> Result<(), CoreError> {
        files::upsert_batch(&mut self.lock(), batch)
    }

    pub fn upsert_files_metadata(&self, batch: &[File]) -> Result<(), CoreError> {
        files::upsert_metadata_batch(&mut self.lock(), batch)
    }

    pub fn get_file(&self, id: &str) -> Result<Option<File>, CoreError> {
        files::get(&self.lock(), id)
    }

    pub fn find_files_by_hash(&self, hash: &str) -> Result<Vec<File>, CoreError> {
        files::find_by_hash(&self.lock(), hash)
    }

    pub fn find_files_by_size(&self, size: u64) -> Result<Vec<File>, CoreError> {
        files::find_by_size(&self.lock(), size)
    }

    pub fn iter_files_without_hash(&self, limit: usize) -> Result<Vec<File>, CoreError> {
        files::iter_without_hash(&self.lock(), limit)
    }

    pub fn list_files_paginated(&self, offset: i64, limit: i64) -> Result<Vec<File>, CoreError> {
        files::list_paginated(&self.lock(), offset, limit)
    }

    pub fn mark_file_hashed(&self, id: &str, hash: &str) -> Result<(), CoreError> {
        files::mark_hashed(&self.lock(), id, hash)
    }

    pub fn mark_file_hash_skip(&self, id: &str, reason: &str) -> Result<(), CoreError> {
        files::mark_hash_skip(&self.lock(), id, reason)
    }

    pub fn delete_file(&self, id: &str) -> Result<(), CoreError> {
        files::delete(&self.lock(), id)
    }

    pub fn delete_files(&self, ids: &[String]) -> Result<usize, CoreError> {
        files::delete_batch(&mut self.lock(), ids)
    }

    pub fn delete_orphaned_files(&self) -> Result<usize, CoreError> {
        files::delete_orphaned(&mut self.lock())
    }

    pub fn delete_files_older_than(&self, threshold: DateTime<Utc>) -> Result<usize, CoreError> {
        files::delete_older_than(&self.lock(), threshold)
    }

    pub fn file_count(&self) -> Result<i64, CoreError> {
        files::count(&self.lock())
    }

    // -- duplicate groups ----------------------------------------------

    pub fn find_group_by_hash(&self, hash: &str) -> Result<Option<DuplicateGroup>, CoreError> {
        groups::find_by_hash(&self.lock(), hash)
    }

    pub fn list_groups_paginated(&self, offset: i64, limit: i64) -> Result<Vec<DuplicateGroup>, CoreError> {
        groups::list_paginated(&self.lock(), offset, limit)
    }

    pub fn group_member_ids(&self, group_id: i64) -> Result<Vec<String>, CoreError> {
        groups::member_ids(&self.lock(), group_id)
    }

    pub fn remove_file_from_group(&self, group_id: i64, file_id: &str) -> Result<(), CoreError> {
        groups::remove_file_from_group(&self.lock(), group_id, file_id)
    }

    pub fn refresh_groups_from_files(&self) -> Result<DuplicateStats, CoreError> {
        groups::refresh_from_files(&mut self.lock())
    }

    pub fn refresh_groups_incremental(&self, hashes: &[String]) -> Result<(), CoreError> {
        groups::refresh_incremental(&mut self.lock(), hashes)
    }

    pub fn duplicate_stats(&self) -> Result<DuplicateStats, CoreError> {
        groups::stats(&self.lock())
    }

    // -- comparison results ---------------------------------------------

    pub fn insert_comparison(
        &self,
        result: &ComparisonResult,
        duplicate_file_ids: &[String],
    ) -> Result<i64, CoreError> {
        comparisons::insert(&mut self.lock(), result, duplicate_file_ids)
    }

    pub fn update_comparison(
        &self,
        id: i64,
        result: &ComparisonResult,
        duplicate_file_ids: &[String],
    ) -> Result<(), CoreError> {
        comparisons::update(&mut self.lock(), id, result, duplicate_file_ids)
    }

    pub fn find_comparison(&self, id: i64) -> Result<Option<ComparisonResult>, CoreError> {
        comparisons::find_by_id(&self.lock(), id)
    }

    pub fn find_comparison_by_source_and_target(
        &self,
        source_folder_id: &str,
        target_folder_id: &str,
    ) -> Result<Option<ComparisonResult>, CoreError> {
        comparisons::find_by_source_and_target(&self.lock(), source_folder_id, target_folder_id)
    }

    pub fn list_comparisons_paginated(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ComparisonResult>, CoreError> {
        comparisons::list_paginated(&self.lock(), offset, limit)
    }

    pub fn comparison_duplicate_file_ids(&self, comparison_id: i64) -> Result<Vec<String>, CoreError> {
        comparisons::duplicate_file_ids(&self.lock(), comparison_id)
    }

    pub fn delete_comparison(&self, id: i64) -> Result<(), CoreError> {
        comparisons::delete(&self.lock(), id)
    }

    pub fn total_potential_savings(&self) -> Result<u64, CoreError> {
        comparisons::total_potential_savings(&self.lock())
    }

    // -- progress ---------------------------------------------------------

    pub fn create_progress(&self, operation_type: OperationType, total_items: i64) -> Result<i64, CoreError> {
        progress::create(&self.lock(), operation_type, total_items)
    }

    pub fn get_progress(&self, id: i64) -> Result<Option<Progress>, CoreError> {
        progress::get(&self.lock(), id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_progress(
        &self,
        id: i64,
        processed_items: i64,
        total_items: i64,
        status: JobStatus,
        current_step: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<(), CoreError> {
        progress::update(&self.lock(), id, processed_items, total_items, status, current_step, metadata)
    }

    pub fn fail_progress(&self, id: i64, message: &str) -> Result<(), CoreError> {
        progress::fail(&self.lock(), id, message)
    }

    pub fn list_progress_by_operation_type(
        &self,
        operation_type: OperationType,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Progress>, CoreError> {
        progress::list_by_operation_type(&self.lock(), operation_type, offset, limit)
    }

    pub fn list_active_progress(&self) -> Result<Vec<Progress>, CoreError> {
        progress::list_active(&self.lock())
    }

    pub fn list_stuck_progress(&self, threshold: DateTime<Utc>) -> Result<Vec<Progress>, CoreError> {
        progress::list_stuck(&self.lock(), threshold)
    }

    pub fn find_active_progress_for_operation(
        &self,
        operation_type: OperationType,
    ) -> Result<Option<Progress>, CoreError> {
        progress::find_active_for_operation(&self.lock(), operation_type)
    }

    pub fn delete_completed_progress(&self) -> Result<usize, CoreError> {
        progress::delete_completed(&self.lock())
    }

    pub fn delete_progress_older_than(&self, threshold: DateTime<Utc>) -> Result<usize, CoreError> {
        progress::delete_older_than(&self.lock(), threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn repository_wires_files_and_progress_together() {
        let repo = Repository::open_in_memory().unwrap();
        repo.upsert_file(&sample_file("a")).unwrap();
        assert_eq!(repo.file_count().unwrap(), 1);

        let progress_id = repo.create_progress(OperationType::FileScan, 1).unwrap();
        assert!(repo
            .find_active_progress_for_operation(OperationType::FileScan)
            .unwrap()
            .is_some());
        repo.update_progress(
            progress_id,
            1,
            1,
            JobStatus::Completed,
            "done",
            &HashMap::new(),
        )
        .unwrap();
        assert!(repo
            .find_active_progress_for_operation(OperationType::FileScan)
            .unwrap()
            .is_none());
    }
}
