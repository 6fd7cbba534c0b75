//! Duplicate detector (spec.md §4.7, C7): a thin wrapper over the groups
//! repository's refresh operations, surfacing aggregate stats.

use crate::errors::CoreError;
use crate::progress_tracker::ProgressTracker;
use crate::repository::Repository;
use crate::types::{DuplicateStats, OperationType};

pub struct DedupeEngine<'a> {
    repo: &'a Repository,
}

impl<'a> DedupeEngine<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// Rebuild every group from scratch (spec.md §4.7 "full scan").
    pub fn full_refresh(&self) -> Result<DuplicateStats, CoreError> {
        let mut tracker = ProgressTracker::start(self.repo, OperationType::DuplicateSearch, 0)?;
        tracker.run("refreshing")?;
        let result = self.repo.refresh_groups_from_files();
        match &result {
            Ok(_) => tracker.complete()?,
            Err(e) => tracker.fail(&e.to_string())?,
        }
        result
    }

    /// Touch only the groups for `hashes` (spec.md §4.7 "incremental", e.g.
    /// called by the hash engine as files finish hashing in a run).
    pub fn incremental_refresh(&self, hashes: &[String]) -> Result<(), CoreError> {
        let mut tracker = ProgressTracker::start(self.repo, OperationType::DuplicateSearch, hashes.len() as i64)?;
        tracker.run("refreshing")?;
        let result = self.repo.refresh_groups_incremental(hashes);
        match &result {
            Ok(_) => tracker.complete()?,
            Err(e) => tracker.fail(&e.to_string())?,
        }
        result
    }

    pub fn stats(&self) -> Result<DuplicateStats, CoreError> {
        self.repo.duplicate_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::File;
    use chrono::Utc;

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
    fn full_refresh_surfaces_wasted_bytes() {
        let repo = Repository::open_in_memory().unwrap();
        repo.upsert_file(&hashed_file("a", "h1", 100)).unwrap();
        repo.upsert_file(&hashed_file("b", "h1", 100)).unwrap();

        let stats = DedupeEngine::new(&repo).full_refresh().unwrap();
        assert_eq!(stats.total_groups, 1);
        assert_eq!(stats.total_wasted_bytes, 100);
    }

    #[test]
    fn full_refresh_drives_a_duplicate_search_progress_row() {
        let repo = Repository::open_in_memory().unwrap();
        repo.upsert_file(&hashed_file("a", "h1", 100)).unwrap();
        repo.upsert_file(&hashed_file("b", "h1", 100)).unwrap();

        DedupeEngine::new(&repo).full_refresh().unwrap();

        let rows = repo
            .list_progress_by_operation_type(OperationType::DuplicateSearch, 0, 10)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, crate::types::JobStatus::Completed);
    }
}
