//! Cleanup executor (spec.md §4.9, C9): deletes files through the
//! provider's bounded worker pool, is tolerant of partial failure, and can
//! sweep folders left empty by a deletion to a fixed point.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;

use regex::Regex;

use crate::config::Config;
use crate::errors::CoreError;
use crate::progress_tracker::ProgressTracker;
use crate::provider::{with_timeout, StorageProvider};
use crate::repository::Repository;
use crate::types::OperationType;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct CleanupEngine<'a> {
    repo: &'a Repository,
    provider: &'a dyn StorageProvider,
    config: &'a Config,
}

impl<'a> CleanupEngine<'a> {
    pub fn new(repo: &'a Repository, provider: &'a dyn StorageProvider, config: &'a Config) -> Self {
        Self { repo, provider, config }
    }

    /// Delete `ids` through the provider, then reconcile the repository:
    /// drop the file rows that actually got deleted and shrink/remove the
    /// duplicate groups they belonged to. Ids that fail to delete keep
    /// their repository row untouched (spec.md §4.9 "partial failure
    /// tolerant").
    pub fn delete_files(&self, ids: &[String], _cancelled: &AtomicBool) -> Result<CleanupSummary, CoreError> {
        let mut tracker = ProgressTracker::start(self.repo, OperationType::FileCleanup, ids.len() as i64)?;
        tracker.run("deleting")?;

        // The provider is the source of truth for existence: a stale or
        // unknown id simply fails its own delete rather than being silently
        // dropped, so callers learn about it in `summary.failed`.
        let affected_hashes: HashSet<String> = ids
            .iter()
            .filter_map(|id| self.repo.get_file(id).ok().flatten())
            .filter_map(|f| f.hash)
            .collect();

        let outcomes = self
            .provider
            .batch_delete(ids, self.config.delete_workers, self.config.provider_timeout_secs);

        let mut summary = CleanupSummary::default();
        let mut succeeded_ids = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(()) => {
                    succeeded_ids.push(outcome.id.clone());
                    summary.deleted.push(outcome.id);
                }
                Err(e) => summary.failed.push((outcome.id, e)),
            }
        }

        if !succeeded_ids.is_empty() {
            self.repo.delete_files(&succeeded_ids)?;
        }
        if !affected_hashes.is_empty() {
            let hashes: Vec<String> = affected_hashes.into_iter().collect();
            self.repo.refresh_groups_incremental(&hashes)?;
        }

        // Per-file failures are a skip, not a job failure (spec.md §4.9
        // "failed deletions are reported but the batch proceeds"): the job
        // always completes, and callers read `CleanupSummary.failed` for
        // the per-id detail.
        tracker.set_processed(summary.deleted.len() as i64, "deleting")?;
        tracker.complete()?;
        Ok(summary)
    }

    /// Repeatedly delete empty folders among `candidate_folder_ids` and
    /// their parents until no more empties are found (spec.md §4.9
    /// "optional empty-folder sweep to a fixed point").
    pub fn sweep_empty_folders(&self, candidate_folder_ids: &[String]) -> Result<Vec<String>, CoreError> {
        let mut frontier: Vec<String> = candidate_folder_ids.to_vec();
        let mut deleted = Vec::new();
        let mut seen = HashSet::new();

        while let Some(folder_id) = frontier.pop() {
            if !seen.insert(folder_id.clone()) {
                continue;
            }
            let page = match with_timeout(self.config.provider_timeout_secs, || self.provider.list_children(&folder_id, None)) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !page.files.is_empty() || page.next_page_token.is_some() {
                continue;
            }
            let Ok(folder) = with_timeout(self.config.provider_timeout_secs, || self.provider.get(&folder_id)) else {
                continue;
            };
            if with_timeout(self.config.provider_timeout_secs, || self.provider.delete(&folder_id)).is_ok() {
                deleted.push(folder_id.clone());
                frontier.extend(folder.parents.clone());
                seen.remove(&folder_id);
            }
        }
        Ok(deleted)
    }

    /// Delete every file directly under `folder_id` whose name matches
    /// `pattern` (spec.md §4.9 "regex pattern-based deletion confined to a
    /// folder" — non-recursive, to bound the blast radius).
    pub fn delete_by_pattern(
        &self,
        folder_id: &str,
        pattern: &str,
        cancelled: &AtomicBool,
    ) -> Result<CleanupSummary, CoreError> {
        let re = Regex::new(pattern).map_err(|e| CoreError::Validation(format!("bad pattern: {e}")))?;
        let folder_mime = self.provider.folder_mime().to_string();
        let mut matches = Vec::new();
        let mut page_token = None;
        loop {
            let page = with_timeout(self.config.provider_timeout_secs, || {
                self.provider.list_children(folder_id, page_token.as_deref())
            })?;
            matches.extend(
                page.files
                    .iter()
                    .filter(|f| !f.is_folder(&folder_mime) && re.is_match(&f.name))
                    .map(|f| f.id.clone()),
            );
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        self.delete_files(&matches, cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LocalFsStorageProvider;
    use std::fs;

    #[test]
    fn partial_failure_leaves_failed_ids_in_the_repository() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"keep me").unwrap();
        fs::write(dir.path().join("b.txt"), b"delete me").unwrap();

        let provider = LocalFsStorageProvider::new(dir.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        crate::engine::scan::ScanEngine::new(&repo, &provider, &config)
            .run(&dir.path().to_string_lossy(), false, &AtomicBool::new(false))
            .unwrap();

        let missing_id = dir.path().join("missing.txt").to_string_lossy().to_string();
        let b_id = dir.path().join("b.txt").to_string_lossy().to_string();
        let engine = CleanupEngine::new(&repo, &provider, &config);
        let summary = engine.delete_files(&[b_id.clone(), missing_id.clone()], &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.deleted, vec![b_id.clone()]);
        assert!(repo.get_file(&b_id).unwrap().is_none());
        assert!(repo.get_file(&dir.path().join("a.txt").to_string_lossy()).unwrap().is_some());
    }

    #[test]
    fn partial_failure_still_completes_the_progress_row() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"delete me").unwrap();

        let provider = LocalFsStorageProvider::new(dir.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        crate::engine::scan::ScanEngine::new(&repo, &provider, &config)
            .run(&dir.path().to_string_lossy(), false, &AtomicBool::new(false))
            .unwrap();

        let missing_id = dir.path().join("missing.txt").to_string_lossy().to_string();
        let b_id = dir.path().join("b.txt").to_string_lossy().to_string();
        let engine = CleanupEngine::new(&repo, &provider, &config);
        let summary = engine.delete_files(&[b_id, missing_id], &AtomicBool::new(false)).unwrap();
        assert_eq!(summary.failed.len(), 1);

        let rows = repo
            .list_progress_by_operation_type(crate::types::OperationType::FileCleanup, 0, 10)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, crate::types::JobStatus::Completed);
    }

    #[test]
    fn delete_by_pattern_matches_names_in_one_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.txt"), b"data").unwrap();
        fs::write(dir.path().join("keep.txt"), b"data").unwrap();

        let provider = LocalFsStorageProvider::new(dir.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        let engine = CleanupEngine::new(&repo, &provider, &config);

        let summary = engine
            .delete_by_pattern(&dir.path().to_string_lossy(), r"^report", &AtomicBool::new(false))
            .unwrap();
        assert_eq!(summary.deleted.len(), 1);
        assert!(dir.path().join("keep.txt").exists());
        assert!(!dir.path().join("report.txt").exists());
    }
}
