//! Scan engine (spec.md §4.5, C5): walks a provider folder (flat or
//! recursive), persisting metadata-only batches as it goes so a crash
//! mid-scan loses at most one unflushed batch.

use std::sync::atomic::AtomicBool;

use crate::config::{Config, PoolConsts};
use crate::engine::with_retry;
use crate::errors::CoreError;
use crate::progress_tracker::ProgressTracker;
use crate::provider::{with_timeout, StorageProvider};
use crate::repository::Repository;
use crate::types::{File, OperationType, StepMetadata};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_scanned: i64,
}

pub struct ScanEngine<'a> {
    repo: &'a Repository,
    provider: &'a dyn StorageProvider,
    config: &'a Config,
}

impl<'a> ScanEngine<'a> {
    pub fn new(repo: &'a Repository, provider: &'a dyn StorageProvider, config: &'a Config) -> Self {
        Self { repo, provider, config }
    }

    /// Scan `folder_id`, recursing into subfolders when `recursive` is set.
    pub fn run(
        &self,
        folder_id: &str,
        recursive: bool,
        cancelled: &AtomicBool,
    ) -> Result<ScanSummary, CoreError> {
        let mut tracker = ProgressTracker::start(self.repo, OperationType::FileScan, 0)?;
        tracker.run("listing")?;

        let result = if recursive {
            self.run_recursive(folder_id, &mut tracker, cancelled)
        } else {
            self.run_flat(folder_id, &mut tracker, cancelled)
        };

        match &result {
            Ok(_) => tracker.complete()?,
            Err(e) => tracker.fail(&e.to_string())?,
        }
        result
    }

    fn run_flat(
        &self,
        folder_id: &str,
        tracker: &mut ProgressTracker,
        cancelled: &AtomicBool,
    ) -> Result<ScanSummary, CoreError> {
        let mut page_token: Option<String> = None;
        let mut scanned = 0i64;
        loop {
            if cancelled.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(CoreError::Internal("scan cancelled".to_string()));
            }
            let page = with_retry(cancelled, self.config.retry_max_attempts, || {
                with_timeout(self.config.provider_timeout_secs, || {
                    self.provider.list_children(folder_id, page_token.as_deref())
                })
            })?;
            scanned += page.files.len() as i64;
            self.flush_batch(&page.files)?;
            tracker.increment(
                page.files.len() as i64,
                "scanning",
                &StepMetadata::Scan { folder_id: folder_id.to_string() },
            )?;
            // The scan doesn't know its total up front (paginated listing),
            // so `total` tracks alongside `processed` as each page lands —
            // a completed scan ends with both equal to the file count.
            tracker.set_total(scanned)?;
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(ScanSummary { files_scanned: scanned })
    }

    fn run_recursive(
        &self,
        folder_id: &str,
        tracker: &mut ProgressTracker,
        cancelled: &AtomicBool,
    ) -> Result<ScanSummary, CoreError> {
        let files = with_retry(cancelled, self.config.retry_max_attempts, || {
            with_timeout(self.config.provider_timeout_secs, || self.provider.list_recursive(folder_id))
        })?;
        let mut scanned = 0i64;
        for batch in files.chunks(PoolConsts::DB_BATCH_SIZE) {
            if cancelled.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(CoreError::Internal("scan cancelled".to_string()));
            }
            self.flush_batch(batch)?;
            scanned += batch.len() as i64;
            tracker.increment(
                batch.len() as i64,
                "scanning",
                &StepMetadata::Scan { folder_id: folder_id.to_string() },
            )?;
            tracker.set_total(scanned)?;
        }
        Ok(ScanSummary { files_scanned: scanned })
    }

    fn flush_batch(&self, batch: &[File]) -> Result<(), CoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.repo.upsert_files_metadata(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LocalFsStorageProvider;
    use std::fs;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn flat_scan_persists_metadata_only_rows() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("b.txt"), b"world").unwrap();

        let provider = LocalFsStorageProvider::new(dir.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        let engine = ScanEngine::new(&repo, &provider, &config);
        let cancelled = AtomicBool::new(false);

        let summary = engine
            .run(&dir.path().to_string_lossy(), false, &cancelled)
            .unwrap();
        assert_eq!(summary.files_scanned, 2);
        assert_eq!(repo.file_count().unwrap(), 2);
    }

    #[test]
    fn completed_scan_ends_with_processed_equal_to_total() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("b.txt"), b"world").unwrap();
        fs::write(dir.path().join("c.txt"), b"!").unwrap();

        let provider = LocalFsStorageProvider::new(dir.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        let engine = ScanEngine::new(&repo, &provider, &config);

        engine
            .run(&dir.path().to_string_lossy(), false, &AtomicBool::new(false))
            .unwrap();

        let rows = repo.list_progress_by_operation_type(OperationType::FileScan, 0, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].processed_items, 3);
        assert_eq!(rows[0].total_items, 3);
    }

    #[test]
    fn rescan_never_clobbers_an_existing_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();

        let provider = LocalFsStorageProvider::new(dir.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        let engine = ScanEngine::new(&repo, &provider, &config);
        let cancelled = AtomicBool::new(false);

        engine.run(&dir.path().to_string_lossy(), false, &cancelled).unwrap();
        let id = path.to_string_lossy().to_string();
        repo.mark_file_hashed(&id, "deadbeef").unwrap();

        engine.run(&dir.path().to_string_lossy(), false, &cancelled).unwrap();
        let f = repo.get_file(&id).unwrap().unwrap();
        assert!(f.hash_calculated);
        assert_eq!(f.hash.as_deref(), Some("deadbeef"));
    }
}
