//! Hash engine (spec.md §4.6, C6): a bounded worker pool that streams each
//! unhashed file through the configured digest, records the outcome, and
//! never reprocesses a permanently-skipped file.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::errors::CoreError;
use crate::hashing::{self, HashOutcome};
use crate::progress_tracker::ProgressTracker;
use crate::provider::{with_timeout, StorageProvider};
use crate::repository::Repository;
use crate::types::{File, OperationType, StepMetadata};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashSummary {
    pub hashed: i64,
    pub skipped: i64,
    pub failed: i64,
}

enum WorkerOutcome {
    Hashed { id: String, name: String, hash: String },
    Skipped { id: String, reason: String },
    Failed { id: String, reason: String },
    /// Cancelled mid-hash: left untouched so the next run retries it.
    Cancelled,
}

pub struct HashEngine<'a> {
    repo: &'a Repository,
    provider: &'a dyn StorageProvider,
    config: &'a Config,
}

impl<'a> HashEngine<'a> {
    pub fn new(repo: &'a Repository, provider: &'a dyn StorageProvider, config: &'a Config) -> Self {
        Self { repo, provider, config }
    }

    pub fn run(&self, cancelled: &AtomicBool) -> Result<HashSummary, CoreError> {
        let pending = self.repo.iter_files_without_hash(usize::MAX / 2)?;
        let mut tracker = ProgressTracker::start(self.repo, OperationType::HashCalculation, pending.len() as i64)?;
        tracker.run("hashing")?;

        let result = self.hash_files(pending, &mut tracker, cancelled);
        match &result {
            Ok(_) if cancelled.load(Ordering::Relaxed) => tracker.pause()?,
            Ok(_) => tracker.complete()?,
            Err(e) => tracker.fail(&e.to_string())?,
        }
        result
    }

    /// Hash exactly `ids` — used by the folder comparator (spec.md §4.8
    /// step 4) to hash only the candidate set and its size-matching source
    /// counterparts, reporting progress through the caller's own tracker
    /// instead of starting a separate `HashCalculation` row. Files already
    /// hashed or permanently skipped are left untouched.
    pub fn run_for_ids(
        &self,
        ids: &[String],
        tracker: &mut ProgressTracker,
        cancelled: &AtomicBool,
    ) -> Result<HashSummary, CoreError> {
        let pending: Vec<File> = ids
            .iter()
            .filter_map(|id| self.repo.get_file(id).ok().flatten())
            .filter(|f| !f.hash_calculated && f.hash_skip_reason.is_none())
            .collect();
        self.hash_files(pending, tracker, cancelled)
    }

    fn hash_files(
        &self,
        pending: Vec<File>,
        tracker: &mut ProgressTracker,
        cancelled: &AtomicBool,
    ) -> Result<HashSummary, CoreError> {
        let workers = self.config.hash_workers.max(1).min(pending.len().max(1));
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<File>();
        let (out_tx, out_rx) = crossbeam_channel::unbounded::<WorkerOutcome>();
        for f in &pending {
            let _ = job_tx.send(f.clone());
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let out_tx = out_tx.clone();
                scope.spawn(move || {
                    while let Ok(file) = job_rx.recv() {
                        if cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                        let outcome = self.hash_one(&file, cancelled);
                        let _ = out_tx.send(outcome);
                    }
                });
            }
            drop(out_tx);
        });

        let mut summary = HashSummary::default();
        let mut processed = 0i64;
        for outcome in out_rx {
            processed += 1;
            match outcome {
                WorkerOutcome::Hashed { id, name, hash } => {
                    self.repo.mark_file_hashed(&id, &hash)?;
                    summary.hashed += 1;
                    tracker.increment(
                        1,
                        "hashing",
                        &StepMetadata::HashCalculation {
                            current_file_name: name,
                            rate_files_per_sec: tracker.rate_per_sec(),
                            eta_seconds: tracker.eta_seconds(),
                        },
                    )?;
                }
                WorkerOutcome::Skipped { id, reason } => {
                    self.repo.mark_file_hash_skip(&id, &reason)?;
                    summary.skipped += 1;
                    tracker.set_processed(processed, "hashing")?;
                }
                WorkerOutcome::Failed { id, reason } => {
                    self.repo.mark_file_hash_skip(&id, &format!("error: {reason}"))?;
                    summary.failed += 1;
                    tracker.set_processed(processed, "hashing")?;
                }
                WorkerOutcome::Cancelled => {
                    processed -= 1;
                }
            }
        }

        Ok(summary)
    }

    fn hash_one(&self, file: &File, cancelled: &AtomicBool) -> WorkerOutcome {
        let is_folder = file.is_folder(self.config.folder_mime.as_str());
        if let Some(reason) = hashing::classify(
            is_folder,
            file.size,
            &file.mime_type,
            self.config.max_hashable_size,
            &self.config.native_document_mime_prefixes,
        ) {
            return WorkerOutcome::Skipped { id: file.id.clone(), reason: reason.as_str().to_string() };
        }

        let mut last_err = None;
        for attempt in 0..self.config.retry_max_attempts {
            match self.try_hash(file, cancelled) {
                Ok(None) => return WorkerOutcome::Cancelled,
                Ok(Some(HashOutcome::Hashed(hash))) => {
                    return WorkerOutcome::Hashed { id: file.id.clone(), name: file.name.clone(), hash };
                }
                Ok(Some(HashOutcome::Skipped(reason))) => {
                    return WorkerOutcome::Skipped { id: file.id.clone(), reason: reason.as_str().to_string() };
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.config.retry_max_attempts => {
                    if !super::backoff_sleep(attempt, crate::config::RetryConsts::BASE_BACKOFF_MS, cancelled) {
                        return WorkerOutcome::Failed { id: file.id.clone(), reason: e.to_string() };
                    }
                    last_err = Some(e);
                }
                Err(e) => {
                    last_err = Some(e);
                    break;
                }
            }
        }
        WorkerOutcome::Failed {
            id: file.id.clone(),
            reason: last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown".to_string()),
        }
    }

    /// `Ok(None)` means the read was cancelled mid-stream (never a real skip).
    fn try_hash(&self, file: &File, cancelled: &AtomicBool) -> Result<Option<HashOutcome>, CoreError> {
        let reader = with_timeout(self.config.provider_timeout_secs, || self.provider.download(&file.id))?;
        let hash = hashing::hash_reader(reader, self.config.hash_algorithm, self.config.hash_buffer_size, cancelled)?;
        Ok(hash.map(HashOutcome::Hashed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LocalFsStorageProvider;
    use crate::repository::Repository;
    use std::fs;

    #[test]
    fn hashes_two_identical_files_into_the_same_digest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"same bytes").unwrap();
        fs::write(dir.path().join("b.txt"), b"same bytes").unwrap();

        let provider = LocalFsStorageProvider::new(dir.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();

        crate::engine::scan::ScanEngine::new(&repo, &provider, &config)
            .run(&dir.path().to_string_lossy(), false, &AtomicBool::new(false))
            .unwrap();

        let summary = HashEngine::new(&repo, &provider, &config)
            .run(&AtomicBool::new(false))
            .unwrap();
        assert_eq!(summary.hashed, 2);

        let a = repo
            .get_file(&dir.path().join("a.txt").to_string_lossy())
            .unwrap()
            .unwrap();
        let b = repo
            .get_file(&dir.path().join("b.txt").to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.unwrap().len(), crate::hashing::Algorithm::Sha256.hex_len());
    }

    #[test]
    fn zero_size_file_is_skipped_not_hashed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.txt"), b"").unwrap();

        let provider = LocalFsStorageProvider::new(dir.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        crate::engine::scan::ScanEngine::new(&repo, &provider, &config)
            .run(&dir.path().to_string_lossy(), false, &AtomicBool::new(false))
            .unwrap();

        let summary = HashEngine::new(&repo, &provider, &config)
            .run(&AtomicBool::new(false))
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.hashed, 0);
    }
}
