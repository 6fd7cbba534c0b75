//! Folder comparator (spec.md §4.8, C8): resolves two folders, scans both
//! recursively, narrows target candidates by size, hashes candidates, and
//! persists the duplicate set as one comparison result.
//!
//! Resumability (spec.md §4.8, §9 DESIGN NOTES) is achieved by making every
//! phase's side effect idempotent (metadata upserts, hash marks, the
//! comparison row upsert) rather than by replaying a stored checkpoint: a
//! paused-then-rerun comparison repeats cheap work instead of skipping it,
//! but never double-counts or corrupts state. The `ComparisonPhase`
//! recorded in progress metadata is for observability of where a running
//! job currently stands.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::engine::hash::HashEngine;
use crate::engine::scan::ScanEngine;
use crate::errors::CoreError;
use crate::progress_tracker::ProgressTracker;
use crate::provider::{with_timeout, StorageProvider};
use crate::repository::Repository;
use crate::types::{ComparisonPhase, ComparisonResult, OperationType, StepMetadata};

pub struct CompareEngine<'a> {
    repo: &'a Repository,
    provider: &'a dyn StorageProvider,
    config: &'a Config,
}

impl<'a> CompareEngine<'a> {
    pub fn new(repo: &'a Repository, provider: &'a dyn StorageProvider, config: &'a Config) -> Self {
        Self { repo, provider, config }
    }

    pub fn run(
        &self,
        source_folder_id: &str,
        target_folder_id: &str,
        cancelled: &AtomicBool,
    ) -> Result<ComparisonResult, CoreError> {
        let mut tracker = ProgressTracker::start(self.repo, OperationType::FolderComparison, 0)?;
        let result = self.run_inner(source_folder_id, target_folder_id, &mut tracker, cancelled);
        match &result {
            Ok(_) => tracker.complete()?,
            Err(_) if cancelled.load(Ordering::Relaxed) => tracker.pause()?,
            Err(e) => tracker.fail(&e.to_string())?,
        }
        result
    }

    fn run_inner(
        &self,
        source_folder_id: &str,
        target_folder_id: &str,
        tracker: &mut ProgressTracker,
        cancelled: &AtomicBool,
    ) -> Result<ComparisonResult, CoreError> {
        self.checkpoint(tracker, ComparisonPhase::Resolve, 0, 0, 0, 0)?;
        let source_folder = with_timeout(self.config.provider_timeout_secs, || self.provider.get(source_folder_id))?;
        let target_folder = with_timeout(self.config.provider_timeout_secs, || self.provider.get(target_folder_id))?;

        self.checkpoint(tracker, ComparisonPhase::ScanSource, 0, 0, 0, 0)?;
        let source_scan = ScanEngine::new(self.repo, self.provider, self.config)
            .run(source_folder_id, true, cancelled)?;

        self.checkpoint(tracker, ComparisonPhase::ScanTarget, source_scan.files_scanned, 0, 0, 0)?;
        let target_scan = ScanEngine::new(self.repo, self.provider, self.config)
            .run(target_folder_id, true, cancelled)?;

        self.checkpoint(
            tracker,
            ComparisonPhase::Intersect,
            source_scan.files_scanned,
            0,
            target_scan.files_scanned,
            0,
        )?;
        // `id`s are provider-scoped (e.g. absolute paths for the local-fs
        // provider), so a prefix match over `id` reliably scopes each side
        // to its own subtree regardless of how `path` was built.
        let source_files: Vec<_> = self
            .repo
            .list_files_paginated(0, i64::MAX)?
            .into_iter()
            .filter(|f| f.id.starts_with(source_folder_id) && f.id != source_folder_id)
            .collect();
        let target_files: Vec<_> = self
            .repo
            .list_files_paginated(0, i64::MAX)?
            .into_iter()
            .filter(|f| f.id.starts_with(target_folder_id) && f.id != target_folder_id)
            .collect();

        let source_sizes: std::collections::HashSet<u64> = source_files.iter().map(|f| f.size).collect();
        let candidate_ids: Vec<String> = target_files
            .iter()
            .filter(|f| source_sizes.contains(&f.size))
            .map(|f| f.id.clone())
            .collect();
        let candidate_sizes: std::collections::HashSet<u64> = target_files
            .iter()
            .filter(|f| source_sizes.contains(&f.size))
            .map(|f| f.size)
            .collect();
        // The source counterparts: only the source files whose size matches
        // a candidate actually need hashing, not the whole source tree.
        let source_ids_to_hash: Vec<String> = source_files
            .iter()
            .filter(|f| candidate_sizes.contains(&f.size))
            .map(|f| f.id.clone())
            .collect();

        self.checkpoint(
            tracker,
            ComparisonPhase::Hash,
            source_scan.files_scanned,
            target_scan.files_scanned,
            target_scan.files_scanned,
            0,
        )?;
        if cancelled.load(Ordering::Relaxed) {
            return Err(CoreError::Internal("comparison cancelled".to_string()));
        }
        // Hash exactly the candidate files (both sides) that still lack a
        // hash, folding that pass's rate/ETA into this comparison's own
        // progress row instead of spawning a separate `HashCalculation` one.
        let hash_ids: Vec<String> = source_ids_to_hash.iter().cloned().chain(candidate_ids.iter().cloned()).collect();
        HashEngine::new(self.repo, self.provider, self.config).run_for_ids(&hash_ids, tracker, cancelled)?;

        self.checkpoint(
            tracker,
            ComparisonPhase::Match,
            source_scan.files_scanned,
            target_scan.files_scanned,
            target_scan.files_scanned,
            0,
        )?;
        // Re-fetch source files: hashing just ran and the `source_files`
        // snapshot above predates it, so its `hash`/`hash_calculated` fields
        // are stale.
        let source_hashes: std::collections::HashSet<String> = source_ids_to_hash
            .iter()
            .filter_map(|id| self.repo.get_file(id).ok().flatten())
            .filter(|f| f.hash_calculated)
            .filter_map(|f| f.hash)
            .collect();

        let mut duplicate_ids = Vec::new();
        let mut duplicate_size = 0u64;
        for id in &candidate_ids {
            if let Some(f) = self.repo.get_file(id)?
                && f.hash_calculated
                && let Some(hash) = &f.hash
                && source_hashes.contains(hash)
            {
                duplicate_size += f.size;
                duplicate_ids.push(f.id);
            }
        }

        self.checkpoint(
            tracker,
            ComparisonPhase::Persist,
            source_scan.files_scanned,
            target_scan.files_scanned,
            target_scan.files_scanned,
            target_scan.files_scanned,
        )?;

        let duplicate_count = duplicate_ids.len() as i64;
        let duplication_percentage =
            ComparisonResult::compute_percentage(duplicate_count, target_scan.files_scanned);
        let now = chrono::Utc::now();
        let result = ComparisonResult {
            id: 0,
            source_folder_id: source_folder_id.to_string(),
            target_folder_id: target_folder_id.to_string(),
            source_folder_name: source_folder.name,
            target_folder_name: target_folder.name,
            source_file_count: source_scan.files_scanned,
            target_file_count: target_scan.files_scanned,
            duplicate_count,
            source_total_size: source_files.iter().map(|f| f.size).sum(),
            target_total_size: target_files.iter().map(|f| f.size).sum(),
            duplicate_size,
            can_delete_target_folder: ComparisonResult::compute_can_delete(duplication_percentage),
            duplication_percentage,
            created_at: now,
            updated_at: now,
        };

        let id = match self.repo.find_comparison_by_source_and_target(source_folder_id, target_folder_id)? {
            Some(existing) => {
                self.repo.update_comparison(existing.id, &result, &duplicate_ids)?;
                existing.id
            }
            None => self.repo.insert_comparison(&result, &duplicate_ids)?,
        };

        Ok(ComparisonResult { id, ..result })
    }

    #[allow(clippy::too_many_arguments)]
    fn checkpoint(
        &self,
        tracker: &mut ProgressTracker,
        phase: ComparisonPhase,
        source_scanned: i64,
        source_total: i64,
        target_scanned: i64,
        target_total: i64,
    ) -> Result<(), CoreError> {
        let metadata = StepMetadata::FolderComparison {
            phase,
            source_folder_scanned: source_scanned,
            source_folder_total: source_total,
            target_folder_scanned: target_scanned,
            target_folder_total: target_total,
        };
        tracker.increment(0, phase_label(phase), &metadata)
    }
}

fn phase_label(phase: ComparisonPhase) -> &'static str {
    match phase {
        ComparisonPhase::Resolve => "resolving",
        ComparisonPhase::ScanSource => "scanning-source",
        ComparisonPhase::ScanTarget => "scanning-target",
        ComparisonPhase::Intersect => "intersecting",
        ComparisonPhase::Hash => "hashing",
        ComparisonPhase::Match => "matching",
        ComparisonPhase::Persist => "persisting",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LocalFsStorageProvider;
    use std::fs;

    #[test]
    fn full_duplication_marks_target_deletable() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("source");
        let target = root.path().join("target");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), b"identical bytes").unwrap();
        fs::write(target.join("a-copy.txt"), b"identical bytes").unwrap();

        let provider = LocalFsStorageProvider::new(root.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        let engine = CompareEngine::new(&repo, &provider, &config);

        let result = engine
            .run(&source.to_string_lossy(), &target.to_string_lossy(), &AtomicBool::new(false))
            .unwrap();
        assert_eq!(result.duplicate_count, 1);
        assert!(result.can_delete_target_folder);
    }

    #[test]
    fn size_match_but_different_content_is_not_a_duplicate() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("source");
        let target = root.path().join("target");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), b"AAAAAAAAAA").unwrap();
        fs::write(target.join("b.txt"), b"BBBBBBBBBB").unwrap();

        let provider = LocalFsStorageProvider::new(root.path());
        let repo = Repository::open_in_memory().unwrap();
        let config = Config::default();
        let engine = CompareEngine::new(&repo, &provider, &config);

        let result = engine
            .run(&source.to_string_lossy(), &target.to_string_lossy(), &AtomicBool::new(false))
            .unwrap();
        assert_eq!(result.duplicate_count, 0);
        assert!(!result.can_delete_target_folder);
    }
}
