//! End-to-end pipeline tests: scan, hash, dedupe, compare and the
//! supervisor's stuck-job reaper exercised together through the public API.

use std::fs;
use std::sync::atomic::AtomicBool;

use dedrive::config::Config;
use dedrive::engine::compare::CompareEngine;
use dedrive::engine::dedupe::DedupeEngine;
use dedrive::engine::hash::HashEngine;
use dedrive::engine::scan::ScanEngine;
use dedrive::provider::LocalFsStorageProvider;
use dedrive::repository::Repository;
use dedrive::supervisor::JobSupervisor;
use dedrive::types::{JobStatus, OperationType};

#[test]
fn scanning_an_empty_folder_finds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let provider = LocalFsStorageProvider::new(dir.path());
    let repo = Repository::open_in_memory().unwrap();
    let config = Config::default();

    let summary = ScanEngine::new(&repo, &provider, &config)
        .run(&dir.path().to_string_lossy(), false, &AtomicBool::new(false))
        .unwrap();
    assert_eq!(summary.files_scanned, 0);
    assert_eq!(repo.file_count().unwrap(), 0);
}

#[test]
fn two_identical_files_form_one_duplicate_group_after_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"same payload").unwrap();
    fs::write(dir.path().join("b.txt"), b"same payload").unwrap();
    fs::write(dir.path().join("c.txt"), b"different payload").unwrap();

    let provider = LocalFsStorageProvider::new(dir.path());
    let repo = Repository::open_in_memory().unwrap();
    let config = Config::default();
    let cancelled = AtomicBool::new(false);

    ScanEngine::new(&repo, &provider, &config)
        .run(&dir.path().to_string_lossy(), false, &cancelled)
        .unwrap();
    let hash_summary = HashEngine::new(&repo, &provider, &config).run(&cancelled).unwrap();
    assert_eq!(hash_summary.hashed, 3);

    let stats = DedupeEngine::new(&repo).full_refresh().unwrap();
    assert_eq!(stats.total_groups, 1);
    assert_eq!(stats.total_wasted_bytes, "same payload".len() as u64);
}

#[test]
fn comparing_a_fully_duplicated_folder_marks_target_deletable() {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("source");
    let target = root.path().join("target");
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&target).unwrap();
    fs::write(source.join("report.csv"), b"row,row,row").unwrap();
    fs::write(target.join("report-copy.csv"), b"row,row,row").unwrap();

    let provider = LocalFsStorageProvider::new(root.path());
    let repo = Repository::open_in_memory().unwrap();
    let config = Config::default();
    let result = CompareEngine::new(&repo, &provider, &config)
        .run(&source.to_string_lossy(), &target.to_string_lossy(), &AtomicBool::new(false))
        .unwrap();

    assert_eq!(result.duplicate_count, 1);
    assert!(result.can_delete_target_folder);
}

#[test]
fn comparing_folders_with_same_size_but_different_content_finds_no_duplicate() {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("source");
    let target = root.path().join("target");
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&target).unwrap();
    fs::write(source.join("x.bin"), b"0123456789").unwrap();
    fs::write(target.join("y.bin"), b"9876543210").unwrap();

    let provider = LocalFsStorageProvider::new(root.path());
    let repo = Repository::open_in_memory().unwrap();
    let config = Config::default();
    let result = CompareEngine::new(&repo, &provider, &config)
        .run(&source.to_string_lossy(), &target.to_string_lossy(), &AtomicBool::new(false))
        .unwrap();

    assert_eq!(result.duplicate_count, 0);
    assert!(!result.can_delete_target_folder);
}

#[test]
fn cancelling_mid_hash_leaves_the_file_unprocessed_for_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"will be interrupted").unwrap();

    let provider = LocalFsStorageProvider::new(dir.path());
    let repo = Repository::open_in_memory().unwrap();
    let config = Config::default();
    ScanEngine::new(&repo, &provider, &config)
        .run(&dir.path().to_string_lossy(), false, &AtomicBool::new(false))
        .unwrap();

    let already_cancelled = AtomicBool::new(true);
    HashEngine::new(&repo, &provider, &config).run(&already_cancelled).unwrap();

    let id = dir.path().join("a.txt").to_string_lossy().to_string();
    let file = repo.get_file(&id).unwrap().unwrap();
    assert!(!file.hash_calculated);
    assert!(file.hash.is_none());
    assert!(file.hash_skip_reason.is_none());

    let fresh_run = AtomicBool::new(false);
    let summary = HashEngine::new(&repo, &provider, &config).run(&fresh_run).unwrap();
    assert_eq!(summary.hashed, 1);
}

#[test]
fn comparing_folders_folds_hashing_into_the_comparison_progress_row() {
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
    CompareEngine::new(&repo, &provider, &config)
        .run(&source.to_string_lossy(), &target.to_string_lossy(), &AtomicBool::new(false))
        .unwrap();

    let comparison_rows = repo
        .list_progress_by_operation_type(OperationType::FolderComparison, 0, 10)
        .unwrap();
    assert_eq!(comparison_rows.len(), 1);
    assert_eq!(comparison_rows[0].status, JobStatus::Completed);

    // The hash pass folds into the comparison's own row instead of starting
    // a separate one.
    let hash_rows = repo
        .list_progress_by_operation_type(OperationType::HashCalculation, 0, 10)
        .unwrap();
    assert!(hash_rows.is_empty());
}

#[test]
fn stuck_job_reaper_fails_rows_a_crashed_worker_left_running() {
    let repo = Repository::open_in_memory().unwrap();
    let supervisor = JobSupervisor::new(&repo);
    let id = repo.create_progress(OperationType::FileScan, 100).unwrap();
    repo.update_progress(id, 10, 100, JobStatus::Running, "scanning", &Default::default())
        .unwrap();

    let reaped = supervisor.reap_stuck(-1).unwrap();
    assert_eq!(reaped, 1);

    let row = repo.get_progress(id).unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Failed);

    // A fresh scan of the same operation type is no longer blocked.
    assert!(supervisor.acquire(OperationType::FileScan).is_ok());
}
