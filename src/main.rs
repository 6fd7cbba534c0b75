//! `dedrive` CLI: scan, hash, dedupe, compare and clean up a folder tree
//! through `LocalFsStorageProvider` — a demo harness over the library, not
//! the service surface a real cloud-backed deployment would run.
mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use cli::{Cli, Commands};
use dedrive::config::Config;
use dedrive::engine::cleanup::CleanupEngine;
use dedrive::engine::compare::CompareEngine;
use dedrive::engine::dedupe::DedupeEngine;
use dedrive::engine::hash::HashEngine;
use dedrive::engine::scan::ScanEngine;
use dedrive::format::human_size;
use dedrive::logging::setup_logging;
use dedrive::provider::LocalFsStorageProvider;
use dedrive::repository::Repository;
use dedrive::supervisor::JobSupervisor;
use dedrive::types::OperationType;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let db_path = cli.db.clone().unwrap_or_else(|| PathBuf::from("dedrive.db"));
    let repo = Repository::open(&db_path).context("opening database")?;
    let config = Config::load(db_path.parent().unwrap_or_else(|| std::path::Path::new(".")));
    let supervisor = JobSupervisor::new(&repo);

    match cli.command {
        Commands::Scan { folder, recursive } => {
            let operation_type = OperationType::FileScan;
            let token = supervisor.acquire(operation_type)?;
            let provider = LocalFsStorageProvider::new(&folder).with_page_size(config.scan_page_size);
            let result = ScanEngine::new(&repo, &provider, &config).run(
                &folder.to_string_lossy(),
                recursive,
                token.flag(),
            );
            supervisor.release(operation_type);
            let summary = result?;
            println!("scanned {} files", summary.files_scanned);
        }
        Commands::Hash => {
            let operation_type = OperationType::HashCalculation;
            let token = supervisor.acquire(operation_type)?;
            // Any previously scanned folder works as the download root for
            // its own files, since ids are absolute paths; "." only matters
            // for folders this provider instance would need to list.
            let provider = LocalFsStorageProvider::new(".");
            let result = HashEngine::new(&repo, &provider, &config).run(token.flag());
            supervisor.release(operation_type);
            let summary = result?;
            println!(
                "hashed {}, skipped {}, failed {}",
                summary.hashed, summary.skipped, summary.failed
            );
        }
        Commands::Dedupe => {
            let operation_type = OperationType::DuplicateSearch;
            let _token = supervisor.acquire(operation_type)?;
            let result = DedupeEngine::new(&repo).full_refresh();
            supervisor.release(operation_type);
            let stats = result?;
            println!(
                "{} duplicate groups, {} wasted",
                stats.total_groups,
                human_size(stats.total_wasted_bytes)
            );
        }
        Commands::Compare { source, target } => {
            let operation_type = OperationType::FolderComparison;
            let token = supervisor.acquire(operation_type)?;
            let provider = LocalFsStorageProvider::new(".");
            let result = CompareEngine::new(&repo, &provider, &config).run(
                &source.to_string_lossy(),
                &target.to_string_lossy(),
                token.flag(),
            );
            supervisor.release(operation_type);
            let result = result?;
            println!(
                "{} of {} target files duplicate {} ({:.1}%), can delete target: {}",
                result.duplicate_count,
                result.target_file_count,
                human_size(result.duplicate_size),
                result.duplication_percentage,
                result.can_delete_target_folder
            );
        }
        Commands::Cleanup { ids } => {
            let operation_type = OperationType::FileCleanup;
            let token = supervisor.acquire(operation_type)?;
            let provider = LocalFsStorageProvider::new(".");
            let result = CleanupEngine::new(&repo, &provider, &config).delete_files(&ids, token.flag());
            supervisor.release(operation_type);
            let summary = result?;
            println!("deleted {}, failed {}", summary.deleted.len(), summary.failed.len());
        }
    }

    log::debug!("total time: {:?}", start_time.elapsed());
    Ok(())
}
