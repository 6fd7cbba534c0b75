//! `dedrive` CLI: a thin demo harness over the library, wiring
//! `LocalFsStorageProvider` to the pipeline. Stands in for the real
//! service surface that would drive this against an OAuth'd cloud drive.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Clone, Parser)]
#[command(name = "dedrive")]
#[command(about = "Scan, hash, dedupe and compare folders for duplicate files.")]
pub struct Cli {
    /// Path to the SQLite database. Default: `dedrive.db` in the current directory.
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Verbose logging.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Walk a folder and record file metadata.
    Scan {
        folder: PathBuf,
        /// Recurse into subfolders.
        #[arg(long, short)]
        recursive: bool,
    },
    /// Hash every file the scan engine has not yet hashed.
    Hash,
    /// Rebuild duplicate groups from already-hashed files.
    Dedupe,
    /// Compare two folders and report the overlap.
    Compare { source: PathBuf, target: PathBuf },
    /// Delete files by id.
    Cleanup {
        #[arg(long, num_args = 1..)]
        ids: Vec<String>,
    },
}
