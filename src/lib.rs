//! Duplicate-file detection and cleanup pipeline for a remote cloud drive.
//!
//! Scans a folder tree through a [`provider::StorageProvider`], hashes
//! files, groups duplicates by content hash, compares two folders for
//! overlap, and cleans up the result — all progress durably tracked in a
//! SQLite-backed [`repository::Repository`].

pub mod config;
pub mod engine;
pub mod errors;
pub mod format;
pub mod hashing;
pub mod logging;
pub mod progress_tracker;
pub mod provider;
pub mod repository;
pub mod supervisor;
pub mod types;
