//! Application configuration: tunables in one place, with an optional
//! `dedrive.toml` override (mirrors the teacher's `.nefaxer.toml` loader).

use serde::Deserialize;
use std::path::Path;

use crate::hashing::Algorithm;

/// Hashing I/O thresholds and buffer sizes (spec.md §4.2).
pub struct HashingConsts;

impl HashingConsts {
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
}

/// Retry/backoff tuning shared by scan, hash and cleanup (spec.md §4.5, §5).
#[derive(Clone, Copy, Debug)]
pub struct RetryConsts;

impl RetryConsts {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const BASE_BACKOFF_MS: u64 = 1000;
}

/// Worker pool and batching tunables.
#[derive(Clone, Copy, Debug)]
pub struct PoolConsts;

impl PoolConsts {
    pub const DEFAULT_HASH_WORKERS: usize = 4;
    pub const MIN_HASH_WORKERS: usize = 1;
    pub const MAX_HASH_WORKERS: usize = 20;
    pub const DEFAULT_DELETE_WORKERS: usize = 5;
    pub const SCAN_PAGE_SIZE_CAP: usize = 1000;
    pub const DB_BATCH_SIZE: usize = 500;
    /// EWMA smoothing factor for the hash engine's throughput estimator (spec.md §4.6).
    pub const THROUGHPUT_EWMA_ALPHA: f64 = 0.2;
}

/// Whole-crate runtime configuration. Defaults match the values the spec
/// states explicitly; overridden by an optional `dedrive.toml` next to the
/// database, then by values the caller sets directly on the struct.
#[derive(Clone, Debug)]
pub struct Config {
    pub hash_algorithm: Algorithm,
    pub hash_buffer_size: usize,
    pub max_hashable_size: u64,
    pub hash_workers: usize,
    pub delete_workers: usize,
    pub provider_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub stuck_job_threshold_secs: i64,
    pub scan_page_size: usize,
    pub folder_mime: String,
    /// MIME prefixes the provider treats as native documents (unhashable).
    pub native_document_mime_prefixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash_algorithm: Algorithm::Sha256,
            hash_buffer_size: HashingConsts::DEFAULT_BUFFER_SIZE,
            max_hashable_size: HashingConsts::DEFAULT_MAX_FILE_SIZE,
            hash_workers: PoolConsts::DEFAULT_HASH_WORKERS,
            delete_workers: PoolConsts::DEFAULT_DELETE_WORKERS,
            provider_timeout_secs: 30,
            retry_max_attempts: RetryConsts::DEFAULT_MAX_ATTEMPTS,
            stuck_job_threshold_secs: 15 * 60,
            scan_page_size: PoolConsts::SCAN_PAGE_SIZE_CAP,
            folder_mime: "application/vnd.folder".to_string(),
            native_document_mime_prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    settings: ConfigFileSettings,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFileSettings {
    hash_algorithm: Option<String>,
    hash_buffer_size: Option<usize>,
    max_hashable_size: Option<u64>,
    hash_workers: Option<usize>,
    delete_workers: Option<usize>,
    provider_timeout_secs: Option<u64>,
    retry_max_attempts: Option<u32>,
    stuck_job_threshold_secs: Option<i64>,
    scan_page_size: Option<usize>,
}

impl Config {
    /// Load `dedrive.toml` from `dir` if present and apply it over the defaults.
    /// Returns defaults unchanged when the file is missing or unreadable.
    pub fn load(dir: &Path) -> Self {
        let mut cfg = Self::default();
        let path = dir.join("dedrive.toml");
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return cfg;
        };
        let file: ConfigFile = match toml::from_str(&contents) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("{}: {e}", path.display());
                return cfg;
            }
        };
        let s = file.settings;
        if let Some(alg) = s.hash_algorithm.as_deref().and_then(Algorithm::from_str_opt) {
            cfg.hash_algorithm = alg;
        }
        if let Some(v) = s.hash_buffer_size {
            cfg.hash_buffer_size = v;
        }
        if let Some(v) = s.max_hashable_size {
            cfg.max_hashable_size = v;
        }
        if let Some(v) = s.hash_workers {
            cfg.hash_workers = v.clamp(PoolConsts::MIN_HASH_WORKERS, PoolConsts::MAX_HASH_WORKERS);
        }
        if let Some(v) = s.delete_workers {
            cfg.delete_workers = v;
        }
        if let Some(v) = s.provider_timeout_secs {
            cfg.provider_timeout_secs = v;
        }
        if let Some(v) = s.retry_max_attempts {
            cfg.retry_max_attempts = v;
        }
        if let Some(v) = s.stuck_job_threshold_secs {
            cfg.stuck_job_threshold_secs = v;
        }
        if let Some(v) = s.scan_page_size {
            cfg.scan_page_size = v.min(PoolConsts::SCAN_PAGE_SIZE_CAP);
        }
        cfg
    }
}
