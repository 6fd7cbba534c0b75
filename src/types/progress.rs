//! Progress row entity (spec.md §3 "Progress row", §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of job kinds (spec.md §3). Also the supervisor's singleton key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    FileScan,
    DuplicateSearch,
    FolderComparison,
    HashCalculation,
    FileCleanup,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::FileScan => "file-scan",
            OperationType::DuplicateSearch => "duplicate-search",
            OperationType::FolderComparison => "folder-comparison",
            OperationType::HashCalculation => "hash-calculation",
            OperationType::FileCleanup => "file-cleanup",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "file-scan" => OperationType::FileScan,
            "duplicate-search" => OperationType::DuplicateSearch,
            "folder-comparison" => OperationType::FolderComparison,
            "hash-calculation" => OperationType::HashCalculation,
            "file-cleanup" => OperationType::FileCleanup,
            _ => return None,
        })
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle state (spec.md §3, §4.4, §4.8 state machine).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "paused" => JobStatus::Paused,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// Durable record of one long-running job (spec.md §3, §6 `progress` table).
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    pub id: i64,
    pub operation_type: OperationType,
    pub processed_items: i64,
    pub total_items: i64,
    pub status: JobStatus,
    pub current_step: String,
    pub error_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Progress {
    pub fn percentage(&self) -> f64 {
        if self.total_items > 0 {
            (self.processed_items as f64 / self.total_items as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Closed per-operation-type metadata keys (DESIGN NOTES: tagged union, not
/// a free-form map, for internal consumers). Serialized into `Progress::metadata`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "phase_kind")]
pub enum StepMetadata {
    Scan {
        folder_id: String,
    },
    HashCalculation {
        current_file_name: String,
        rate_files_per_sec: f64,
        eta_seconds: Option<f64>,
    },
    FolderComparison {
        phase: ComparisonPhase,
        source_folder_scanned: i64,
        source_folder_total: i64,
        target_folder_scanned: i64,
        target_folder_total: i64,
    },
}

/// Resumability checkpoint for the folder comparator (spec.md §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonPhase {
    Resolve,
    ScanSource,
    ScanTarget,
    Intersect,
    Hash,
    Match,
    Persist,
}

impl StepMetadata {
    pub fn to_map(&self) -> HashMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }
}
