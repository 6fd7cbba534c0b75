//! Comparison result entity (spec.md §3 "Comparison result").

use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonResult {
    pub id: i64,
    pub source_folder_id: String,
    pub target_folder_id: String,
    pub source_folder_name: String,
    pub target_folder_name: String,
    pub source_file_count: i64,
    pub target_file_count: i64,
    pub duplicate_count: i64,
    pub source_total_size: u64,
    pub target_total_size: u64,
    pub duplicate_size: u64,
    pub can_delete_target_folder: bool,
    pub duplication_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComparisonResult {
    /// `duplication_percentage = duplicate / target * 100`, 0 when target is empty.
    pub fn compute_percentage(duplicate_count: i64, target_file_count: i64) -> f64 {
        if target_file_count > 0 {
            (duplicate_count as f64 / target_file_count as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn compute_can_delete(percentage: f64) -> bool {
        percentage >= 100.0
    }

    /// Korean summary string, spec.md §6.
    pub fn summary(&self) -> String {
        if self.duplicate_count == 0 {
            "중복 파일이 발견되지 않았습니다".to_string()
        } else {
            format!(
                "총 {} 파일 중 {}개 중복 파일 발견 ({:.1}%), {} 절약 가능",
                self.target_file_count,
                self.duplicate_count,
                self.duplication_percentage,
                crate::format::human_size(self.duplicate_size),
            )
        }
    }
}

/// A single duplicate-in-target file, part of a comparison's member set.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonDuplicateFile {
    pub comparison_id: i64,
    pub file_id: String,
}
