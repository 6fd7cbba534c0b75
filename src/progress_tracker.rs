//! Progress tracker (spec.md §4.4, C4): a handle over one `progress` row,
//! flushing every mutation straight through the repository rather than
//! buffering in memory. Each engine owns one tracker for its job's lifetime.

use crate::errors::CoreError;
use crate::repository::Repository;
use crate::types::{JobStatus, OperationType, Progress, StepMetadata};
use std::collections::HashMap;
use std::time::Instant;

/// Live handle over a durable progress row. Not `Clone`: one job, one tracker.
pub struct ProgressTracker<'a> {
    repo: &'a Repository,
    id: i64,
    operation_type: OperationType,
    started_at: Instant,
    processed: i64,
    total: i64,
    current_step: String,
}

impl<'a> ProgressTracker<'a> {
    /// Create the row (status `pending`) and return a tracker over it.
    pub fn start(repo: &'a Repository, operation_type: OperationType, total: i64) -> Result<Self, CoreError> {
        let id = repo.create_progress(operation_type, total)?;
        Ok(Self {
            repo,
            id,
            operation_type,
            started_at: Instant::now(),
            processed: 0,
            total,
            current_step: String::new(),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn snapshot(&self) -> Result<Option<Progress>, CoreError> {
        self.repo.get_progress(self.id)
    }

    /// Mark the job `running` and flush the current counts.
    pub fn run(&mut self, step: &str) -> Result<(), CoreError> {
        self.current_step = step.to_string();
        self.flush(JobStatus::Running, &HashMap::new())
    }

    /// Advance the processed count by `n` and flush with `metadata`.
    pub fn increment(&mut self, n: i64, step: &str, metadata: &StepMetadata) -> Result<(), CoreError> {
        self.processed += n;
        self.current_step = step.to_string();
        self.flush(JobStatus::Running, &metadata.to_map())
    }

    /// Overwrite the processed count directly (e.g. page-based counting
    /// where the caller already knows the running total).
    pub fn set_processed(&mut self, processed: i64, step: &str) -> Result<(), CoreError> {
        self.processed = processed;
        self.current_step = step.to_string();
        self.flush(JobStatus::Running, &HashMap::new())
    }

    pub fn set_total(&mut self, total: i64) -> Result<(), CoreError> {
        self.total = total;
        self.flush(JobStatus::Running, &HashMap::new())
    }

    pub fn pause(&mut self) -> Result<(), CoreError> {
        self.flush(JobStatus::Paused, &HashMap::new())
    }

    pub fn resume(&mut self) -> Result<(), CoreError> {
        self.flush(JobStatus::Running, &HashMap::new())
    }

    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.flush(JobStatus::Completed, &HashMap::new())
    }

    pub fn fail(&mut self, message: &str) -> Result<(), CoreError> {
        self.repo.fail_progress(self.id, message)
    }

    pub fn percentage(&self) -> f64 {
        if self.total > 0 {
            (self.processed as f64 / self.total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Linear ETA from the elapsed wall time and current rate. `None` until
    /// at least one item has been processed (spec.md §4.6 "eta null until
    /// first increment").
    pub fn eta_seconds(&self) -> Option<f64> {
        if self.processed <= 0 || self.total <= self.processed {
            return None;
        }
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let rate = self.processed as f64 / elapsed.max(0.001);
        if rate <= 0.0 {
            return None;
        }
        Some((self.total - self.processed) as f64 / rate)
    }

    pub fn rate_per_sec(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        self.processed as f64 / elapsed.max(0.001)
    }

    fn flush(&self, status: JobStatus, metadata: &HashMap<String, serde_json::Value>) -> Result<(), CoreError> {
        self.repo.update_progress(
            self.id,
            self.processed,
            self.total,
            status,
            &self.current_step,
            metadata,
        )
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComparisonPhase;

    #[test]
    fn tracker_flushes_counts_and_completes() {
        let repo = Repository::open_in_memory().unwrap();
        let mut tracker = ProgressTracker::start(&repo, OperationType::HashCalculation, 4).unwrap();
        tracker.run("starting").unwrap();
        assert_eq!(tracker.snapshot().unwrap().unwrap().status, JobStatus::Running);

        tracker
            .increment(
                2,
                "hashing",
                &StepMetadata::HashCalculation {
                    current_file_name: "a.bin".to_string(),
                    rate_files_per_sec: 1.0,
                    eta_seconds: Some(2.0),
                },
            )
            .unwrap();
        let snap = tracker.snapshot().unwrap().unwrap();
        assert_eq!(snap.processed_items, 2);
        assert_eq!(snap.percentage(), 50.0);

        tracker.complete().unwrap();
        let snap = tracker.snapshot().unwrap().unwrap();
        assert_eq!(snap.status, JobStatus::Completed);
        assert!(snap.end_time.is_some());
    }

    #[test]
    fn eta_is_none_before_first_increment() {
        let repo = Repository::open_in_memory().unwrap();
        let tracker = ProgressTracker::start(&repo, OperationType::FolderComparison, 10).unwrap();
        assert_eq!(tracker.eta_seconds(), None);
        let _ = ComparisonPhase::Resolve;
    }
}
