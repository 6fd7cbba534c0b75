//! Job supervisor (spec.md §4.10, C10): enforces one active job per
//! operation type, routes cancellation into a running job, and reaps
//! progress rows stuck `running` past a configurable threshold.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::errors::CoreError;
use crate::repository::Repository;
use crate::types::OperationType;

/// A running job's cancellation flag, handed to the engine that owns the
/// job. Dropping it does not release the supervisor's slot; call
/// `JobSupervisor::release` once the job has reached a terminal state.
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn flag(&self) -> &AtomicBool {
        &self.flag
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

pub struct JobSupervisor<'a> {
    repo: &'a Repository,
    cancel_flags: Mutex<HashMap<OperationType, Arc<AtomicBool>>>,
}

impl<'a> JobSupervisor<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the singleton slot for `operation_type`. Fails with
    /// `CoreError::AlreadyRunning` if a pending/running row already exists
    /// (spec.md §4.10 "one job per operation type at a time").
    pub fn acquire(&self, operation_type: OperationType) -> Result<CancelToken, CoreError> {
        if self.repo.find_active_progress_for_operation(operation_type)?.is_some() {
            return Err(CoreError::AlreadyRunning(operation_type.to_string()));
        }
        let flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(operation_type, flag.clone());
        Ok(CancelToken { flag })
    }

    /// Signal the running job for `operation_type` to stop. Returns `false`
    /// if no job is currently tracked for that type.
    pub fn request_stop(&self, operation_type: OperationType) -> bool {
        let guard = self.cancel_flags.lock().unwrap_or_else(|p| p.into_inner());
        match guard.get(&operation_type) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Release `operation_type`'s cancellation slot. Call once its job has
    /// reached a terminal (or paused) state; the singleton check itself
    /// relies on the progress table, not this map.
    pub fn release(&self, operation_type: OperationType) {
        self.cancel_flags.lock().unwrap_or_else(|p| p.into_inner()).remove(&operation_type);
    }

    /// Fail every `running` row whose `last_updated` is older than
    /// `threshold_secs` (spec.md §4.10 stuck-job reaper; default threshold
    /// is `Config::stuck_job_threshold_secs`, 15 minutes).
    pub fn reap_stuck(&self, threshold_secs: i64) -> Result<usize, CoreError> {
        let threshold = Utc::now() - chrono::Duration::seconds(threshold_secs);
        let stuck = self.repo.list_stuck_progress(threshold)?;
        for row in &stuck {
            self.repo.fail_progress(row.id, "stuck")?;
        }
        Ok(stuck.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_rejects_a_second_concurrent_job_of_the_same_type() {
        let repo = Repository::open_in_memory().unwrap();
        let supervisor = JobSupervisor::new(&repo);
        let _token = supervisor.acquire(OperationType::FileScan).unwrap();

        // acquire() checks the progress table, not its own map, so a
        // second acquire only conflicts once a row is actually pending/running.
        repo.create_progress(OperationType::FileScan, 0).unwrap();
        let second = supervisor.acquire(OperationType::FileScan);
        assert!(matches!(second, Err(CoreError::AlreadyRunning(_))));
    }

    #[test]
    fn request_stop_sets_the_flag_for_a_tracked_operation() {
        let repo = Repository::open_in_memory().unwrap();
        let supervisor = JobSupervisor::new(&repo);
        let token = supervisor.acquire(OperationType::HashCalculation).unwrap();
        assert!(!token.is_cancelled());
        assert!(supervisor.request_stop(OperationType::HashCalculation));
        assert!(token.is_cancelled());
    }

    #[test]
    fn reap_stuck_fails_rows_older_than_threshold() {
        let repo = Repository::open_in_memory().unwrap();
        let supervisor = JobSupervisor::new(&repo);
        let id = repo.create_progress(OperationType::FileScan, 10).unwrap();
        repo.update_progress(id, 1, 10, crate::types::JobStatus::Running, "x", &Default::default())
            .unwrap();

        assert_eq!(supervisor.reap_stuck(-1).unwrap(), 1);
        let row = repo.get_progress(id).unwrap().unwrap();
        assert_eq!(row.status, crate::types::JobStatus::Failed);
        assert_eq!(row.error_message.as_deref(), Some("stuck"));
    }
}
