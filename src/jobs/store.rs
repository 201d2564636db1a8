//! In-memory registry of search jobs.
//!
//! Each job sits behind its own mutex; the worker running it is the only writer
//! and HTTP handlers read cloned snapshots.

use crate::acquisition::orchestrator::{ProgressReporter, RunOutcome};
use crate::core::types::{AcquisitionTarget, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Error,
    Timeout,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Timeout => "timeout",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionJob {
    pub id: String,
    pub status: JobStatus,
    pub query: String,
    pub targets: Vec<AcquisitionTarget>,
    pub total_goal: usize,
    pub records: Vec<Record>,
    /// `"<n>/<count> - <label>"` for the target last reported.
    pub current_target: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl AcquisitionJob {
    pub fn new(query: impl Into<String>, targets: Vec<AcquisitionTarget>, total_goal: usize) -> Self {
        Self {
            id: format!("search_{}", uuid::Uuid::new_v4().simple()),
            status: JobStatus::Pending,
            query: query.into(),
            targets,
            total_goal,
            records: Vec::new(),
            current_target: None,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// `H:MM:SS` wall time since the job was accepted.
    pub fn elapsed_display(&self) -> String {
        let secs = self.elapsed().num_seconds().max(0);
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    pub fn progress(&self) -> String {
        format!("{}/{}", self.records.len(), self.total_goal)
    }

    fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// Shared, mutable view of one job for the worker that runs it.
#[derive(Clone)]
pub struct JobHandle {
    job: Arc<Mutex<AcquisitionJob>>,
    cancel: CancellationToken,
}

impl JobHandle {
    fn lock(&self) -> MutexGuard<'_, AcquisitionJob> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn snapshot(&self) -> AcquisitionJob {
        self.lock().clone()
    }

    pub fn mark_running(&self) {
        let mut job = self.lock();
        if job.status == JobStatus::Pending {
            job.status = JobStatus::Running;
        }
    }

    /// Final records of a finished run; a cancelled run keeps what it collected.
    pub fn complete(&self, outcome: RunOutcome) {
        let mut job = self.lock();
        job.records = outcome.records;
        job.current_target = None;
        let status = if outcome.cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        job.finish(status);
        info!(
            "Job {} {}: {} of {} records",
            job.id,
            status,
            job.records.len(),
            job.total_goal
        );
    }

    pub fn fail(&self, message: impl Into<String>) {
        let mut job = self.lock();
        job.error = Some(message.into());
        job.finish(JobStatus::Error);
    }

    /// Records reported so far stay attached to the job.
    pub fn time_out(&self, limit_secs: u64) {
        let mut job = self.lock();
        job.error = Some(format!("search exceeded {}s", limit_secs));
        job.finish(JobStatus::Timeout);
    }

    pub fn mark_cancelled(&self) {
        self.lock().finish(JobStatus::Cancelled);
    }
}

impl ProgressReporter for JobHandle {
    fn report(&self, records: &[Record], current_label: &str) {
        let mut job = self.lock();
        if records.len() >= job.records.len() {
            job.records = records.to_vec();
        }
        let count = job.targets.len();
        let position = job
            .targets
            .iter()
            .position(|t| t.display_label() == current_label)
            .map(|i| i + 1)
            .unwrap_or(count);
        job.current_target = Some(format!("{}/{} - {}", position, count, current_label));
    }
}

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3_600);

pub struct JobStore {
    jobs: RwLock<HashMap<String, JobHandle>>,
    /// Finished jobs older than this are dropped on the next insert.
    retention: Duration,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn insert(&self, job: AcquisitionJob) -> JobHandle {
        let handle = JobHandle {
            cancel: CancellationToken::new(),
            job: Arc::new(Mutex::new(job)),
        };
        let id = handle.id();
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        prune_finished(&mut jobs, self.retention);
        jobs.insert(id, handle.clone());
        handle
    }

    /// Drop finished jobs past the retention window. Returns how many went.
    pub fn prune(&self) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        prune_finished(&mut jobs, self.retention)
    }

    pub fn get(&self, id: &str) -> Option<JobHandle> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn snapshot(&self, id: &str) -> Option<AcquisitionJob> {
        self.get(id).map(|h| h.snapshot())
    }

    /// Request cancellation. Returns the job's status at the time of the call,
    /// `None` for unknown ids. Finished jobs are left untouched.
    pub fn cancel(&self, id: &str) -> Option<JobStatus> {
        let handle = self.get(id)?;
        let status = handle.snapshot().status;
        if !status.is_finished() {
            handle.cancel.cancel();
        }
        Some(status)
    }

    /// Cancel every unfinished job; used on shutdown so sessions get closed.
    pub fn cancel_all(&self) -> usize {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut cancelled = 0;
        for handle in jobs.values() {
            if !handle.snapshot().status.is_finished() {
                handle.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_count(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|h| !h.snapshot().status.is_finished())
            .count()
    }
}

fn prune_finished(jobs: &mut HashMap<String, JobHandle>, retention: Duration) -> usize {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let now = Utc::now();
    let before = jobs.len();
    jobs.retain(|_, handle| {
        let job = handle.lock();
        match job.finished_at {
            Some(finished) if job.status.is_finished() => {
                finished.checked_add_signed(retention).is_some_and(|expiry| expiry > now)
            }
            _ => true,
        }
    });
    let removed = before - jobs.len();
    if removed > 0 {
        debug!("Evicted {} finished jobs", removed);
    }
    removed
}
