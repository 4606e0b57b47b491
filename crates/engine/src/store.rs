//! Job state store.
//!
//! [`JobStore`] is the single source of truth for the current job, its
//! latest progress snapshot, recent job history, the bounded log, and the
//! progress channel status. It is owned by one writer (the controller
//! loop); readers get immutable [`StoreSnapshot`]s.

use std::collections::{BTreeSet, VecDeque};

use chrono::Utc;
use genrun_core::error::CoreError;
use genrun_core::job::{Job, JobStatus};
use genrun_core::log_buffer::{LogBuffer, LogEntry, DEFAULT_LOG_CAPACITY};
use genrun_core::progress::ProgressSnapshot;
use genrun_core::types::Timestamp;
use serde::Serialize;

/// Default number of finished jobs kept in history.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Connection state of the progress channel as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

/// Immutable view of the store at one point in time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSnapshot {
    pub job: Option<Job>,
    pub progress: Option<ProgressSnapshot>,
    /// Finished jobs, newest first.
    pub history: Vec<Job>,
    /// Log lines, oldest first.
    pub logs: Vec<LogEntry>,
    pub channel_status: ChannelStatus,
}

#[derive(Debug, Clone)]
pub struct JobStore {
    current: Option<Job>,
    progress: Option<ProgressSnapshot>,
    history: VecDeque<Job>,
    history_limit: usize,
    logs: LogBuffer,
    channel_status: ChannelStatus,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY, DEFAULT_HISTORY_LIMIT)
    }
}

impl JobStore {
    pub fn new(log_capacity: usize, history_limit: usize) -> Self {
        Self {
            current: None,
            progress: None,
            history: VecDeque::new(),
            history_limit,
            logs: LogBuffer::with_capacity(log_capacity),
            channel_status: ChannelStatus::default(),
        }
    }

    // ---- readers ----

    pub fn current_job(&self) -> Option<&Job> {
        self.current.as_ref()
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref()
    }

    /// Finished jobs, newest first.
    pub fn history(&self) -> impl Iterator<Item = &Job> {
        self.history.iter()
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn channel_status(&self) -> ChannelStatus {
        self.channel_status
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            job: self.current.clone(),
            progress: self.progress.clone(),
            history: self.history.iter().cloned().collect(),
            logs: self.logs.to_vec(),
            channel_status: self.channel_status,
        }
    }

    // ---- setters ----

    /// Make `job` the current job and clear the previous progress.
    pub fn begin_job(&mut self, job: Job) {
        self.current = Some(job);
        self.progress = None;
    }

    /// Replace the provisional id of a pending job with the server's.
    pub fn rekey_job(&mut self, new_id: &str) -> Result<(), CoreError> {
        let Some(job) = self.current.as_mut() else {
            return Err(CoreError::Validation("no current job".into()));
        };
        if job.status != JobStatus::Pending {
            return Err(CoreError::Validation(format!(
                "job {} is {} and cannot be re-keyed",
                job.id, job.status
            )));
        }
        job.id = new_id.to_string();
        Ok(())
    }

    /// Move the current job to `next` if it is `job_id` and the step is
    /// legal. Terminal jobs are recorded in history. Returns whether the
    /// status changed.
    pub fn transition(&mut self, job_id: &str, next: JobStatus, at: Timestamp) -> bool {
        let Some(job) = self.current_mut(job_id) else {
            return false;
        };
        if let Err(e) = job.transition(next, at) {
            tracing::debug!(job_id, error = %e, "Ignoring status change");
            return false;
        }
        self.record_if_terminal();
        true
    }

    /// Terminate the current job as `failed`.
    pub fn fail(&mut self, job_id: &str, message: &str, at: Timestamp) -> bool {
        let Some(job) = self.current_mut(job_id) else {
            return false;
        };
        if let Err(e) = job.fail(message, at) {
            tracing::debug!(job_id, error = %e, "Ignoring failure report");
            return false;
        }
        self.record_if_terminal();
        true
    }

    /// Store a newer progress snapshot for the current job.
    ///
    /// Refused when the job is unknown or terminal, or when the snapshot's
    /// `current_day` is behind the stored one. A duplicate of the stored
    /// day is applied again (idempotent).
    pub fn apply_progress(&mut self, job_id: &str, snapshot: ProgressSnapshot) -> bool {
        match self.current.as_ref() {
            Some(job) if job.id == job_id && !job.is_terminal() => {}
            _ => return false,
        }

        if let Some(previous) = &self.progress {
            if snapshot.current_day < previous.current_day {
                tracing::debug!(
                    job_id,
                    stored_day = previous.current_day,
                    received_day = snapshot.current_day,
                    "Discarding out-of-order progress",
                );
                return false;
            }
        }

        self.progress = Some(snapshot);
        true
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    /// Append a log line stamped with the current time.
    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry::new(Utc::now(), message));
    }

    /// Replace the current job's enabled scenarios (and their count).
    pub fn set_job_scenarios(&mut self, scenarios: BTreeSet<String>) -> Result<(), CoreError> {
        match self.current.as_mut() {
            Some(job) => job.set_scenarios(scenarios),
            None => Err(CoreError::Validation("no current job".into())),
        }
    }

    pub fn set_channel_status(&mut self, status: ChannelStatus) {
        self.channel_status = status;
    }

    /// Clear the log and drop the current job. History and channel status
    /// are kept.
    pub fn reset(&mut self) {
        self.current = None;
        self.progress = None;
        self.logs.clear();
    }

    // ---- private helpers ----

    fn current_mut(&mut self, job_id: &str) -> Option<&mut Job> {
        self.current.as_mut().filter(|job| job.id == job_id)
    }

    fn record_if_terminal(&mut self) {
        let Some(job) = self.current.as_ref().filter(|job| job.is_terminal()) else {
            return;
        };
        self.history.push_front(job.clone());
        self.history.truncate(self.history_limit);
    }
}
