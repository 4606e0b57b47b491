//! Job lifecycle types.
//!
//! A [`Job`] moves `pending -> running -> {completed | failed | cancelled}`
//! and is frozen once it reaches a terminal status. Every mutation goes
//! through a method that checks this, so no caller can resurrect a
//! finished job by accident.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

/// Lifecycle status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    ///
    /// Terminal statuses accept nothing. `pending` may jump straight to a
    /// terminal status (a job can fail or be cancelled before it starts).
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where generated records are written by the server-side executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Database,
    Csv,
    Both,
}

impl std::str::FromStr for OutputMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" => Ok(Self::Database),
            "csv" => Ok(Self::Csv),
            "both" => Ok(Self::Both),
            other => Err(CoreError::Validation(format!("unknown output mode '{other}'"))),
        }
    }
}

/// Parameters of a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tenant_id: String,
    /// Seed shared with the server executor so runs are reproducible.
    pub seed: u64,
    /// Identifiers of the enabled scenario catalog entries.
    #[serde(default)]
    pub scenarios: BTreeSet<String>,
    #[serde(default)]
    pub output_mode: OutputMode,
}

impl JobConfig {
    /// Number of simulated days covered by the date range, inclusive of
    /// both ends. An empty or inverted range still covers one day.
    pub fn total_days(&self) -> u32 {
        let span = (self.end_date - self.start_date).num_days().max(0);
        u32::try_from(span).unwrap_or(u32::MAX - 1) + 1
    }
}

/// A generation job as tracked on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub config: JobConfig,
    /// Always equal to `config.scenarios.len()`.
    pub enabled_scenario_count: usize,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
}

impl Job {
    /// Create a job in the `pending` status.
    pub fn new(id: impl Into<JobId>, config: JobConfig, created_at: Timestamp) -> Self {
        let enabled_scenario_count = config.scenarios.len();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            config,
            enabled_scenario_count,
            created_at,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the job to `next`, stamping `started_at` / `completed_at`.
    pub fn transition(&mut self, next: JobStatus, at: Timestamp) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next == JobStatus::Running {
            self.started_at = Some(at);
        }
        if next.is_terminal() {
            self.completed_at = Some(at);
        }
        Ok(())
    }

    /// Terminate the job as `failed` with a message.
    pub fn fail(&mut self, message: impl Into<String>, at: Timestamp) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed, at)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Replace the enabled scenario set, keeping the denormalized count
    /// in step.
    pub fn set_scenarios(&mut self, scenarios: BTreeSet<String>) -> Result<(), CoreError> {
        if self.is_terminal() {
            return Err(CoreError::JobTerminal(self.id.clone()));
        }
        self.enabled_scenario_count = scenarios.len();
        self.config.scenarios = scenarios;
        Ok(())
    }
}
