use crate::job::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job {0} is terminal and can no longer be modified")]
    JobTerminal(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}
