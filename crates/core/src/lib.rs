//! Domain types shared by the progress channel, the simulator, and the
//! job controller.
//!
//! Nothing in this crate performs I/O. The types here are the vocabulary
//! the rest of the workspace speaks: jobs and their lifecycle, progress
//! snapshots with their record-count breakdown, and the bounded log.

pub mod error;
pub mod job;
pub mod log_buffer;
pub mod progress;
pub mod types;
