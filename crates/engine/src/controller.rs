//! Job controller.
//!
//! [`JobController`] owns the [`JobStore`] and is its only writer. It
//! submits jobs to the server, subscribes the progress channel to them,
//! and falls back to the offline [`ProgressSimulator`] when the server is
//! unreachable. Per job the state machine is
//! `idle -> requesting -> running -> {completed | failed | cancelled}`,
//! with `requesting`/`running` backed by the job's `pending`/`running`
//! status. Once a job is terminal, every later message or tick for it is
//! ignored.
//!
//! [`JobController::run`] is the event loop: channel events, user
//! commands, finished submissions, and simulator ticks are applied one at
//! a time on a single task. Submission requests resolve in the background,
//! so a job can be cancelled while it is still `requesting`.
//! [`ControllerHandle`] sends commands into it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use genrun_core::error::CoreError;
use genrun_core::job::{Job, JobConfig, JobStatus};
use genrun_core::log_buffer::LogEntry;
use genrun_core::types::{JobId, Timestamp};
use genrun_remote::api::{ApiError, GeneratorApi};
use genrun_remote::channel::Channel;
use genrun_remote::events::ChannelEvent;
use genrun_remote::messages::{ChannelMessage, ClientMessage};
use genrun_simulator::{ProgressSimulator, SpeedMultiplier, TickTimer};
use tokio::sync::{mpsc, oneshot, watch};

use crate::store::{ChannelStatus, JobStore, StoreSnapshot};

/// Capacity of the command queue feeding the controller loop.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// External job submission API.
#[async_trait]
pub trait JobSubmitter: Send + Sync + 'static {
    /// Submit a job; returns the server-assigned id.
    async fn submit(&self, config: &JobConfig) -> Result<JobId, ApiError>;

    async fn cancel(&self, job_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl JobSubmitter for GeneratorApi {
    async fn submit(&self, config: &JobConfig) -> Result<JobId, ApiError> {
        self.submit_job(config).await
    }

    async fn cancel(&self, job_id: &str) -> Result<(), ApiError> {
        self.cancel_job(job_id).await
    }
}

/// The outbound side of the progress channel.
pub trait ProgressChannel {
    fn is_connected(&self) -> bool;

    /// Returns `false` when the message could not be queued.
    fn send(&self, message: &ClientMessage) -> bool;
}

impl ProgressChannel for Channel {
    fn is_connected(&self) -> bool {
        Channel::is_connected(self)
    }

    fn send(&self, message: &ClientMessage) -> bool {
        Channel::send(self, message)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What drives a job's progress. Exactly one source per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    Channel,
    Simulator,
}

/// Returned by [`JobController::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub source: ProgressSource,
}

/// Controller-level view of the current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Requesting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<JobStatus> for ControllerState {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => Self::Requesting,
            JobStatus::Running => Self::Running,
            JobStatus::Completed => Self::Completed,
            JobStatus::Failed => Self::Failed,
            JobStatus::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// A non-terminal job already exists.
    #[error("Job {0} is still active")]
    JobActive(JobId),

    /// The controller loop is no longer running.
    #[error("Controller has stopped")]
    Stopped,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Commands accepted by the controller loop.
#[derive(Debug)]
pub enum Command {
    Start {
        config: JobConfig,
        reply: oneshot::Sender<Result<JobHandle, ControllerError>>,
    },
    Cancel {
        job_id: JobId,
    },
    Reset,
    Shutdown,
}

/// Bookkeeping for the job the controller is driving.
#[derive(Debug, Clone)]
struct ActiveJob {
    job_id: JobId,
    source: ProgressSource,
    /// The server accepted the job, so cancellation must be forwarded.
    submitted: bool,
}

/// A job whose submission request is still in flight.
struct Submission {
    local_id: JobId,
    config: JobConfig,
    request: BoxFuture<'static, Result<JobId, ApiError>>,
}

enum Launch {
    /// The job is already running in the simulator.
    Ready(JobHandle),
    /// The job waits in `requesting` for the server to accept it.
    Submitting(Submission),
}

/// One offline simulation: the generator and the timer pacing it.
#[derive(Debug)]
struct SimulationRun {
    job_id: JobId,
    simulator: ProgressSimulator,
    timer: TickTimer,
}

// ---------------------------------------------------------------------------
// JobController
// ---------------------------------------------------------------------------

pub struct JobController<A, C> {
    api: Arc<A>,
    channel: C,
    store: JobStore,
    speed: SpeedMultiplier,
    active: Option<ActiveJob>,
    simulation: Option<SimulationRun>,
    updates: watch::Sender<Arc<StoreSnapshot>>,
}

impl<A: JobSubmitter, C: ProgressChannel> JobController<A, C> {
    pub fn new(api: Arc<A>, channel: C, store: JobStore, speed: SpeedMultiplier) -> Self {
        let (updates, _) = watch::channel(Arc::new(store.snapshot()));
        Self {
            api,
            channel,
            store,
            speed,
            active: None,
            simulation: None,
            updates,
        }
    }

    /// Receive a fresh [`StoreSnapshot`] after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.updates.subscribe()
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn state(&self) -> ControllerState {
        self.store
            .current_job()
            .map_or(ControllerState::Idle, |job| job.status.into())
    }

    /// Source driving the current job, if any.
    pub fn source(&self) -> Option<ProgressSource> {
        self.active.as_ref().map(|a| a.source)
    }

    /// Whether a simulation timer is armed.
    pub fn is_simulating(&self) -> bool {
        self.simulation.is_some()
    }

    /// Start a job. Uses the channel path when the channel is connected
    /// and the server accepts the job, otherwise runs the simulator.
    ///
    /// Called directly, this waits for the submission. Inside [`run`] the
    /// submission resolves in the background so the job can be cancelled
    /// (by its `local-` id) while it is still `requesting`.
    ///
    /// [`run`]: JobController::run
    pub async fn start(&mut self, config: JobConfig) -> Result<JobHandle, ControllerError> {
        match self.launch(config)? {
            Launch::Ready(handle) => Ok(handle),
            Launch::Submitting(submission) => {
                let result = submission.request.await;
                self.finish_submission(&submission.local_id, &submission.config, result)
            }
        }
    }

    /// Cancel the current job. Local state flips to `cancelled` at once;
    /// the server request is fire-and-forget. Returns `false` when
    /// `job_id` is not the current non-terminal job.
    pub fn cancel(&mut self, job_id: &str) -> bool {
        let cancellable = self
            .store
            .current_job()
            .is_some_and(|job| job.id == job_id && !job.is_terminal());
        if !cancellable {
            tracing::debug!(job_id, "Cancel ignored: not the active job");
            return false;
        }

        self.stop_simulation();
        self.store
            .transition(job_id, JobStatus::Cancelled, Utc::now());
        self.store.log("Job cancelled");
        tracing::info!(job_id, "Job cancelled");

        let submitted = self
            .active
            .as_ref()
            .is_some_and(|a| a.job_id == job_id && a.submitted);
        if submitted {
            self.cancel_on_server(job_id.to_string());
        }

        self.publish();
        true
    }

    /// Apply a decoded channel message to the store.
    pub fn handle_message(&mut self, message: ChannelMessage) {
        if let ChannelMessage::Connected { timestamp } = message {
            self.store.set_channel_status(ChannelStatus::Connected);
            self.store
                .push_log(LogEntry::new(timestamp, "Connected to progress channel"));
            self.resubscribe();
            self.publish();
            return;
        }

        let Some(job_id) = message.job_id().map(str::to_string) else {
            return;
        };
        if !self.accepts_channel_message(&job_id) {
            tracing::debug!(job_id = %job_id, kind = message.kind(), "Ignoring channel message");
            return;
        }

        match message {
            ChannelMessage::Started { timestamp, .. } => {
                if self.store.transition(&job_id, JobStatus::Running, timestamp) {
                    self.store
                        .push_log(LogEntry::new(timestamp, "Job started on server"));
                }
            }
            ChannelMessage::Progress {
                snapshot,
                timestamp,
                ..
            } => {
                self.promote_to_running(&job_id, timestamp);
                self.store.apply_progress(&job_id, snapshot);
            }
            ChannelMessage::Log {
                message, timestamp, ..
            } => {
                self.store.push_log(LogEntry::new(timestamp, message));
            }
            ChannelMessage::Completed {
                summary, timestamp, ..
            } => {
                if self.store.transition(&job_id, JobStatus::Completed, timestamp) {
                    let line = match summary.total_records {
                        Some(total) => format!("Job completed: {total} records generated"),
                        None => "Job completed".to_string(),
                    };
                    self.store.push_log(LogEntry::new(timestamp, line));
                    tracing::info!(job_id = %job_id, "Job completed");
                }
            }
            ChannelMessage::Error {
                message, timestamp, ..
            } => {
                if self.store.fail(&job_id, &message, timestamp) {
                    self.store
                        .push_log(LogEntry::new(timestamp, format!("Job failed: {message}")));
                    tracing::warn!(job_id = %job_id, error = %message, "Job failed on server");
                }
            }
            ChannelMessage::Connected { .. } => {}
        }

        self.publish();
    }

    /// Apply any event reported by the channel.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(message) => self.handle_message(message),
            ChannelEvent::DecodeFailed { error, .. } => {
                self.store.log(format!("Dropped malformed message: {error}"));
                self.publish();
            }
            ChannelEvent::TransportError(error) => {
                tracing::warn!(error = %error, "Progress channel transport error");
                self.store.set_channel_status(ChannelStatus::Connecting);
                self.publish();
            }
            ChannelEvent::Disconnected { attempts } => {
                tracing::warn!(attempts, "Progress channel permanently disconnected");
                self.store.set_channel_status(ChannelStatus::Disconnected);
                self.store.log(format!(
                    "Progress channel disconnected after {attempts} reconnect attempts"
                ));
                self.publish();
            }
        }
    }

    /// Advance the running simulation by one day.
    pub fn on_tick(&mut self) {
        let Some(run) = self.simulation.as_mut() else {
            return;
        };

        let live = self
            .store
            .current_job()
            .is_some_and(|job| job.id == run.job_id && !job.is_terminal());
        if !live {
            self.stop_simulation();
            return;
        }

        let Some(step) = run.simulator.step() else {
            self.stop_simulation();
            return;
        };
        let job_id = run.job_id.clone();
        let now = Utc::now();

        self.promote_to_running(&job_id, now);
        self.store.apply_progress(&job_id, step.snapshot);
        for line in step.logs {
            self.store.log(line);
        }

        if step.completed {
            self.stop_simulation();
            self.store.transition(&job_id, JobStatus::Completed, now);
            tracing::info!(job_id = %job_id, "Simulated job completed");
        }

        self.publish();
    }

    /// Drop the current job and clear the log.
    pub fn reset(&mut self) {
        self.stop_simulation();
        self.active = None;
        self.store.reset();
        self.publish();
    }

    /// Run the event loop until shutdown or until every command sender is
    /// dropped.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut submissions = FuturesUnordered::new();

        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event),
                command = commands.recv() => match command {
                    Some(Command::Start { config, reply }) => match self.launch(config) {
                        Ok(Launch::Ready(handle)) => {
                            let _ = reply.send(Ok(handle));
                        }
                        Ok(Launch::Submitting(submission)) => {
                            submissions.push(async move {
                                let result = submission.request.await;
                                (submission.local_id, submission.config, reply, result)
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Start rejected");
                            let _ = reply.send(Err(e));
                        }
                    },
                    Some(Command::Cancel { job_id }) => {
                        self.cancel(&job_id);
                    }
                    Some(Command::Reset) => self.reset(),
                    Some(Command::Shutdown) | None => break,
                },
                Some((local_id, config, reply, result)) = submissions.next() => {
                    let outcome = self.finish_submission(&local_id, &config, result);
                    let _ = reply.send(outcome);
                }
                _ = next_tick(&mut self.simulation) => self.on_tick(),
            }
        }

        self.stop_simulation();
        tracing::info!("Job controller stopped");
    }

    // ---- private helpers ----

    /// Record a new `requesting` job. Returns the pending submission, or
    /// the simulator handle when the channel is down.
    fn launch(&mut self, config: JobConfig) -> Result<Launch, ControllerError> {
        if let Some(job) = self.store.current_job().filter(|j| !j.is_terminal()) {
            return Err(ControllerError::JobActive(job.id.clone()));
        }
        self.stop_simulation();
        self.active = None;

        let local_id = format!("local-{}", uuid::Uuid::new_v4());
        self.store
            .begin_job(Job::new(local_id.clone(), config.clone(), Utc::now()));
        self.store.log(format!(
            "Job requested: {} to {} for tenant {}",
            config.start_date, config.end_date, config.tenant_id
        ));

        if !self.channel.is_connected() {
            self.store
                .log("Progress channel unavailable, running offline simulation");
            let handle = self.start_simulation(local_id, &config);
            self.publish();
            return Ok(Launch::Ready(handle));
        }

        self.publish();
        let api = Arc::clone(&self.api);
        let body = config.clone();
        Ok(Launch::Submitting(Submission {
            local_id,
            config,
            request: Box::pin(async move { api.submit(&body).await }),
        }))
    }

    /// Apply the server's answer to a submission started by [`launch`].
    ///
    /// If the job left `requesting` meanwhile (cancelled or reset), an
    /// accepted job is cancelled on the server and never subscribed.
    ///
    /// [`launch`]: JobController::launch
    fn finish_submission(
        &mut self,
        local_id: &str,
        config: &JobConfig,
        result: Result<JobId, ApiError>,
    ) -> Result<JobHandle, ControllerError> {
        let requesting = self
            .store
            .current_job()
            .is_some_and(|job| job.id == local_id && job.status == JobStatus::Pending);

        if !requesting {
            if let Ok(server_id) = result {
                tracing::info!(
                    job_id = %server_id,
                    local_id,
                    "Job withdrawn before submission completed, cancelling on server",
                );
                self.cancel_on_server(server_id);
            }
            return Ok(JobHandle {
                job_id: local_id.to_string(),
                source: ProgressSource::Channel,
            });
        }

        let handle = match result {
            Ok(server_id) => self.attach_to_channel(server_id, config)?,
            Err(e) => {
                tracing::warn!(error = %e, "Job submission failed, falling back to simulation");
                self.store
                    .log(format!("Job submission failed ({e}), running offline simulation"));
                self.start_simulation(local_id.to_string(), config)
            }
        };

        self.publish();
        Ok(handle)
    }

    /// Adopt the server id and subscribe the channel to it.
    fn attach_to_channel(
        &mut self,
        job_id: JobId,
        config: &JobConfig,
    ) -> Result<JobHandle, ControllerError> {
        self.store.rekey_job(&job_id)?;
        let subscribe = ClientMessage::Subscribe {
            job_id: job_id.clone(),
        };

        let source = if self.channel.send(&subscribe) {
            self.store.log(format!("Subscribed to job {job_id}"));
            tracing::info!(job_id = %job_id, "Job submitted, tracking via channel");
            ProgressSource::Channel
        } else {
            tracing::warn!(job_id = %job_id, "Channel dropped before subscribe");
            self.store
                .log("Progress channel dropped before subscribe, running offline simulation");
            self.start_simulation(job_id.clone(), config);
            ProgressSource::Simulator
        };

        self.active = Some(ActiveJob {
            job_id: job_id.clone(),
            source,
            submitted: true,
        });
        Ok(JobHandle { job_id, source })
    }

    /// Fire-and-forget cancel request; failures are only logged.
    fn cancel_on_server(&self, job_id: JobId) {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = api.cancel(&job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Server-side cancel failed");
            }
        });
    }

    fn start_simulation(&mut self, job_id: JobId, config: &JobConfig) -> JobHandle {
        let simulator = ProgressSimulator::new(config);
        tracing::info!(
            job_id = %job_id,
            total_days = simulator.total_days(),
            speed = self.speed.factor(),
            "Starting offline simulation",
        );

        self.simulation = Some(SimulationRun {
            job_id: job_id.clone(),
            simulator,
            timer: TickTimer::start(self.speed),
        });
        if self.active.as_ref().map_or(true, |a| a.job_id != job_id) {
            self.active = Some(ActiveJob {
                job_id: job_id.clone(),
                source: ProgressSource::Simulator,
                submitted: false,
            });
        }

        JobHandle {
            job_id,
            source: ProgressSource::Simulator,
        }
    }

    /// A reopened connection carries no subscription; attach it again to
    /// the channel-driven job, if one is still live.
    fn resubscribe(&mut self) {
        let Some(job_id) = self
            .active
            .as_ref()
            .filter(|a| a.source == ProgressSource::Channel)
            .map(|a| a.job_id.clone())
        else {
            return;
        };
        if !self.accepts_channel_message(&job_id) {
            return;
        }

        let subscribe = ClientMessage::Subscribe {
            job_id: job_id.clone(),
        };
        if self.channel.send(&subscribe) {
            tracing::info!(job_id = %job_id, "Re-subscribed after reconnect");
            self.store.log(format!("Re-subscribed to job {job_id}"));
        }
    }

    fn stop_simulation(&mut self) {
        if let Some(run) = self.simulation.take() {
            run.timer.cancel();
        }
    }

    fn accepts_channel_message(&self, job_id: &str) -> bool {
        let from_channel = self
            .active
            .as_ref()
            .is_some_and(|a| a.job_id == job_id && a.source == ProgressSource::Channel);
        let live = self
            .store
            .current_job()
            .is_some_and(|job| job.id == job_id && !job.is_terminal());
        from_channel && live
    }

    /// Progress implies the job is running even if `started` was missed.
    fn promote_to_running(&mut self, job_id: &str, at: Timestamp) {
        let pending = self
            .store
            .current_job()
            .is_some_and(|job| job.status == JobStatus::Pending);
        if pending && self.store.transition(job_id, JobStatus::Running, at) {
            self.store.log("Job running");
        }
    }

    fn publish(&self) {
        self.updates.send_replace(Arc::new(self.store.snapshot()));
    }
}

/// Resolve on the next tick of the armed simulation, or never.
async fn next_tick(simulation: &mut Option<SimulationRun>) {
    match simulation {
        Some(run) => run.timer.tick().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// ControllerHandle
// ---------------------------------------------------------------------------

/// Cloneable sender of commands into a running controller loop.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
}

impl ControllerHandle {
    /// Create a handle and the receiver to pass to [`JobController::run`].
    pub fn channel() -> (Self, mpsc::Receiver<Command>) {
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        (Self { commands }, rx)
    }

    pub async fn start(&self, config: JobConfig) -> Result<JobHandle, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Start { config, reply })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        rx.await.map_err(|_| ControllerError::Stopped)?
    }

    pub async fn cancel(&self, job_id: impl Into<JobId>) -> Result<(), ControllerError> {
        self.send(Command::Cancel {
            job_id: job_id.into(),
        })
        .await
    }

    pub async fn reset(&self) -> Result<(), ControllerError> {
        self.send(Command::Reset).await
    }

    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ControllerError::Stopped)
    }
}
