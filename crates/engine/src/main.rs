//! `genrun-watch` -- start a generation job and follow its progress.
//!
//! Connects to the progress WebSocket, submits the job described by the
//! environment, and logs progress until the job finishes. When the server
//! cannot be reached the job runs in the offline simulator instead.
//!
//! # Environment variables
//!
//! Connection settings are documented on
//! [`SyncConfig::from_env`](genrun_engine::config::SyncConfig::from_env).
//!
//! | Variable          | Required | Default    | Description                      |
//! |-------------------|----------|------------|----------------------------------|
//! | `JOB_START_DATE`  | yes      | --         | First simulated day, `YYYY-MM-DD` |
//! | `JOB_END_DATE`    | yes      | --         | Last simulated day, `YYYY-MM-DD`  |
//! | `JOB_TENANT_ID`   | no       | `default`  | Tenant the data is generated for |
//! | `JOB_SEED`        | no       | `42`       | Deterministic seed               |
//! | `JOB_SCENARIOS`   | no       | (none)     | Comma-separated scenario ids     |
//! | `JOB_OUTPUT_MODE` | no       | `database` | `database`, `csv` or `both`      |

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use genrun_core::job::{JobConfig, OutputMode};
use genrun_core::log_buffer::LogEntry;
use genrun_engine::config::{parse_or, required, ConfigError, SyncConfig};
use genrun_engine::controller::{ControllerHandle, JobController};
use genrun_engine::store::{ChannelStatus, JobStore};
use genrun_remote::api::GeneratorApi;
use genrun_remote::channel::Channel;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the progress channel before starting the job.
const CONNECT_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genrun_engine=info,genrun_remote=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SyncConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });
    let job_config = job_from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid job description");
        std::process::exit(1);
    });

    tracing::info!(
        ws_url = %config.ws_url,
        api_url = %config.api_url,
        speed = config.speed.factor(),
        "Starting genrun-watch",
    );

    // --- Channel ---
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut channel = Channel::new(config.channel_config(), event_tx);
    channel.connect();

    // --- Controller ---
    let api = Arc::new(GeneratorApi::new(config.api_url.clone()));
    let store = JobStore::new(config.log_capacity, config.history_limit);
    let controller = JobController::new(api, channel, store, config.speed);
    let mut updates = controller.subscribe();

    let (handle, commands) = ControllerHandle::channel();
    let controller_task = tokio::spawn(controller.run(event_rx, commands));

    let connected = tokio::time::timeout(
        CONNECT_GRACE,
        updates.wait_for(|s| s.channel_status == ChannelStatus::Connected),
    )
    .await
    .is_ok_and(|r| r.is_ok());
    if !connected {
        tracing::warn!("Progress channel not connected yet, job may run offline");
    }

    let job = match handle.start(job_config).await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start job");
            std::process::exit(1);
        }
    };
    tracing::info!(job_id = %job.job_id, source = ?job.source, "Job started");

    // --- Follow progress ---
    let mut last_log: Option<LogEntry> = None;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling job");
                let _ = handle.cancel(job.job_id.clone()).await;
            }
        }

        let snapshot = Arc::clone(&updates.borrow_and_update());

        // Print only lines newer than the last one shown.
        let fresh = match &last_log {
            Some(last) => snapshot
                .logs
                .iter()
                .rposition(|entry| entry == last)
                .map_or(0, |i| i + 1),
            None => 0,
        };
        for entry in &snapshot.logs[fresh..] {
            tracing::info!("{entry}");
        }
        if let Some(entry) = snapshot.logs.last() {
            last_log = Some(entry.clone());
        }

        if let Some(progress) = &snapshot.progress {
            tracing::info!(
                day = progress.current_day,
                total_days = progress.total_days,
                date = %progress.current_date,
                percent = %format_args!("{:.1}", progress.percentage),
                records = progress.records.total(),
                "Progress",
            );
        }

        let finished = snapshot
            .job
            .as_ref()
            .is_some_and(|j| j.id == job.job_id && j.is_terminal());
        if finished {
            if let Some(j) = &snapshot.job {
                tracing::info!(job_id = %j.id, status = %j.status, "Job finished");
            }
            break;
        }
    }

    let _ = handle.shutdown().await;
    let _ = controller_task.await;
}

/// Describe the job to start from `JOB_*` environment variables.
fn job_from_env() -> Result<JobConfig, ConfigError> {
    let lookup = |name: &str| std::env::var(name).ok();

    let start_date = parse_date(&lookup, "JOB_START_DATE")?;
    let end_date = parse_date(&lookup, "JOB_END_DATE")?;
    let tenant_id = lookup("JOB_TENANT_ID").unwrap_or_else(|| "default".into());
    let seed: u64 = parse_or(&lookup, "JOB_SEED", 42)?;
    let output_mode: OutputMode = parse_or(&lookup, "JOB_OUTPUT_MODE", OutputMode::Database)?;
    let scenarios = lookup("JOB_SCENARIOS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(JobConfig {
        start_date,
        end_date,
        tenant_id,
        seed,
        scenarios,
        output_mode,
    })
}

fn parse_date(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<NaiveDate, ConfigError> {
    let value = required(lookup, name)?;
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
