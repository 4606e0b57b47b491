//! Linear-backoff reconnection policy for the progress channel.
//!
//! After an abnormal close, attempt `k` (1-based) is scheduled
//! `base_delay * k` later. Once `max_retries` attempts have been spent,
//! or after a clean close, no further attempt is scheduled. Opening a
//! connection resets the counter.

use std::time::Duration;

/// Default delay unit between reconnection attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default number of reconnection attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Tunable parameters for the linear-backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay unit; attempt `k` waits `base_delay * k`.
    pub base_delay: Duration,
    /// Attempts allowed after a connection is lost.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Close handshake completed, or the client disconnected on purpose.
    Clean,
    /// The transport failed or the peer vanished.
    Abnormal,
}

/// Delay before reconnection attempt `attempt` (1-based).
pub fn delay_for_attempt(attempt: u32, config: &ReconnectConfig) -> Duration {
    config.base_delay.saturating_mul(attempt)
}

/// Retry counter for one channel session.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Attempts scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// Record a close and return the delay before the next attempt, or
    /// `None` when the channel should stay closed.
    pub fn on_close(&mut self, kind: CloseKind) -> Option<Duration> {
        if kind == CloseKind::Clean || self.attempts >= self.config.max_retries {
            return None;
        }
        self.attempts += 1;
        Some(delay_for_attempt(self.attempts, &self.config))
    }
}
