//! Cancellable tick pacing for the simulator.
//!
//! The base cadence is one tick per 100 ms, divided by the chosen
//! [`SpeedMultiplier`]. A [`TickTimer`] never fires immediately; its first
//! tick arrives one period after it starts. Dropping the timer (or calling
//! [`TickTimer::cancel`]) guarantees no further tick.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Tick period at 1x speed.
pub const BASE_TICK: Duration = Duration::from_millis(100);

/// Simulation speed-up factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedMultiplier {
    #[default]
    X1,
    X5,
    X10,
}

impl SpeedMultiplier {
    pub fn factor(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X5 => 5,
            Self::X10 => 10,
        }
    }

    pub fn tick_period(self) -> Duration {
        BASE_TICK / self.factor()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported simulation speed {0}; expected 1, 5 or 10")]
pub struct InvalidSpeed(pub u32);

impl TryFrom<u32> for SpeedMultiplier {
    type Error = InvalidSpeed;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::X1),
            5 => Ok(Self::X5),
            10 => Ok(Self::X10),
            other => Err(InvalidSpeed(other)),
        }
    }
}

/// Periodic timer driving one simulation run.
#[derive(Debug)]
pub struct TickTimer {
    interval: Interval,
    period: Duration,
}

impl TickTimer {
    pub fn start(speed: SpeedMultiplier) -> Self {
        let period = speed.tick_period();
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Stop the timer. Equivalent to dropping it.
    pub fn cancel(self) {
        tracing::trace!(period_ms = self.period.as_millis() as u64, "Tick timer cancelled");
    }
}
