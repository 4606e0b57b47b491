//! Deterministic tick-driven progress generator.
//!
//! Each [`ProgressSimulator::step`] advances exactly one simulated day.
//! Counters, percentage, and completion depend only on the day index and
//! the date range. The seeded RNG feeds nothing but the scenario-event
//! log lines.

use chrono::{Days, NaiveDate};
use genrun_core::job::JobConfig;
use genrun_core::progress::ProgressSnapshot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{EVENT_PROBABILITY, SCENARIO_EVENTS};
use crate::rates::{module_for_day, records_after};

/// Output of one simulated day.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStep {
    pub snapshot: ProgressSnapshot,
    /// Log lines produced by this tick, oldest first.
    pub logs: Vec<String>,
    /// `true` on the tick that reaches the last day.
    pub completed: bool,
}

/// Synthetic progress source for one job.
#[derive(Debug)]
pub struct ProgressSimulator {
    start_date: NaiveDate,
    total_days: u32,
    current_day: u32,
    scenario_count: usize,
    rng: StdRng,
}

impl ProgressSimulator {
    pub fn new(config: &JobConfig) -> Self {
        Self {
            start_date: config.start_date,
            total_days: config.total_days(),
            current_day: 0,
            scenario_count: config.scenarios.len(),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn total_days(&self) -> u32 {
        self.total_days
    }

    pub fn current_day(&self) -> u32 {
        self.current_day
    }

    pub fn is_finished(&self) -> bool {
        self.current_day >= self.total_days
    }

    /// Advance one day. Returns `None` once the last day has been produced.
    pub fn step(&mut self) -> Option<SimulationStep> {
        if self.is_finished() {
            return None;
        }

        self.current_day += 1;
        let day = self.current_day;
        let mut logs = Vec::new();

        if day == 1 {
            logs.push(format!(
                "Simulation started: {} days, {} scenarios enabled",
                self.total_days, self.scenario_count
            ));
        }

        if self.scenario_count > 0 && self.rng.random_bool(EVENT_PROBABILITY) {
            let event = SCENARIO_EVENTS[self.rng.random_range(0..SCENARIO_EVENTS.len())];
            logs.push(format!("[Scenario] {event}"));
        }

        let records = records_after(day);
        let completed = day == self.total_days;

        if completed {
            logs.push(format!(
                "Simulation completed: {} records generated over {} days",
                records.total(),
                self.total_days
            ));
        }

        let snapshot = ProgressSnapshot {
            current_day: day,
            total_days: self.total_days,
            current_date: self
                .start_date
                .checked_add_days(Days::new(u64::from(day - 1)))
                .unwrap_or(NaiveDate::MAX),
            percentage: f64::from(day) / f64::from(self.total_days) * 100.0,
            current_module: Some(module_for_day(day).to_string()),
            records,
        };

        Some(SimulationStep {
            snapshot,
            logs,
            completed,
        })
    }
}
