//! Offline progress simulation.
//!
//! When no server channel is available, [`ProgressSimulator`] produces a
//! synthetic but internally consistent progress stream for a job
//! configuration, one simulated day per tick, and [`TickTimer`] paces it.

pub mod catalog;
pub mod rates;
pub mod simulator;
pub mod timer;

pub use simulator::{ProgressSimulator, SimulationStep};
pub use timer::{SpeedMultiplier, TickTimer};
