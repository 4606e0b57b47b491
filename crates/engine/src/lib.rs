//! `genrun-engine` library crate.
//!
//! Holds the job state store and the controller that decides whether a
//! job's progress comes from the server channel or the offline
//! simulator. The `genrun-watch` binary entrypoint lives in `main.rs`.

pub mod config;
pub mod controller;
pub mod store;
