//! Server-side collaborators of the job progress client.
//!
//! Provides the typed progress-message codec, the reconnecting WebSocket
//! [`Channel`](channel::Channel), linear reconnect policy, and the REST
//! wrapper used to submit and cancel generation jobs.

pub mod api;
pub mod channel;
pub mod client;
pub mod events;
pub mod messages;
pub mod processor;
pub mod reconnect;
