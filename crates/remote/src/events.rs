//! Events delivered by the [`Channel`](crate::channel::Channel) to its
//! single handler.

use crate::messages::ChannelMessage;

/// Everything the channel reports to its owner.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A decoded inbound message (including the synthetic `connected`).
    Message(ChannelMessage),

    /// An inbound frame could not be decoded and was dropped.
    DecodeFailed { error: String, raw: String },

    /// The transport reported an error. Reconnection is decided by the
    /// close that follows, not by this event.
    TransportError(String),

    /// The channel closed and will not reconnect on its own.
    Disconnected { attempts: u32 },
}
