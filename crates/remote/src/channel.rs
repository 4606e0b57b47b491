//! Reconnecting progress channel.
//!
//! [`Channel`] owns the lifecycle of one WebSocket connection to the
//! progress endpoint: it connects, pumps frames through
//! [`process_frames`], and after an abnormal close reconnects on the
//! linear schedule of [`ReconnectPolicy`]. Every inbound message and
//! status change is delivered to a single handler as a [`ChannelEvent`].
//!
//! Each [`Channel::connect`] call starts a fresh session task with its
//! own retry counter and cancellation token. A session never outlives
//! the next `connect()` or `disconnect()`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::ChannelClient;
use crate::events::ChannelEvent;
use crate::messages::{ChannelMessage, ClientMessage};
use crate::processor::process_frames;
use crate::reconnect::{CloseKind, ReconnectConfig, ReconnectPolicy};

/// Endpoint and retry settings for a [`Channel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL of the progress endpoint.
    pub url: String,
    pub reconnect: ReconnectConfig,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// State shared between a [`Channel`] and its session task.
#[derive(Default)]
struct SessionState {
    connected: AtomicBool,
    attempts: AtomicU32,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl SessionState {
    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Message>>> {
        self.outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct ActiveSession {
    state: Arc<SessionState>,
    cancel: CancellationToken,
}

/// A reconnecting WebSocket channel to the progress endpoint.
///
/// Must be used from within a tokio runtime.
pub struct Channel {
    config: ChannelConfig,
    handler: mpsc::UnboundedSender<ChannelEvent>,
    session: Option<ActiveSession>,
}

impl Channel {
    /// Create a closed channel that will report to `handler`.
    pub fn new(config: ChannelConfig, handler: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self {
            config,
            handler,
            session: None,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Open the connection. An existing session is disconnected cleanly
    /// first, so attempts are never stacked.
    pub fn connect(&mut self) {
        if self.session.is_some() {
            self.disconnect();
        }

        let state = Arc::new(SessionState::default());
        let cancel = CancellationToken::new();

        tokio::spawn(run_session(
            ChannelClient::new(self.config.url.clone()),
            self.config.reconnect,
            Arc::clone(&state),
            self.handler.clone(),
            cancel.clone(),
        ));

        self.session = Some(ActiveSession { state, cancel });
    }

    /// Close the connection and drop the retry state.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(url = %self.config.url, "Disconnecting progress channel");
            session.cancel.cancel();
            session.state.connected.store(false, Ordering::SeqCst);
            session.state.outbound().take();
        }
    }

    /// Queue a message for the server. Returns `false` (and does nothing)
    /// while the channel is not connected.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let Some(session) = self.session.as_ref() else {
            tracing::debug!("Send skipped: channel not started");
            return false;
        };
        if !session.state.connected.load(Ordering::SeqCst) {
            tracing::debug!("Send skipped: channel not connected");
            return false;
        }

        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode outbound message");
                return false;
            }
        };

        match session.state.outbound().as_ref() {
            Some(tx) => tx.send(Message::Text(json)).is_ok(),
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.state.connected.load(Ordering::SeqCst))
    }

    /// Reconnection attempts spent since the session last opened.
    pub fn retry_attempts(&self) -> u32 {
        self.session
            .as_ref()
            .map_or(0, |s| s.state.attempts.load(Ordering::SeqCst))
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
    }
}

/// Session task: connect -> process frames -> reconnect, until a clean
/// close, retry exhaustion, or cancellation.
async fn run_session(
    client: ChannelClient,
    reconnect: ReconnectConfig,
    state: Arc<SessionState>,
    handler: mpsc::UnboundedSender<ChannelEvent>,
    cancel: CancellationToken,
) {
    let mut policy = ReconnectPolicy::new(reconnect);

    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = client.connect() => result,
        };

        let close = match connected {
            Ok(ws_stream) => {
                policy.on_open();
                state.attempts.store(0, Ordering::SeqCst);

                let (out_tx, out_rx) = mpsc::unbounded_channel();
                *state.outbound() = Some(out_tx);
                state.connected.store(true, Ordering::SeqCst);

                tracing::info!(url = %client.url(), "Progress channel connected");
                let _ = handler.send(ChannelEvent::Message(ChannelMessage::Connected {
                    timestamp: Utc::now(),
                }));

                let close = process_frames(ws_stream, out_rx, &handler, &cancel).await;

                state.connected.store(false, Ordering::SeqCst);
                state.outbound().take();
                close
            }
            Err(e) => {
                tracing::warn!(url = %client.url(), error = %e, "Progress channel connect failed");
                let _ = handler.send(ChannelEvent::TransportError(e.to_string()));
                CloseKind::Abnormal
            }
        };

        if cancel.is_cancelled() {
            return;
        }

        let Some(delay) = policy.on_close(close) else {
            tracing::warn!(
                url = %client.url(),
                attempts = policy.attempts(),
                ?close,
                "Progress channel closed, not reconnecting",
            );
            let _ = handler.send(ChannelEvent::Disconnected {
                attempts: policy.attempts(),
            });
            return;
        };

        state.attempts.store(policy.attempts(), Ordering::SeqCst);
        tracing::info!(
            url = %client.url(),
            attempt = policy.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting progress channel",
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
