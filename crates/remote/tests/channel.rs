//! Integration tests for the reconnecting `Channel`.
//!
//! Each test runs an in-process WebSocket server on a loopback port and
//! observes the events the channel hands to its handler.

use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use genrun_remote::channel::{Channel, ChannelConfig};
use genrun_remote::events::ChannelEvent;
use genrun_remote::messages::{ChannelMessage, ClientMessage};
use genrun_remote::reconnect::ReconnectConfig;

const PROGRESS_FRAME: &str = r#"{"type":"progress","job_id":"job-1","data":{"current_day":10,"total_days":31,"current_date":"2024-07-10","percentage":32.0},"timestamp":"2024-07-01T09:00:00Z"}"#;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn fast_config(url: String, max_retries: u32) -> ChannelConfig {
    ChannelConfig {
        url,
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(10),
            max_retries,
        },
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("handler channel closed")
}

/// Skip transport errors until the next other event.
async fn next_non_error(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    loop {
        match next_event(rx).await {
            ChannelEvent::TransportError(_) => continue,
            other => return other,
        }
    }
}

// ---------------------------------------------------------------------------
// Test: open emits `connected`, inbound frames are decoded, send works
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_emits_connected_and_forwards_messages() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.send(Message::Text(PROGRESS_FRAME.into())).await.unwrap();

        let subscribe = ws.next().await.unwrap().unwrap();
        ws.close(None).await.unwrap();
        subscribe
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut channel = Channel::new(fast_config(url, 5), tx);
    assert!(!channel.is_connected());
    channel.connect();

    assert_matches!(
        next_event(&mut rx).await,
        ChannelEvent::Message(ChannelMessage::Connected { .. })
    );
    assert!(channel.is_connected());
    assert!(channel.send(&ClientMessage::Subscribe {
        job_id: "job-1".into()
    }));

    assert_matches!(
        next_event(&mut rx).await,
        ChannelEvent::Message(ChannelMessage::Progress { snapshot, .. }) if snapshot.current_day == 10
    );

    let subscribe = server.await.unwrap();
    assert_matches!(subscribe, Message::Text(text) if text.contains(r#""type":"subscribe""#));

    // Server closed cleanly: no reconnect, permanent disconnect reported.
    assert_matches!(
        next_event(&mut rx).await,
        ChannelEvent::Disconnected { attempts: 0 }
    );
    assert!(!channel.is_connected());
}

// ---------------------------------------------------------------------------
// Test: malformed frames are reported without closing the channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_does_not_close_channel() {
    let (listener, url) = bind().await;
    let (done_tx, done_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.send(Message::Text(r#"{"type":"bogus"}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(PROGRESS_FRAME.into())).await.unwrap();
        let _ = done_rx.await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut channel = Channel::new(fast_config(url, 5), tx);
    channel.connect();

    assert_matches!(
        next_event(&mut rx).await,
        ChannelEvent::Message(ChannelMessage::Connected { .. })
    );
    assert_matches!(next_event(&mut rx).await, ChannelEvent::DecodeFailed { .. });
    assert_matches!(
        next_event(&mut rx).await,
        ChannelEvent::Message(ChannelMessage::Progress { .. })
    );
    assert!(channel.is_connected());

    let _ = done_tx.send(());
}

// ---------------------------------------------------------------------------
// Test: abrupt drop triggers a reconnect, which resets the retry counter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn abnormal_close_reconnects() {
    let (listener, url) = bind().await;
    let (done_tx, done_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let first = accept_async(tcp).await.unwrap();
        // Drop the socket without a close handshake.
        drop(first);

        let (tcp, _) = listener.accept().await.unwrap();
        let _second = accept_async(tcp).await.unwrap();
        let _ = done_rx.await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut channel = Channel::new(fast_config(url, 5), tx);
    channel.connect();

    assert_matches!(
        next_non_error(&mut rx).await,
        ChannelEvent::Message(ChannelMessage::Connected { .. })
    );
    assert_matches!(
        next_non_error(&mut rx).await,
        ChannelEvent::Message(ChannelMessage::Connected { .. })
    );
    assert!(channel.is_connected());
    assert_eq!(channel.retry_attempts(), 0);

    let _ = done_tx.send(());
}

// ---------------------------------------------------------------------------
// Test: retries stop after the configured maximum
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gives_up_after_max_retries() {
    let (listener, url) = bind().await;
    // Nothing listens on the port any more: every attempt is refused.
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut channel = Channel::new(fast_config(url, 2), tx);
    channel.connect();

    let mut transport_errors = 0;
    let attempts = loop {
        match next_event(&mut rx).await {
            ChannelEvent::TransportError(_) => transport_errors += 1,
            ChannelEvent::Disconnected { attempts } => break attempts,
            other => panic!("Unexpected event {other:?}"),
        }
    };

    // Initial attempt plus two retries.
    assert_eq!(transport_errors, 3);
    assert_eq!(attempts, 2);
    assert!(!channel.is_connected());
}

// ---------------------------------------------------------------------------
// Test: connect() while open closes the old session cleanly first
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnect_while_open_closes_previous_session() {
    let (listener, url) = bind().await;
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut first = accept_async(tcp).await.unwrap();
        let closing = first.next().await;

        let (tcp, _) = listener.accept().await.unwrap();
        let _second = accept_async(tcp).await.unwrap();
        let _ = done_rx.await;
        closing
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut channel = Channel::new(fast_config(url, 5), tx);
    channel.connect();
    assert_matches!(
        next_event(&mut rx).await,
        ChannelEvent::Message(ChannelMessage::Connected { .. })
    );

    channel.connect();
    assert!(!channel.is_connected());
    assert_matches!(
        next_event(&mut rx).await,
        ChannelEvent::Message(ChannelMessage::Connected { .. })
    );
    assert!(channel.is_connected());

    let _ = done_tx.send(());
    let closing = server.await.unwrap();
    assert_matches!(closing, Some(Ok(Message::Close(_))));
}

// ---------------------------------------------------------------------------
// Test: send() is a no-op while disconnected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_without_connection_is_noop() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut channel = Channel::new(ChannelConfig::new("ws://127.0.0.1:9"), tx);

    let subscribe = ClientMessage::Subscribe {
        job_id: "job-1".into(),
    };
    assert!(!channel.send(&subscribe));

    channel.disconnect();
    assert!(!channel.send(&subscribe));
    assert_eq!(channel.retry_attempts(), 0);
}
