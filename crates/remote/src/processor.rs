//! WebSocket frame processing loop.
//!
//! Reads raw frames from an open connection, decodes text frames into
//! [`ChannelMessage`](crate::messages::ChannelMessage)s, forwards them to
//! the channel handler, and writes queued outbound frames. Returns how
//! the connection ended so the caller can decide whether to reconnect.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::events::ChannelEvent;
use crate::messages::parse_message;
use crate::reconnect::CloseKind;

/// Pump frames until the connection closes or `cancel` fires.
///
/// Cancellation sends a Close frame and counts as a clean close.
pub async fn process_frames<S>(
    ws_stream: S,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    handler: &mpsc::UnboundedSender<ChannelEvent>,
    cancel: &CancellationToken,
) -> CloseKind
where
    S: futures::Stream<Item = Result<Message, WsError>> + futures::Sink<Message, Error = WsError>,
{
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                return CloseKind::Clean;
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = sink.send(frame).await {
                    tracing::error!(error = %e, "WebSocket send error");
                    let _ = handler.send(ChannelEvent::TransportError(e.to_string()));
                    return CloseKind::Abnormal;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_text_frame(&text, handler),
                Some(Ok(Message::Binary(_))) => {
                    tracing::trace!("Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Progress WebSocket closed by server");
                    let _ = sink.close().await;
                    return CloseKind::Clean;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket receive error");
                    let _ = handler.send(ChannelEvent::TransportError(e.to_string()));
                    return CloseKind::Abnormal;
                }
                None => {
                    tracing::warn!("WebSocket stream ended without a close frame");
                    return CloseKind::Abnormal;
                }
            }
        }
    }
}

/// Decode one text frame and hand it to the handler. Undecodable frames
/// are reported and dropped.
fn handle_text_frame(text: &str, handler: &mpsc::UnboundedSender<ChannelEvent>) {
    let event = match parse_message(text) {
        Ok(message) => {
            tracing::trace!(kind = message.kind(), job_id = ?message.job_id(), "Inbound message");
            ChannelEvent::Message(message)
        }
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Dropping undecodable message");
            ChannelEvent::DecodeFailed {
                error: e.to_string(),
                raw: text.to_string(),
            }
        }
    };
    let _ = handler.send(event);
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use futures::channel::mpsc as fmpsc;

    use super::*;
    use crate::messages::ChannelMessage;

    /// In-memory duplex standing in for a WebSocket stream.
    struct FakeSocket {
        inbound: fmpsc::UnboundedReceiver<Result<Message, WsError>>,
        written: fmpsc::UnboundedSender<Message>,
    }

    impl futures::Stream for FakeSocket {
        type Item = Result<Message, WsError>;

        fn poll_next(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            self.inbound.poll_next_unpin(cx)
        }
    }

    impl futures::Sink<Message> for FakeSocket {
        type Error = WsError;

        fn poll_ready(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn start_send(self: std::pin::Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.written
                .unbounded_send(item)
                .map_err(|_| WsError::ConnectionClosed)
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_close(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    struct Harness {
        socket: FakeSocket,
        server_tx: fmpsc::UnboundedSender<Result<Message, WsError>>,
        written_rx: fmpsc::UnboundedReceiver<Message>,
    }

    fn harness() -> Harness {
        let (server_tx, inbound) = fmpsc::unbounded();
        let (written, written_rx) = fmpsc::unbounded();
        Harness {
            socket: FakeSocket { inbound, written },
            server_tx,
            written_rx,
        }
    }

    #[tokio::test]
    async fn decoded_messages_reach_handler() {
        let Harness {
            socket, server_tx, ..
        } = harness();
        let (_out_tx, out_rx) = mpsc::unbounded_channel();
        let (handler, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        server_tx
            .unbounded_send(Ok(Message::Text(
                r#"{"type":"started","job_id":"job-1"}"#.into(),
            )))
            .unwrap();
        server_tx
            .unbounded_send(Ok(Message::Close(None)))
            .unwrap();

        let close = process_frames(socket, out_rx, &handler, &cancel).await;

        assert_eq!(close, CloseKind::Clean);
        assert_matches!(
            events.recv().await,
            Some(ChannelEvent::Message(ChannelMessage::Started { job_id, .. })) if job_id == "job-1"
        );
    }

    #[tokio::test]
    async fn malformed_frame_is_reported_and_processing_continues() {
        let Harness {
            socket, server_tx, ..
        } = harness();
        let (_out_tx, out_rx) = mpsc::unbounded_channel();
        let (handler, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        server_tx
            .unbounded_send(Ok(Message::Text("{not json".into())))
            .unwrap();
        server_tx
            .unbounded_send(Ok(Message::Text(
                r#"{"type":"log","job_id":"job-1","data":{"message":"hello"}}"#.into(),
            )))
            .unwrap();
        drop(server_tx);

        let close = process_frames(socket, out_rx, &handler, &cancel).await;

        assert_eq!(close, CloseKind::Abnormal);
        assert_matches!(
            events.recv().await,
            Some(ChannelEvent::DecodeFailed { raw, .. }) if raw == "{not json"
        );
        assert_matches!(
            events.recv().await,
            Some(ChannelEvent::Message(ChannelMessage::Log { message, .. })) if message == "hello"
        );
    }

    #[tokio::test]
    async fn receive_error_is_abnormal_close() {
        let Harness {
            socket, server_tx, ..
        } = harness();
        let (_out_tx, out_rx) = mpsc::unbounded_channel();
        let (handler, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        server_tx
            .unbounded_send(Err(WsError::ConnectionClosed))
            .unwrap();

        let close = process_frames(socket, out_rx, &handler, &cancel).await;

        assert_eq!(close, CloseKind::Abnormal);
        assert_matches!(events.recv().await, Some(ChannelEvent::TransportError(_)));
    }

    #[tokio::test]
    async fn outbound_frames_are_written_and_cancel_sends_close() {
        let Harness {
            socket,
            server_tx: _server_tx,
            mut written_rx,
        } = harness();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (handler, _events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        out_tx
            .send(Message::Text(r#"{"type":"subscribe","job_id":"j"}"#.into()))
            .unwrap();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            process_frames(socket, out_rx, &handler, &task_cancel).await
        });

        let first = written_rx.next().await.unwrap();
        assert_matches!(first, Message::Text(text) if text.contains("subscribe"));

        cancel.cancel();
        assert_eq!(task.await.unwrap(), CloseKind::Clean);
        assert_matches!(written_rx.next().await, Some(Message::Close(None)));
    }
}
