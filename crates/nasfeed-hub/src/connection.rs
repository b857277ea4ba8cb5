//! Client connection lifecycle.
//!
//! `Connecting → Active → Closed`. While active, a spawned reader applies
//! subscribe/ping messages and enforces the idle timeout; the writer loop in
//! the calling task drains the connection's outbound queue and sends
//! heartbeats. Whichever side finishes first closes the handle, which stops
//! the other side; the connection is then unregistered.

use crate::config::HubConfig;
use crate::hub::Hub;
use crate::registry::ConnectionHandle;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use nasfeed_core::{ClientMessage, ServerMessage};
use nasfeed_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Serve one upgraded WebSocket until it closes or `shutdown` fires.
pub async fn serve_connection(
    socket: WebSocket,
    hub: Arc<Hub>,
    config: Arc<HubConfig>,
    shutdown: CancellationToken,
) {
    let handle = hub.connect();
    let client_id = handle.id();
    info!(client_id = %client_id, connections = hub.connection_count(), "WebSocket connected");

    let (sender, receiver) = socket.split();

    hub.send_to(
        &handle,
        ServerMessage::Welcome {
            client_id: client_id.to_string(),
            kinds: hub.kinds().to_vec(),
        },
    );
    handle.activate();

    let mut reader = tokio::spawn(read_loop(
        receiver,
        hub.clone(),
        handle.clone(),
        config.idle_timeout(),
    ));

    write_loop(
        sender,
        &handle,
        config.heartbeat_interval(),
        config.write_timeout(),
        &shutdown,
    )
    .await;

    handle.close();
    if tokio::time::timeout(Duration::from_millis(100), &mut reader)
        .await
        .is_err()
    {
        reader.abort();
    }
    hub.disconnect(client_id);

    info!(client_id = %client_id, connections = hub.connection_count(), "WebSocket closed");
}

async fn write_loop(
    sender: SplitSink<WebSocket, Message>,
    handle: &ConnectionHandle,
    heartbeat_interval: Duration,
    write_timeout: Duration,
    shutdown: &CancellationToken,
) {
    let mut writer = FrameWriter {
        sender,
        handle,
        write_timeout,
        shutdown,
    };
    let mut heartbeat =
        tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(client_id = %handle.id(), "Shutdown, closing connection");
                writer.close().await;
                break;
            }
            _ = handle.closed() => {
                writer.close().await;
                break;
            }
            message = handle.queue().pop() => {
                let Some(message) = message else { break };
                if !writer.send_message(&message).await {
                    break;
                }
                heartbeat.reset();
            }
            _ = heartbeat.tick() => {
                let beat = ServerMessage::Heartbeat { timestamp: Utc::now() };
                if !writer.send_message(&beat).await {
                    break;
                }
                if !writer.send(Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
}

/// Socket sink whose writes give up after `write_timeout` or on shutdown.
/// A timed-out write counts as a failed one.
struct FrameWriter<'a> {
    sender: SplitSink<WebSocket, Message>,
    handle: &'a ConnectionHandle,
    write_timeout: Duration,
    shutdown: &'a CancellationToken,
}

impl FrameWriter<'_> {
    async fn send(&mut self, frame: Message) -> bool {
        let shutdown = self.shutdown;
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            sent = tokio::time::timeout(self.write_timeout, self.sender.send(frame)) => {
                self.check(sent)
            }
        }
    }

    /// Best-effort close frame.
    async fn close(&mut self) {
        let close = self.sender.send(Message::Close(None));
        let limit = self.write_timeout.min(CLOSE_FRAME_TIMEOUT);
        let sent = tokio::time::timeout(limit, close).await;
        self.check(sent);
    }

    fn check(&self, sent: Result<Result<(), axum::Error>, Elapsed>) -> bool {
        match sent {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(
                    client_id = %self.handle.id(),
                    error = %e,
                    "Send failed, client disconnected"
                );
                false
            }
            Err(_) => {
                warn!(
                    client_id = %self.handle.id(),
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Write timed out, dropping connection"
                );
                Metrics::event_dropped("write_timeout");
                false
            }
        }
    }

    async fn send_message(&mut self, message: &ServerMessage) -> bool {
        match message.to_text() {
            Ok(text) => self.send(Message::Text(text.into())).await,
            Err(e) => {
                warn!(
                    client_id = %self.handle.id(),
                    error = %e,
                    "Failed to serialize message"
                );
                true
            }
        }
    }
}

async fn read_loop(
    mut receiver: SplitStream<WebSocket>,
    hub: Arc<Hub>,
    handle: Arc<ConnectionHandle>,
    idle_timeout: Duration,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = handle.closed() => break,
            next = tokio::time::timeout(idle_timeout, receiver.next()) => next,
        };

        match next {
            Err(_) => {
                info!(
                    client_id = %handle.id(),
                    idle_ms = idle_timeout.as_millis() as u64,
                    "Idle timeout, closing connection"
                );
                break;
            }
            Ok(None) => {
                debug!(client_id = %handle.id(), "Client stream ended");
                break;
            }
            Ok(Some(Err(e))) => {
                debug!(client_id = %handle.id(), error = %e, "WebSocket receive error");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => handle_client_text(&hub, &handle, text.as_str()),
            Ok(Some(Ok(Message::Binary(_)))) => {
                hub.send_to(
                    &handle,
                    ServerMessage::Error {
                        message: "binary frames are not supported".to_string(),
                    },
                );
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                debug!(client_id = %handle.id(), "Client sent close frame");
                break;
            }
            // Pongs to client pings are sent by axum.
            Ok(Some(Ok(_))) => {}
        }
    }

    handle.close();
}

fn handle_client_text(hub: &Hub, handle: &ConnectionHandle, text: &str) {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Subscribe { types }) => hub.subscribe(handle, types),
        Ok(ClientMessage::Ping) => {
            hub.send_to(
                handle,
                ServerMessage::Pong {
                    timestamp: Utc::now(),
                },
            );
        }
        Err(e) => {
            debug!(client_id = %handle.id(), error = %e, "Malformed client message");
            hub.send_to(
                handle,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionState;
    use nasfeed_core::DataKind;

    fn hub() -> Hub {
        Hub::new(
            &HubConfig::default(),
            vec![DataKind::system_status(), DataKind::compression_update()],
        )
    }

    #[test]
    fn test_subscribe_message_replaces_filter() {
        let hub = hub();
        let handle = hub.connect();
        handle.activate();

        handle_client_text(
            &hub,
            &handle,
            r#"{"type":"subscribe","types":["system.status"]}"#,
        );

        assert!(handle.wants(&DataKind::system_status()));
        assert!(!handle.wants(&DataKind::compression_update()));
        let ack = handle.queue().try_pop().unwrap();
        assert_eq!(ack.message_type(), "subscribed");
        assert_eq!(handle.state(), ConnectionState::Active);
    }

    #[test]
    fn test_ping_gets_pong() {
        let hub = hub();
        let handle = hub.connect();

        handle_client_text(&hub, &handle, r#"{"type":"ping"}"#);

        assert_eq!(handle.queue().try_pop().unwrap().message_type(), "pong");
    }

    #[test]
    fn test_malformed_message_keeps_connection() {
        let hub = hub();
        let handle = hub.connect();

        handle_client_text(&hub, &handle, "not json");
        handle_client_text(&hub, &handle, r#"{"type":"unsubscribe_all"}"#);

        assert_eq!(handle.queue().try_pop().unwrap().message_type(), "error");
        assert_eq!(handle.queue().try_pop().unwrap().message_type(), "error");
        assert!(!handle.is_closed());
    }
}
