//! WebSocket viewer client for integration tests.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connect and consume the welcome message.
    pub async fn connect(url: &str) -> Self {
        let (stream, _) = connect_async(url).await.unwrap();
        let mut client = Self { stream };
        let welcome = client.next_json().await.expect("no welcome message");
        assert_eq!(welcome["type"], "welcome");
        client
    }

    /// Replace the subscription filter and wait for the acknowledgement.
    pub async fn subscribe(&mut self, types: &[&str]) {
        self.send_json(json!({"type": "subscribe", "types": types}))
            .await;
        loop {
            let message = self.next_json().await.expect("no subscribe ack");
            if message["type"] == "subscribed" {
                return;
            }
        }
    }

    pub async fn send_json(&mut self, value: Value) {
        self.stream
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    /// Next text message, or `None` after 3s of silence or on close.
    pub async fn next_json(&mut self) -> Option<Value> {
        loop {
            let message = timeout(Duration::from_secs(3), self.stream.next())
                .await
                .ok()??
                .ok()?;
            match message {
                Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    /// Next message whose `type` is `kind`, skipping everything else.
    pub async fn next_of_type(&mut self, kind: &str) -> Option<Value> {
        loop {
            let message = self.next_json().await?;
            if message["type"] == kind {
                return Some(message);
            }
        }
    }

    /// Every text message received within `window`.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<Value> {
        let deadline = Instant::now() + window;
        let mut messages = Vec::new();
        while let Ok(Some(Ok(message))) =
            tokio::time::timeout_at(deadline, self.stream.next()).await
        {
            if let Message::Text(text) = message {
                if let Ok(value) = serde_json::from_str(text.as_str()) {
                    messages.push(value);
                }
            }
        }
        messages
    }

    /// Drop the TCP connection without a close handshake.
    pub fn kill(self) {
        drop(self.stream);
    }
}
