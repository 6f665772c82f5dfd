use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::future::BoxFuture;
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ferry_core::output::{OutputEvent, OutputSink};

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Writes output events to a websocket as JSON text frames.
pub struct WebSocketSink {
    tx: WsSender,
}

impl WebSocketSink {
    pub fn new(tx: WsSender) -> Self {
        Self { tx }
    }
}

impl OutputSink for WebSocketSink {
    fn emit(&self, event: OutputEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize output event");
                    return;
                }
            };
            let mut tx = self.tx.lock().await;
            if let Err(e) = tx.send(Message::Text(json.into())).await {
                debug!(error = %e, "Dropping output event, socket closed");
            }
        })
    }
}
