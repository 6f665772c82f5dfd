//! Output stream events and the sink that carries them to the client.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// One outbound stream event. Serializes as `{"type": ..., "content": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum OutputEvent {
    /// Opens an output block.
    Start,
    /// Incremental text inside the open block.
    Chunk(String),
    /// Closes the output block.
    End,
    /// Free-text progress label.
    Status(String),
    /// A complete text message outside any block.
    Text(String),
    /// Protocol-level error reported to the client.
    Error(String),
}

/// Destination for output events.
///
/// Emission is infallible from the caller's point of view: a sink that can no
/// longer deliver (closed socket) logs and drops the event. Disconnects are
/// observed by the transport, which cancels the running flow.
pub trait OutputSink: Send + Sync + 'static {
    fn emit(&self, event: OutputEvent) -> BoxFuture<'_, ()>;

    fn status(&self, label: &str) -> BoxFuture<'_, ()> {
        self.emit(OutputEvent::Status(label.to_string()))
    }

    fn start(&self) -> BoxFuture<'_, ()> {
        self.emit(OutputEvent::Start)
    }

    fn chunk(&self, text: &str) -> BoxFuture<'_, ()> {
        self.emit(OutputEvent::Chunk(text.to_string()))
    }

    fn end(&self) -> BoxFuture<'_, ()> {
        self.emit(OutputEvent::End)
    }

    /// A whole block in one go: `start`, `chunk(text)`, `end`.
    fn one_shot(&self, text: &str) -> BoxFuture<'_, ()> {
        let text = text.to_string();
        Box::pin(async move {
            self.emit(OutputEvent::Start).await;
            self.emit(OutputEvent::Chunk(text)).await;
            self.emit(OutputEvent::End).await;
        })
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&self, _event: OutputEvent) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}
