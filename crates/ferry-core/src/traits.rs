use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Raw provider streaming client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Receives stream deltas while a response is being assembled.
pub trait StreamObserver: Send {
    fn on_delta<'a>(&'a mut self, delta: &'a StreamDelta) -> BoxFuture<'a, ()>;

    /// Called once the response is complete (or the attempt was abandoned).
    fn finish(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Observer that ignores every delta.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {
    fn on_delta<'a>(&'a mut self, _delta: &'a StreamDelta) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// The chat capability the orchestration consumes: one call in, one complete
/// response out. Retry policy lives behind this trait.
pub trait ChatModel: Send + Sync + 'static {
    fn chat<'a>(
        &'a self,
        messages: Vec<ChatMessage>,
        tools: &'a [ToolDefinition],
        observer: &'a mut dyn StreamObserver,
    ) -> BoxFuture<'a, Result<LlmResponse>>;
}

/// Remote tool discovery and invocation.
pub trait ToolProvider: Send + Sync + 'static {
    fn list_tools(&self) -> BoxFuture<'_, Result<Vec<ToolDefinition>>>;

    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'a, Result<String>>;
}

/// In-process tool.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<String>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Decides whether a turn may end, and records that it did.
pub trait CompletionGate: Send + Sync + 'static {
    fn can_complete(&self) -> bool;

    fn mark_complete(&self);

    fn is_complete(&self) -> bool;

    /// Note that an answer chunk reached the client.
    fn record_answer(&self);

    /// Forget everything; called at the start of a fresh turn.
    fn reset(&self);
}
