use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique conversation identifier. A session owns many conversations.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    /// Provider-correlated identifier, echoed back with the result.
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one tool call.
///
/// `success` is false exactly when `error` is non-empty. The fields are private
/// so the only way to build one is through [`ToolResult::success`] or
/// [`ToolResult::failure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ToolResultWire")]
pub struct ToolResult {
    id: String,
    call_id: String,
    name: String,
    result: String,
    success: bool,
    error: String,
}

impl ToolResult {
    pub fn success(call: &ToolCall, result: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            result: result.into(),
            success: true,
            error: String::new(),
        }
    }

    pub fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "unknown error".to_string();
        }
        Self {
            id: call.id.clone(),
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            result: String::new(),
            success: false,
            error,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            Some(&self.error)
        }
    }

    /// Text sent back to the model for this result.
    pub fn render(&self) -> String {
        if self.success {
            self.result.clone()
        } else {
            format!("{}\nError: {}", self.result, self.error)
                .trim()
                .to_string()
        }
    }
}

#[derive(Deserialize)]
struct ToolResultWire {
    id: String,
    call_id: String,
    name: String,
    #[serde(default)]
    result: String,
    success: bool,
    #[serde(default)]
    error: String,
}

impl TryFrom<ToolResultWire> for ToolResult {
    type Error = String;

    fn try_from(w: ToolResultWire) -> std::result::Result<Self, Self::Error> {
        if w.success == w.error.is_empty() {
            Ok(Self {
                id: w.id,
                call_id: w.call_id,
                name: w.name,
                result: w.result,
                success: w.success,
                error: w.error,
            })
        } else {
            Err(format!(
                "tool result '{}' has success={} with error {:?}",
                w.call_id, w.success, w.error
            ))
        }
    }
}

/// Payload of a chat message. Exactly one kind per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBody {
    Content(String),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// A chat message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    fn with(role: Role, body: MessageBody) -> Self {
        Self {
            role,
            body,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with(Role::System, MessageBody::Content(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with(Role::User, MessageBody::Content(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with(Role::Assistant, MessageBody::Content(text.into()))
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self::with(Role::Assistant, MessageBody::ToolCall(call))
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Self::with(Role::Tool, MessageBody::ToolResult(result))
    }

    pub fn content(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Content(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match &self.body {
            MessageBody::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match &self.body {
            MessageBody::ToolResult(result) => Some(result),
            _ => None,
        }
    }

    /// Flatten the message into display text.
    pub fn text(&self) -> String {
        match &self.body {
            MessageBody::Content(text) => text.clone(),
            MessageBody::ToolCall(call) => format!(
                "{}({})",
                call.name,
                serde_json::Value::Object(call.arguments.clone())
            ),
            MessageBody::ToolResult(result) => result.render(),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    ToolCalls,
    Length,
    Other(String),
}

impl FinishReason {
    /// Map a provider's finish reason string.
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" => Self::Stop,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            "length" | "max_tokens" => Self::Length,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Token usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A complete model response, assembled from the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl LlmResponse {
    /// The model produced a final answer and requested nothing further.
    pub fn is_final(&self) -> bool {
        self.finish_reason == FinishReason::Stop && self.tool_calls.is_empty()
    }
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool call block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool call argument JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(FinishReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Tool definition for sending to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to local tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    pub conversation_id: ConversationId,
    /// Snapshot of the conversation taken when the batch started.
    pub history: Arc<Vec<ChatMessage>>,
}

impl ToolContext {
    pub fn new(conversation_id: ConversationId, history: Vec<ChatMessage>) -> Self {
        Self {
            conversation_id,
            history: Arc::new(history),
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("conversation_id", &self.conversation_id)
            .field("history_len", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall::new("call_1", name, serde_json::Map::new())
    }

    #[test]
    fn test_tool_result_success_has_no_error() {
        let r = ToolResult::success(&call("list_tables"), "users, orders");
        assert!(r.is_success());
        assert_eq!(r.error(), None);
        assert_eq!(r.render(), "users, orders");
    }

    #[test]
    fn test_tool_result_failure_never_has_empty_error() {
        let r = ToolResult::failure(&call("list_tables"), "");
        assert!(!r.is_success());
        assert_eq!(r.error(), Some("unknown error"));
        assert_eq!(r.render(), "Error: unknown error");
    }

    #[test]
    fn test_tool_result_rejects_inconsistent_wire() {
        let bad = json!({
            "id": "1", "call_id": "c", "name": "t",
            "result": "", "success": false, "error": ""
        });
        assert!(serde_json::from_value::<ToolResult>(bad).is_err());

        let bad = json!({
            "id": "1", "call_id": "c", "name": "t",
            "result": "ok", "success": true, "error": "boom"
        });
        assert!(serde_json::from_value::<ToolResult>(bad).is_err());

        let good = json!({
            "id": "1", "call_id": "c", "name": "t",
            "result": "", "success": false, "error": "boom"
        });
        let r: ToolResult = serde_json::from_value(good).unwrap();
        assert_eq!(r.error(), Some("boom"));
    }

    #[test]
    fn test_message_serializes_single_body() {
        let msg = ChatMessage::user("List tables");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "List tables");
        assert!(v.get("tool_call").is_none());
        assert!(v.get("tool_result").is_none());
    }

    #[test]
    fn test_message_accessors() {
        let msg = ChatMessage::tool_call(call("describe"));
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content().is_none());
        assert_eq!(msg.as_tool_call().map(|c| c.name.as_str()), Some("describe"));
        assert_eq!(msg.text(), "describe({})");
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_provider("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_provider("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_provider("content_filter"),
            FinishReason::Other("content_filter".into())
        );
    }

    #[test]
    fn test_is_final() {
        let mut r = LlmResponse {
            content: "done".into(),
            ..Default::default()
        };
        assert!(r.is_final());
        r.tool_calls.push(call("x"));
        assert!(!r.is_final());
    }
}
